//! Installed/enabled plugin listings and freeze output.

use std::path::Path;

use anyhow::Context;

use crate::{
    manifest::ManifestStore,
    types::{PluginProperties, plugin_module_name},
};

/// Read and parse `properties.yml` from a plugin directory.
pub fn read_properties(plugin_dir: &Path) -> anyhow::Result<PluginProperties> {
    let path = plugin_dir.join("properties.yml");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut props: PluginProperties =
        serde_yaml::from_str(&raw).with_context(|| format!("invalid {}", path.display()))?;
    props.path = plugin_dir.to_path_buf();
    Ok(props)
}

/// List properties for every installed plugin.
///
/// A plugin is installed if it is a real directory (not a link, so linked-in
/// dev checkouts are left alone) with a readable `properties.yml`.
/// Unreadable metadata is logged and skipped.
pub fn installed_plugins(plugins_dir: &Path) -> anyhow::Result<Vec<PluginProperties>> {
    let mut plugins = Vec::new();
    if !plugins_dir.is_dir() {
        return Ok(plugins);
    }

    for entry in std::fs::read_dir(plugins_dir)?.flatten() {
        let path = entry.path();
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.file_type().is_symlink() || !meta.is_dir() {
            continue;
        }
        match read_properties(&path) {
            Ok(props) => plugins.push(props),
            Err(e) => {
                tracing::info!(dir = %path.display(), error = %e, "could not read plugin metadata");
            },
        }
    }

    plugins.sort_by(|a, b| a.package_name.cmp(&b.package_name));
    Ok(plugins)
}

/// List properties for enabled plugins (installed ∩ manifest-enabled).
pub fn enabled_plugins(plugins_dir: &Path) -> anyhow::Result<Vec<PluginProperties>> {
    let store = ManifestStore::for_plugins_dir(plugins_dir);
    let manifest = store.load_pruned(plugins_dir)?;
    let installed = installed_plugins(plugins_dir)?;
    Ok(installed
        .into_iter()
        .filter(|p| {
            manifest
                .find_plugin(&p.package_name)
                .is_some_and(|e| e.enabled)
        })
        .collect())
}

/// Render `name==version` pin lines for installed plugins.
///
/// Directories whose name does not match their recorded package are skipped
/// (e.g. a renamed checkout).
pub fn freeze(plugins_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for props in installed_plugins(plugins_dir)? {
        let dir_name = props
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if dir_name != plugin_module_name(&props.package_name) {
            continue;
        }
        lines.push(format!("{}=={}", props.package_name, props.version));
    }
    Ok(lines)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{PluginEntry, PluginManifest},
    };

    fn write_plugin(plugins_dir: &Path, package: &str, version: &str) {
        let dir = plugins_dir.join(plugin_module_name(package));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("properties.yml"),
            format!(
                "package_name: {package}\nplugin_name: {}\nversion: {version}\n",
                plugin_module_name(package)
            ),
        )
        .unwrap();
    }

    #[test]
    fn installed_plugins_lists_real_directories() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "microdrop.foo-plugin", "1.0");
        write_plugin(tmp.path(), "microdrop.bar-plugin", "2.1.post1");
        // A stray file is ignored.
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let plugins = installed_plugins(tmp.path()).unwrap();
        assert_eq!(plugins.len(), 2);
        // Sorted by package name.
        assert_eq!(plugins[0].package_name, "microdrop.bar-plugin");
        assert_eq!(plugins[1].package_name, "microdrop.foo-plugin");
        assert!(plugins[0].path.ends_with("bar_plugin"));
    }

    #[test]
    fn unreadable_metadata_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "microdrop.good-plugin", "1.0");
        std::fs::create_dir_all(tmp.path().join("broken_plugin")).unwrap();
        std::fs::write(
            tmp.path().join("broken_plugin/properties.yml"),
            ": not yaml :::",
        )
        .unwrap();

        let plugins = installed_plugins(tmp.path()).unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].package_name, "microdrop.good-plugin");
    }

    #[test]
    fn missing_plugins_dir_is_empty() {
        assert!(installed_plugins(Path::new("/nonexistent/plugins"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn enabled_plugins_filters_by_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "microdrop.on-plugin", "1.0");
        write_plugin(tmp.path(), "microdrop.off-plugin", "1.0");

        let store = ManifestStore::for_plugins_dir(tmp.path());
        let mut manifest = PluginManifest::default();
        manifest.add_plugin(PluginEntry {
            package_name: "microdrop.on-plugin".into(),
            directory: "on_plugin".into(),
            version: "1.0".into(),
            installed_at_ms: 0,
            enabled: true,
        });
        manifest.add_plugin(PluginEntry {
            package_name: "microdrop.off-plugin".into(),
            directory: "off_plugin".into(),
            version: "1.0".into(),
            installed_at_ms: 0,
            enabled: false,
        });
        store.save(&manifest).unwrap();

        let enabled = enabled_plugins(tmp.path()).unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].package_name, "microdrop.on-plugin");
    }

    #[test]
    fn freeze_formats_pins_and_skips_mismatched_directories() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "microdrop.foo-plugin", "1.0");

        // A directory whose name does not match its package is skipped.
        let rogue = tmp.path().join("renamed_checkout");
        std::fs::create_dir_all(&rogue).unwrap();
        std::fs::write(
            rogue.join("properties.yml"),
            "package_name: microdrop.rogue-plugin\nplugin_name: rogue\nversion: 9.9\n",
        )
        .unwrap();

        let lines = freeze(tmp.path()).unwrap();
        assert_eq!(lines, vec!["microdrop.foo-plugin==1.0"]);
    }
}
