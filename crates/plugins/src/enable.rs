//! Enable and disable installed plugins.

use std::{collections::BTreeMap, path::Path};

use {anyhow::bail, tracing::debug};

use mpm_common::hooks::{HookPayload, HookRegistry};

use crate::{manifest::ManifestStore, revisions};

/// Enable installed plugins.
///
/// Returns a flag per plugin: `true` iff it was just enabled now, `false`
/// iff it was already enabled. Naming a plugin that is not installed is an
/// error; nothing is changed in that case.
pub async fn enable(
    package_names: &[String],
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<BTreeMap<String, bool>> {
    let store = ManifestStore::for_plugins_dir(plugins_dir);
    let mut manifest = store.load_pruned(plugins_dir)?;

    // Verify every requested plugin exists before mutating anything.
    for name in package_names {
        if manifest.find_plugin(name).is_none() {
            bail!(
                "plugin `{name}` is not installed in `{}`",
                plugins_dir.display()
            );
        }
    }

    let pre_state = revisions::capture(plugins_dir)?;
    let mut enabled_now = BTreeMap::new();

    for name in package_names {
        let Some(entry) = manifest.find_plugin_mut(name) else {
            continue;
        };
        if entry.enabled {
            debug!(package = %name, "plugin already enabled");
            enabled_now.insert(name.clone(), false);
        } else {
            entry.enabled = true;
            let plugin_dir = plugins_dir.join(&entry.directory);
            debug!(package = %name, dir = %plugin_dir.display(), "enabled plugin");
            enabled_now.insert(name.clone(), true);
            let _ = hooks
                .dispatch(&HookPayload::PostEnable {
                    package_name: name.clone(),
                    plugin_dir,
                })
                .await;
        }
    }

    store.save(&manifest)?;
    if enabled_now.values().any(|newly| *newly) {
        revisions::record(plugins_dir, "enable", pre_state)?;
    }
    Ok(enabled_now)
}

/// Disable plugins. Naming a plugin that is not enabled is an error.
pub async fn disable(
    package_names: &[String],
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    let store = ManifestStore::for_plugins_dir(plugins_dir);
    let mut manifest = store.load_pruned(plugins_dir)?;

    for name in package_names {
        match manifest.find_plugin(name) {
            Some(entry) if entry.enabled => {},
            _ => bail!("plugin `{name}` is not enabled"),
        }
    }

    let pre_state = revisions::capture(plugins_dir)?;

    for name in package_names {
        let Some(entry) = manifest.find_plugin_mut(name) else {
            continue;
        };
        entry.enabled = false;
        let plugin_dir = plugins_dir.join(&entry.directory);
        debug!(package = %name, "disabled plugin");
        let _ = hooks
            .dispatch(&HookPayload::PostDisable {
                package_name: name.clone(),
                plugin_dir,
            })
            .await;
    }

    store.save(&manifest)?;
    revisions::record(plugins_dir, "disable", pre_state)?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{PluginEntry, PluginManifest, plugin_module_name},
    };

    fn seed_plugin(plugins_dir: &Path, package: &str, enabled: bool) {
        let directory = plugin_module_name(package);
        let dir = plugins_dir.join(&directory);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("properties.yml"),
            format!("package_name: {package}\nplugin_name: {directory}\nversion: 1.0\n"),
        )
        .unwrap();

        let store = ManifestStore::for_plugins_dir(plugins_dir);
        let mut manifest = store.load().unwrap_or_else(|_| PluginManifest::default());
        manifest.add_plugin(PluginEntry {
            package_name: package.into(),
            directory,
            version: "1.0".into(),
            installed_at_ms: 0,
            enabled,
        });
        store.save(&manifest).unwrap();
    }

    #[tokio::test]
    async fn enable_reports_newly_and_already_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        seed_plugin(tmp.path(), "microdrop.fresh-plugin", false);
        seed_plugin(tmp.path(), "microdrop.running-plugin", true);

        let hooks = HookRegistry::new();
        let result = enable(
            &[
                "microdrop.fresh-plugin".to_string(),
                "microdrop.running-plugin".to_string(),
            ],
            tmp.path(),
            &hooks,
        )
        .await
        .unwrap();

        assert_eq!(result["microdrop.fresh-plugin"], true);
        assert_eq!(result["microdrop.running-plugin"], false);

        let manifest = ManifestStore::for_plugins_dir(tmp.path()).load().unwrap();
        assert!(manifest.find_plugin("microdrop.fresh-plugin").unwrap().enabled);
    }

    #[tokio::test]
    async fn enable_unknown_plugin_errors_without_changes() {
        let tmp = tempfile::tempdir().unwrap();
        seed_plugin(tmp.path(), "microdrop.known-plugin", false);

        let hooks = HookRegistry::new();
        let err = enable(
            &[
                "microdrop.known-plugin".to_string(),
                "microdrop.ghost-plugin".to_string(),
            ],
            tmp.path(),
            &hooks,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("is not installed"));

        // The known plugin was not flipped.
        let manifest = ManifestStore::for_plugins_dir(tmp.path()).load().unwrap();
        assert!(!manifest.find_plugin("microdrop.known-plugin").unwrap().enabled);
    }

    #[tokio::test]
    async fn disable_enabled_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        seed_plugin(tmp.path(), "microdrop.running-plugin", true);

        let hooks = HookRegistry::new();
        disable(&["microdrop.running-plugin".to_string()], tmp.path(), &hooks)
            .await
            .unwrap();

        let manifest = ManifestStore::for_plugins_dir(tmp.path()).load().unwrap();
        assert!(!manifest.find_plugin("microdrop.running-plugin").unwrap().enabled);
    }

    #[tokio::test]
    async fn disable_not_enabled_errors() {
        let tmp = tempfile::tempdir().unwrap();
        seed_plugin(tmp.path(), "microdrop.idle-plugin", false);

        let hooks = HookRegistry::new();
        let err = disable(&["microdrop.idle-plugin".to_string()], tmp.path(), &hooks)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not enabled"));
    }
}
