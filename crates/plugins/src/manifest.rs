use std::path::{Path, PathBuf};

use crate::types::PluginManifest;

/// Persistent manifest storage with atomic writes.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Manifest path for a plugins directory: `<dir>/plugins-manifest.json`.
    pub fn for_plugins_dir(plugins_dir: &Path) -> Self {
        Self::new(plugins_dir.join("plugins-manifest.json"))
    }

    /// Load manifest from disk, returning a default if missing.
    pub fn load(&self) -> anyhow::Result<PluginManifest> {
        if !self.path.exists() {
            return Ok(PluginManifest::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        let manifest: PluginManifest = serde_json::from_str(&data)?;
        Ok(manifest)
    }

    /// Load the manifest and drop entries whose plugin directory no longer
    /// exists (e.g. removed by hand). Persists the pruned manifest.
    pub fn load_pruned(&self, plugins_dir: &Path) -> anyhow::Result<PluginManifest> {
        let mut manifest = self.load()?;
        let before = manifest.plugins.len();
        manifest
            .plugins
            .retain(|p| plugins_dir.join(&p.directory).is_dir());
        if manifest.plugins.len() != before {
            tracing::debug!(
                removed = before - manifest.plugins.len(),
                "pruned stale manifest entries"
            );
            self.save(&manifest)?;
        }
        Ok(manifest)
    }

    /// Save manifest atomically via temp file + rename.
    pub fn save(&self, manifest: &PluginManifest) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::PluginEntry,
    };

    #[test]
    fn load_missing_returns_default() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(tmp.path().join("missing.json"));
        let manifest = store.load().unwrap();
        assert_eq!(manifest.version, 1);
        assert!(manifest.plugins.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ManifestStore::for_plugins_dir(tmp.path());

        let mut manifest = PluginManifest::default();
        manifest.add_plugin(PluginEntry {
            package_name: "microdrop.foo-plugin".into(),
            directory: "foo_plugin".into(),
            version: "1.0".into(),
            installed_at_ms: 1234567890,
            enabled: true,
        });

        store.save(&manifest).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.plugins.len(), 1);
        assert_eq!(loaded.plugins[0].package_name, "microdrop.foo-plugin");
        assert!(loaded.plugins[0].enabled);
    }

    #[test]
    fn load_pruned_drops_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("present_plugin")).unwrap();

        let store = ManifestStore::for_plugins_dir(tmp.path());
        let mut manifest = PluginManifest::default();
        manifest.add_plugin(PluginEntry {
            package_name: "microdrop.present-plugin".into(),
            directory: "present_plugin".into(),
            version: "1.0".into(),
            installed_at_ms: 0,
            enabled: true,
        });
        manifest.add_plugin(PluginEntry {
            package_name: "microdrop.vanished-plugin".into(),
            directory: "vanished_plugin".into(),
            version: "1.0".into(),
            installed_at_ms: 0,
            enabled: true,
        });
        store.save(&manifest).unwrap();

        let pruned = store.load_pruned(tmp.path()).unwrap();
        assert_eq!(pruned.plugins.len(), 1);
        assert_eq!(pruned.plugins[0].directory, "present_plugin");

        // The pruned manifest was written back.
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.plugins.len(), 1);
    }

    #[test]
    fn save_overwrites_atomically() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ManifestStore::for_plugins_dir(tmp.path());
        store.save(&PluginManifest::default()).unwrap();
        store.save(&PluginManifest::default()).unwrap();
        assert!(store.path().exists());
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
