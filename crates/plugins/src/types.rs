use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Plugin properties ───────────────────────────────────────────────────────

/// Metadata from a plugin's `properties.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginProperties {
    pub package_name: String,
    pub plugin_name: String,
    pub version: String,
    /// Filesystem path of the plugin directory (not stored in the file).
    #[serde(skip)]
    pub path: PathBuf,
}

/// Derive the install directory name for a package.
///
/// The last dot-separated segment with dashes mapped to underscores, e.g.
/// `microdrop.droplet-planning-plugin` → `droplet_planning_plugin`.
pub fn plugin_module_name(package_name: &str) -> String {
    package_name
        .rsplit('.')
        .next()
        .unwrap_or(package_name)
        .replace('-', "_")
}

// ── Plugin manifest ─────────────────────────────────────────────────────────

/// Top-level manifest tracking installed plugins and per-plugin enabled
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub version: u32,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            version: 1,
            plugins: Vec::new(),
        }
    }
}

impl PluginManifest {
    /// Insert an entry, replacing any previous entry for the same package.
    pub fn add_plugin(&mut self, entry: PluginEntry) {
        self.remove_plugin(&entry.package_name);
        self.plugins.push(entry);
    }

    pub fn remove_plugin(&mut self, package_name: &str) {
        self.plugins.retain(|p| p.package_name != package_name);
    }

    pub fn find_plugin(&self, package_name: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|p| p.package_name == package_name)
    }

    pub fn find_plugin_mut(&mut self, package_name: &str) -> Option<&mut PluginEntry> {
        self.plugins
            .iter_mut()
            .find(|p| p.package_name == package_name)
    }

    pub fn set_enabled(&mut self, package_name: &str, enabled: bool) -> bool {
        if let Some(plugin) = self.find_plugin_mut(package_name) {
            plugin.enabled = enabled;
            return true;
        }
        false
    }
}

/// A single installed plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub package_name: String,
    /// Directory name under the plugins directory.
    pub directory: String,
    pub version: String,
    pub installed_at_ms: u64,
    pub enabled: bool,
}
