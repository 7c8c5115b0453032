use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use mpm_common::hooks::HookEvent;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MpmConfig {
    pub plugins: PluginsConfig,
    pub index: IndexConfig,
    pub hooks: HooksConfig,
}

/// Plugin store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugins directory. A relative path is interpreted relative to the
    /// parent directory of the config file that declared it.
    pub directory: Option<PathBuf>,
}

/// Plugin index configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the plugin index server.
    pub url: Option<String>,
}

/// Configuration for a single script hook, registered for every plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptHookConfig {
    pub name: String,
    pub command: String,
    pub events: Vec<HookEvent>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    30
}

/// Top-level hooks configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub entries: Vec<ScriptHookConfig>,
}
