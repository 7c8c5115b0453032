use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::MpmConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["mpm.toml", "mpm.yaml", "mpm.yml", "mpm.json"];

static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<MpmConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./mpm.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/mpm/mpm.{toml,yaml,yml,json}` (user-global)
///
/// Returns `MpmConfig::default()` if no config file is found.
pub fn discover_and_load() -> MpmConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MpmConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/mpm/
    if let Some(dirs) = directories::ProjectDirs::from("", "", "mpm") {
        let config_dir = dirs.config_dir();
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/mpm/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mpm").map(|d| d.config_dir().to_path_buf())
}

/// Returns the mpm data directory.
///
/// Defaults to the platform data dir (e.g. `~/.local/share/mpm`); an
/// override set via [`set_data_dir`] (the `--data-dir` flag or tests) wins.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return dir;
    }
    directories::ProjectDirs::from("", "", "mpm")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".mpm"))
}

/// Override the data directory for this process.
pub fn set_data_dir(path: impl Into<PathBuf>) {
    *DATA_DIR_OVERRIDE.write().unwrap_or_else(|e| e.into_inner()) = Some(path.into());
}

/// Remove a data directory override.
pub fn clear_data_dir() {
    *DATA_DIR_OVERRIDE.write().unwrap_or_else(|e| e.into_inner()) = None;
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<MpmConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
