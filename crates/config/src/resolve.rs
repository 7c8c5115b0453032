//! Plugins-directory resolution.
//!
//! The plugins directory is resolved from several layered sources, highest
//! priority first:
//!
//! 1. `plugins.directory` from an explicitly provided config file;
//! 2. `plugins` subdirectory of an explicitly provided profile root;
//! 3. config file named by the `MPM_CONFIG` environment variable;
//! 4. profile root named by the `MPM_PROFILE` environment variable;
//! 5. `plugins.directory` from the profile's own `mpm.toml`;
//! 6. `plugins` subdirectory of the profile root.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use {
    anyhow::Context,
    tracing::{info, warn},
};

use crate::loader;

/// Environment variable naming an explicit config file path.
pub const CONFIG_ENV_VAR: &str = "MPM_CONFIG";
/// Environment variable naming an explicit profile root.
pub const PROFILE_ENV_VAR: &str = "MPM_PROFILE";

/// How the plugins directory was resolved, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Default,
    ConfigArg,
    ProfileArg,
    ConfigEnv,
    ProfileEnv,
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Default => "default",
            Self::ConfigArg => "config path argument",
            Self::ProfileArg => "profile root argument",
            Self::ConfigEnv => "MPM_CONFIG environment variable",
            Self::ProfileEnv => "MPM_PROFILE environment variable",
        };
        write!(f, "{label}")
    }
}

/// Resolve the plugins directory from explicit arguments, the environment,
/// and config files. Never fails: an unusable configured directory degrades
/// to the profile default with a warning.
pub fn resolve_plugins_dir(
    config_path: Option<&Path>,
    profile_root: Option<&Path>,
) -> (PathBuf, ResolvedBy) {
    resolve_plugins_dir_with(config_path, profile_root, |name| std::env::var(name).ok())
}

/// The implementation behind [`resolve_plugins_dir`]; the injectable
/// environment lookup makes the layering testable without mutating the
/// process environment.
fn resolve_plugins_dir_with(
    config_path: Option<&Path>,
    profile_root: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> (PathBuf, ResolvedBy) {
    let mut resolved_by = vec![ResolvedBy::Default];

    let profile_root: PathBuf = if let Some(root) = profile_root {
        resolved_by.push(ResolvedBy::ProfileArg);
        root.to_path_buf()
    } else if let Some(root) = env(PROFILE_ENV_VAR) {
        resolved_by.push(ResolvedBy::ProfileEnv);
        PathBuf::from(root)
    } else {
        loader::data_dir()
    };

    let config_path: PathBuf = if let Some(path) = config_path {
        resolved_by.push(ResolvedBy::ConfigArg);
        path.to_path_buf()
    } else if let Some(path) = env(CONFIG_ENV_VAR) {
        resolved_by.push(ResolvedBy::ConfigEnv);
        PathBuf::from(path)
    } else {
        profile_root.join("mpm.toml")
    };

    let (plugins_dir, resolved_by) = match plugins_dir_from_config(&config_path) {
        Ok(dir) => (dir, resolved_by),
        Err(why) => {
            // No usable directory in the config file (maybe none was listed,
            // or the file itself is absent). Fall back to the profile default.
            let fallback = profile_root.join("plugins");
            warn!(%why, fallback = %fallback.display(), "using default plugins directory");
            if matches!(
                resolved_by.last(),
                Some(ResolvedBy::ConfigArg | ResolvedBy::ConfigEnv)
            ) {
                resolved_by.pop();
            }
            (fallback, resolved_by)
        },
    };

    let resolved_by = resolved_by.last().copied().unwrap_or(ResolvedBy::Default);
    info!(resolved_by = %resolved_by, dir = %plugins_dir.display(), "resolved plugins directory");
    (plugins_dir, resolved_by)
}

/// Look up `plugins.directory` in the given config file. A relative path is
/// anchored at the config file's parent directory; the directory must exist.
fn plugins_dir_from_config(config_path: &Path) -> anyhow::Result<PathBuf> {
    let config = loader::load_config(config_path)?;
    let dir = config
        .plugins
        .directory
        .with_context(|| format!("no plugins directory listed in {}", config_path.display()))?;
    let dir = if dir.is_absolute() {
        dir
    } else {
        config_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(dir)
    };
    if !dir.is_dir() {
        anyhow::bail!("plugins directory does not exist: {}", dir.display());
    }
    Ok(dir)
}
