//! Configuration loading and plugins-directory resolution.
//!
//! Config files: `mpm.toml`, `mpm.yaml`, or `mpm.json`, searched in `./`
//! then `~/.config/mpm/`. Supports `${ENV_VAR}` substitution in all string
//! values.

pub mod env_subst;
pub mod loader;
pub mod resolve;
pub mod schema;

pub use {
    loader::{clear_data_dir, config_dir, data_dir, discover_and_load, load_config, set_data_dir},
    resolve::{CONFIG_ENV_VAR, PROFILE_ENV_VAR, ResolvedBy, resolve_plugins_dir},
    schema::{HooksConfig, IndexConfig, MpmConfig, PluginsConfig, ScriptHookConfig},
};
