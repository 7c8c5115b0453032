//! Hook registry assembly and the install-hook sweep.

use std::{path::Path, sync::Arc};

use tracing::{info, warn};

use {
    mpm_common::hooks::{HookPayload, HookRegistry},
    mpm_config::HooksConfig,
};

use crate::{
    list,
    script_hook::{PluginScriptHandler, ScriptHookHandler},
};

/// Build the hook registry: per-plugin scripts plus hooks configured in
/// `mpm.toml`.
pub fn build_registry(config: &HooksConfig) -> HookRegistry {
    let mut registry = HookRegistry::new();
    registry.register(Arc::new(PluginScriptHandler::default()));
    for entry in &config.entries {
        registry.register(Arc::new(ScriptHookHandler::from_config(entry)));
    }
    registry
}

/// Run the post-install hook for every plugin in the plugins directory.
///
/// Used after bulk provisioning (e.g. restoring a profile) to let each
/// plugin set up its runtime dependencies. A failing plugin never aborts
/// the sweep; per-plugin results are returned for reporting.
pub async fn run_install_hooks(
    plugins_dir: &Path,
    registry: &HookRegistry,
) -> anyhow::Result<Vec<(String, anyhow::Result<()>)>> {
    let installed = list::installed_plugins(plugins_dir)?;
    let mut results = Vec::new();

    for props in installed {
        info!(package = %props.package_name, "processing post-install hook");
        let payload = HookPayload::PostInstall {
            package_name: props.package_name.clone(),
            version: props.version.clone(),
            plugin_dir: props.path.clone(),
        };
        let result = registry.dispatch(&payload).await.map(|_| ());
        if let Err(e) = &result {
            warn!(package = %props.package_name, error = %e, "post-install hook failed");
        }
        results.push((props.package_name, result));
    }

    Ok(results)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mpm_config::ScriptHookConfig, mpm_common::hooks::HookEvent};

    #[test]
    fn registry_includes_plugin_scripts_and_configured_hooks() {
        let config = HooksConfig {
            entries: vec![ScriptHookConfig {
                name: "audit".into(),
                command: "exit 0".into(),
                events: vec![HookEvent::PostInstall],
                timeout: 5,
                env: Default::default(),
            }],
        };
        let registry = build_registry(&config);
        assert_eq!(registry.handler_names(), vec!["audit", "plugin-scripts"]);
        assert!(registry.has_handlers(HookEvent::PostInstall));
    }

    #[tokio::test]
    async fn install_hook_sweep_runs_every_plugin_script() {
        let tmp = tempfile::tempdir().unwrap();
        for package in ["microdrop.a-plugin", "microdrop.b-plugin"] {
            let directory = crate::types::plugin_module_name(package);
            let dir = tmp.path().join(&directory);
            std::fs::create_dir_all(dir.join("hooks")).unwrap();
            std::fs::write(
                dir.join("properties.yml"),
                format!("package_name: {package}\nplugin_name: {directory}\nversion: 1.0\n"),
            )
            .unwrap();
            std::fs::write(dir.join("hooks/on-install"), "touch ran.txt\n").unwrap();
        }

        let registry = build_registry(&HooksConfig::default());
        let results = run_install_hooks(tmp.path(), &registry).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(tmp.path().join("a_plugin/ran.txt").is_file());
        assert!(tmp.path().join("b_plugin/ran.txt").is_file());
    }

    #[tokio::test]
    async fn sweep_with_empty_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = build_registry(&HooksConfig::default());
        let results = run_install_hooks(tmp.path(), &registry).await.unwrap();
        assert!(results.is_empty());
    }
}
