//! CLI commands for hook management.

use std::path::Path;

use clap::Subcommand;

use {
    mpm_common::hooks::{HookEvent, HookRegistry},
    mpm_plugins::{hooks, list, script_hook},
};

#[derive(Subcommand)]
pub enum HookCommand {
    /// List registered hook handlers and per-plugin hook scripts.
    List,
    /// Run the post-install hook for every installed plugin.
    RunInstall,
}

pub async fn handle_hooks(
    action: HookCommand,
    plugins_dir: &Path,
    registry: &HookRegistry,
) -> anyhow::Result<()> {
    match action {
        HookCommand::List => {
            println!("Handlers:");
            for name in registry.handler_names() {
                println!("  - {name}");
            }

            println!("Plugin scripts:");
            let mut found = false;
            for props in list::installed_plugins(plugins_dir)? {
                for event in HookEvent::ALL {
                    let script = props
                        .path
                        .join("hooks")
                        .join(script_hook::plugin_script_name(*event));
                    if script.is_file() {
                        println!(
                            "  - {}  hooks/{}",
                            props.package_name,
                            script_hook::plugin_script_name(*event)
                        );
                        found = true;
                    }
                }
            }
            if !found {
                println!("  (none)");
            }
        },
        HookCommand::RunInstall => {
            let results = hooks::run_install_hooks(plugins_dir, registry).await?;
            if results.is_empty() {
                println!("No plugins found in {}.", plugins_dir.display());
                return Ok(());
            }
            for (package, result) in results {
                match result {
                    Ok(()) => println!("  ✓ {package}"),
                    Err(e) => println!("  ✗ {package}: {e}"),
                }
            }
        },
    }

    Ok(())
}
