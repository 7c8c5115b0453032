//! Handlers for the plugin management subcommands.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Context;

use {
    mpm_common::hooks::HookRegistry,
    mpm_plugins::{enable, install, list, revisions},
    mpm_registry::{PackageIndex, PluginRequest},
};

pub async fn handle_install(
    plugins: Vec<String>,
    requirements: Option<PathBuf>,
    plugins_dir: &Path,
    index: &PackageIndex,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    let mut sources = plugins;
    if let Some(path) = requirements {
        sources.extend(read_requirements(&path)?);
    }
    if sources.is_empty() {
        anyhow::bail!("nothing to install: give plugin descriptors or -r <file>");
    }

    for source in &sources {
        let props = install::install(source, plugins_dir, index, hooks).await?;
        println!("✓ installed {}=={}", props.package_name, props.version);
    }
    Ok(())
}

/// One descriptor per line; `#` comments and blank lines are ignored.
fn read_requirements(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub async fn handle_uninstall(
    plugins: Vec<String>,
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    for name in &plugins {
        install::uninstall(name, plugins_dir, hooks).await?;
        println!("✓ uninstalled {name}");
    }
    Ok(())
}

pub async fn handle_search(
    plugin: &str,
    json: bool,
    index: &PackageIndex,
) -> anyhow::Result<()> {
    let request: PluginRequest = plugin.parse()?;
    let set = index.releases(&request).await?;

    if json {
        let releases: Vec<_> = set
            .releases
            .iter()
            .map(|(version, release)| {
                serde_json::json!({
                    "version": version.to_string(),
                    "url": release.url,
                    "size": release.size,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "name": set.name,
                "releases": releases,
            }))?
        );
    } else {
        println!("{}:", set.name);
        for (version, release) in &set.releases {
            match release.size {
                Some(size) => println!("  {version}  ({size} bytes)"),
                None => println!("  {version}"),
            }
        }
    }
    Ok(())
}

pub fn handle_freeze(plugins_dir: &Path) -> anyhow::Result<()> {
    for line in list::freeze(plugins_dir)? {
        println!("{line}");
    }
    Ok(())
}

pub fn handle_list(enabled_only: bool, json: bool, plugins_dir: &Path) -> anyhow::Result<()> {
    let plugins = if enabled_only {
        list::enabled_plugins(plugins_dir)?
    } else {
        list::installed_plugins(plugins_dir)?
    };

    if json {
        let entries: Vec<_> = plugins
            .iter()
            .map(|p| {
                serde_json::json!({
                    "package_name": p.package_name,
                    "plugin_name": p.plugin_name,
                    "version": p.version,
                    "path": p.path,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins installed in {}.", plugins_dir.display());
        return Ok(());
    }

    let enabled: HashSet<String> = list::enabled_plugins(plugins_dir)?
        .into_iter()
        .map(|p| p.package_name)
        .collect();
    for p in &plugins {
        let marker = if enabled.contains(&p.package_name) {
            "✓"
        } else {
            " "
        };
        println!("  {marker} {}=={}", p.package_name, p.version);
    }
    Ok(())
}

pub async fn handle_enable(
    plugins: Vec<String>,
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    let result = enable::enable(&plugins, plugins_dir, hooks).await?;
    for (name, newly) in result {
        if newly {
            println!("✓ enabled {name}");
        } else {
            println!("  {name} already enabled");
        }
    }
    Ok(())
}

pub async fn handle_disable(
    plugins: Vec<String>,
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    enable::disable(&plugins, plugins_dir, hooks).await?;
    for name in &plugins {
        println!("✓ disabled {name}");
    }
    Ok(())
}

pub async fn handle_update(
    plugins: Vec<String>,
    plugins_dir: &Path,
    index: &PackageIndex,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    let outcomes = install::update(&plugins, plugins_dir, index, hooks).await?;
    if outcomes.is_empty() {
        println!("No plugins installed in {}.", plugins_dir.display());
        return Ok(());
    }
    for (name, outcome) in outcomes {
        match outcome {
            install::UpdateOutcome::Updated { from, to } => {
                println!("✓ updated {name}: {from} → {to}");
            },
            install::UpdateOutcome::UpToDate => println!("  {name} up to date"),
        }
    }
    Ok(())
}

pub async fn handle_rollback(
    plugins_dir: &Path,
    index: &PackageIndex,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    match revisions::rollback(plugins_dir, index, hooks).await? {
        Some(rev) => println!("✓ rolled back revision {rev}"),
        None => println!("Nothing to roll back."),
    }
    Ok(())
}
