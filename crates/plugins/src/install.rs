//! Plugin installation, removal, and update.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    anyhow::{Context, bail},
    tracing::info,
};

use {
    mpm_common::hooks::{HookAction, HookPayload, HookRegistry},
    mpm_registry::{PackageIndex, PluginRequest, Version, client::is_connectivity_error},
};

use crate::{
    archive, list,
    manifest::ManifestStore,
    revisions,
    types::{PluginEntry, PluginProperties, plugin_module_name},
};

/// Install a plugin from the index (by descriptor, e.g. `foo` or
/// `foo>=1.0`) or from a local `.tar.gz` archive path.
///
/// Installing the already-installed version is an error; a different
/// installed version is replaced, keeping its enabled flag.
pub async fn install(
    source: &str,
    plugins_dir: &Path,
    index: &PackageIndex,
    hooks: &HookRegistry,
) -> anyhow::Result<PluginProperties> {
    let (bytes, expected) = if Path::new(source).is_file() {
        let bytes = tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read archive {source}"))?;
        (bytes, None)
    } else {
        let request: PluginRequest = source.parse()?;
        let set = index.releases(&request).await?;
        let (version, release) = set
            .latest()
            .with_context(|| format!("no releases for '{}'", request.name))?;
        info!(package = %set.name, version = %version, "resolved release");
        let bytes = index.download(release).await?;
        (bytes, Some((set.name.clone(), version.clone())))
    };

    install_archive(bytes, expected, plugins_dir, hooks).await
}

async fn install_archive(
    bytes: Vec<u8>,
    expected: Option<(String, Version)>,
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<PluginProperties> {
    let props = {
        let bytes = bytes.clone();
        tokio::task::spawn_blocking(move || archive::extract_properties(&bytes)).await??
    };

    if let Some((name, version)) = &expected
        && (props.package_name != *name || props.version != version.to_string())
    {
        bail!(
            "archive metadata mismatch: got {}=={}, expected {name}=={version}",
            props.package_name,
            props.version
        );
    }

    let directory = plugin_module_name(&props.package_name);
    let plugin_dir = plugins_dir.join(&directory);

    let store = ManifestStore::for_plugins_dir(plugins_dir);
    let mut manifest = store.load_pruned(plugins_dir)?;
    let existing = manifest.find_plugin(&props.package_name).cloned();
    let was_enabled = existing.as_ref().is_some_and(|e| e.enabled);

    match &existing {
        Some(entry) if entry.version == props.version => {
            bail!(
                "`{}=={}` is already installed",
                props.package_name,
                props.version
            );
        },
        Some(entry) => {
            info!(
                package = %props.package_name,
                old = %entry.version,
                new = %props.version,
                "replacing installed version"
            );
        },
        None if plugin_dir.exists() => {
            bail!(
                "plugin directory already exists and is not managed by mpm: {}",
                plugin_dir.display()
            );
        },
        None => {},
    }

    let pre_state = revisions::capture(plugins_dir)?;

    if let Some(entry) = &existing {
        tokio::fs::remove_dir_all(plugins_dir.join(&entry.directory))
            .await
            .with_context(|| format!("failed to remove previous {}", entry.directory))?;
        manifest.remove_plugin(&props.package_name);
    }

    info!(package = %props.package_name, version = %props.version, "installing plugin");
    {
        let target = plugin_dir.clone();
        tokio::task::spawn_blocking(move || archive::unpack_archive(&bytes, &target)).await??;
    }

    // The unpacked metadata must agree with what the archive advertised.
    let unpacked = list::read_properties(&plugin_dir)?;
    if unpacked.package_name != props.package_name || unpacked.version != props.version {
        let _ = tokio::fs::remove_dir_all(&plugin_dir).await;
        bail!(
            "unpacked plugin reports {}=={}, archive advertised {}=={}",
            unpacked.package_name,
            unpacked.version,
            props.package_name,
            props.version
        );
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    manifest.add_plugin(PluginEntry {
        package_name: props.package_name.clone(),
        directory,
        version: props.version.clone(),
        installed_at_ms: now,
        enabled: was_enabled,
    });
    store.save(&manifest)?;

    revisions::record(
        plugins_dir,
        &format!("install {}", props.package_name),
        pre_state,
    )?;

    let _ = hooks
        .dispatch(&HookPayload::PostInstall {
            package_name: props.package_name.clone(),
            version: props.version.clone(),
            plugin_dir: plugin_dir.clone(),
        })
        .await;

    Ok(unpacked)
}

/// Uninstall a plugin by package name.
///
/// The pre-uninstall hook runs first and may block the removal.
pub async fn uninstall(
    package_name: &str,
    plugins_dir: &Path,
    hooks: &HookRegistry,
) -> anyhow::Result<()> {
    let store = ManifestStore::for_plugins_dir(plugins_dir);
    let mut manifest = store.load_pruned(plugins_dir)?;

    let directory = manifest
        .find_plugin(package_name)
        .map(|e| e.directory.clone())
        .unwrap_or_else(|| plugin_module_name(package_name));
    let plugin_dir = plugins_dir.join(&directory);
    if !plugin_dir.is_dir() {
        bail!(
            "plugin `{package_name}` is not installed in `{}`",
            plugins_dir.display()
        );
    }

    let version = list::read_properties(&plugin_dir).ok().map(|p| p.version);

    let action = hooks
        .dispatch(&HookPayload::PreUninstall {
            package_name: package_name.to_string(),
            version: version.clone(),
            plugin_dir: plugin_dir.clone(),
        })
        .await?;
    if let HookAction::Block(reason) = action {
        bail!("uninstall of `{package_name}` blocked by hook: {reason}");
    }

    match &version {
        Some(version) => info!(package = %package_name, %version, "uninstalling plugin"),
        None => info!(package = %package_name, "uninstalling plugin"),
    }

    let pre_state = revisions::capture(plugins_dir)?;

    tokio::fs::remove_dir_all(&plugin_dir)
        .await
        .with_context(|| format!("failed to remove {}", plugin_dir.display()))?;
    manifest.remove_plugin(package_name);
    store.save(&manifest)?;

    revisions::record(plugins_dir, &format!("uninstall {package_name}"), pre_state)?;
    Ok(())
}

/// Outcome of updating one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { from: String, to: String },
    UpToDate,
}

/// Update the named plugins (all installed plugins when `package_names` is
/// empty) to the newest release on the index.
pub async fn update(
    package_names: &[String],
    plugins_dir: &Path,
    index: &PackageIndex,
    hooks: &HookRegistry,
) -> anyhow::Result<Vec<(String, UpdateOutcome)>> {
    let installed = list::installed_plugins(plugins_dir)?;
    let targets: Vec<PluginProperties> = if package_names.is_empty() {
        installed
    } else {
        let mut targets = Vec::new();
        for name in package_names {
            match installed.iter().find(|p| &p.package_name == name) {
                Some(props) => targets.push(props.clone()),
                None => bail!(
                    "plugin `{name}` is not installed in `{}`",
                    plugins_dir.display()
                ),
            }
        }
        targets
    };

    if targets.is_empty() {
        return Ok(Vec::new());
    }

    info!(
        plugins = %targets
            .iter()
            .map(|p| p.package_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        "updating plugins"
    );

    let mut outcomes = Vec::new();
    for props in targets {
        let request = PluginRequest::unconstrained(props.package_name.as_str());
        let set = match index.releases(&request).await {
            Ok(set) => set,
            Err(err) if is_connectivity_error(&err) => {
                bail!("error accessing update server at {}", index.base_url());
            },
            Err(err) => {
                return Err(err.context(format!("updating {}", props.package_name)));
            },
        };

        let current: Version = props.version.parse().with_context(|| {
            format!(
                "installed version of {} is unparsable: {}",
                props.package_name, props.version
            )
        })?;
        let (latest, _) = set
            .latest()
            .with_context(|| format!("no releases for '{}'", props.package_name))?;

        if *latest > current {
            let descriptor = format!("{}=={latest}", props.package_name);
            install(&descriptor, plugins_dir, index, hooks).await?;
            let plugin_dir = plugins_dir.join(plugin_module_name(&props.package_name));
            let _ = hooks
                .dispatch(&HookPayload::PostUpdate {
                    package_name: props.package_name.clone(),
                    old_version: props.version.clone(),
                    new_version: latest.to_string(),
                    plugin_dir,
                })
                .await;
            outcomes.push((
                props.package_name.clone(),
                UpdateOutcome::Updated {
                    from: props.version.clone(),
                    to: latest.to_string(),
                },
            ));
        } else {
            outcomes.push((props.package_name.clone(), UpdateOutcome::UpToDate));
        }
    }

    Ok(outcomes)
}
