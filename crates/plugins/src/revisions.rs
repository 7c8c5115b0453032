//! Revision snapshots and rollback.
//!
//! Every mutating operation captures the (package, version, enabled) set
//! before it runs and, on success, records it as `rev<N>.json.gz` under
//! `<plugins dir>/.actions/`. `rollback` restores the newest snapshot and
//! consumes it, so repeated rollbacks walk backwards through history.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use {
    anyhow::Context,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use {
    mpm_common::hooks::HookRegistry,
    mpm_registry::PackageIndex,
};

use crate::{install, manifest::ManifestStore};

const ACTIONS_DIR: &str = ".actions";

/// A recorded pre-operation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub rev: u64,
    pub op: String,
    pub plugins: Vec<SnapshotPlugin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPlugin {
    pub package_name: String,
    pub version: String,
    pub enabled: bool,
}

fn actions_dir(plugins_dir: &Path) -> PathBuf {
    plugins_dir.join(ACTIONS_DIR)
}

fn rev_path(plugins_dir: &Path, rev: u64) -> PathBuf {
    actions_dir(plugins_dir).join(format!("rev{rev}.json.gz"))
}

fn parse_rev_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("rev")?
        .strip_suffix(".json.gz")?
        .parse()
        .ok()
}

/// Capture the current plugin state for a later [`record`].
pub fn capture(plugins_dir: &Path) -> anyhow::Result<Vec<SnapshotPlugin>> {
    let manifest = ManifestStore::for_plugins_dir(plugins_dir).load_pruned(plugins_dir)?;
    Ok(manifest
        .plugins
        .iter()
        .map(|e| SnapshotPlugin {
            package_name: e.package_name.clone(),
            version: e.version.clone(),
            enabled: e.enabled,
        })
        .collect())
}

/// Latest recorded revision number, if any.
pub fn latest_revision(plugins_dir: &Path) -> anyhow::Result<Option<u64>> {
    let dir = actions_dir(plugins_dir);
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut latest = None;
    for entry in std::fs::read_dir(&dir)?.flatten() {
        if let Some(rev) = parse_rev_file_name(&entry.file_name().to_string_lossy()) {
            latest = latest.max(Some(rev));
        }
    }
    Ok(latest)
}

/// Record a pre-operation snapshot after the operation succeeded.
pub fn record(
    plugins_dir: &Path,
    op: &str,
    plugins: Vec<SnapshotPlugin>,
) -> anyhow::Result<PathBuf> {
    let rev = latest_revision(plugins_dir)?.map_or(1, |r| r + 1);
    let snapshot = Snapshot {
        rev,
        op: op.to_string(),
        plugins,
    };

    std::fs::create_dir_all(actions_dir(plugins_dir))?;
    let path = rev_path(plugins_dir, rev);
    let file = std::fs::File::create(&path)?;
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::best());
    serde_json::to_writer_pretty(&mut encoder, &snapshot)?;
    encoder.finish()?;

    debug!(rev, op, path = %path.display(), "recorded revision snapshot");
    Ok(path)
}

/// Load a snapshot file.
pub fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open snapshot {}", path.display()))?;
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut raw = String::new();
    decoder.read_to_string(&mut raw)?;
    serde_json::from_str(&raw).with_context(|| format!("invalid snapshot {}", path.display()))
}

/// Restore the newest snapshot. Returns the revision restored, or `None` if
/// no snapshots have been recorded.
///
/// Plugins that did not exist at snapshot time are uninstalled; recorded
/// versions that are missing or differ are reinstalled from the index;
/// enabled flags are restored. The consumed snapshot (and any snapshots the
/// restore itself recorded) are removed afterwards.
pub async fn rollback(
    plugins_dir: &Path,
    index: &PackageIndex,
    hooks: &HookRegistry,
) -> anyhow::Result<Option<u64>> {
    let Some(rev) = latest_revision(plugins_dir)? else {
        debug!("no rollback actions have been recorded");
        return Ok(None);
    };
    let snapshot = load_snapshot(&rev_path(plugins_dir, rev))?;
    info!(rev, op = %snapshot.op, "rolling back");

    let current = capture(plugins_dir)?;

    // Remove plugins that did not exist at snapshot time.
    for plugin in &current {
        if !snapshot
            .plugins
            .iter()
            .any(|s| s.package_name == plugin.package_name)
        {
            install::uninstall(&plugin.package_name, plugins_dir, hooks).await?;
        }
    }

    // Reinstall recorded versions where missing or different.
    for wanted in &snapshot.plugins {
        let have = current
            .iter()
            .find(|p| p.package_name == wanted.package_name);
        if have.is_none_or(|p| p.version != wanted.version) {
            let descriptor = format!("{}=={}", wanted.package_name, wanted.version);
            install::install(&descriptor, plugins_dir, index, hooks).await?;
        }
    }

    // Restore enabled flags.
    let store = ManifestStore::for_plugins_dir(plugins_dir);
    let mut manifest = store.load_pruned(plugins_dir)?;
    for wanted in &snapshot.plugins {
        manifest.set_enabled(&wanted.package_name, wanted.enabled);
    }
    store.save(&manifest)?;

    // Consume this snapshot plus anything recorded during the restore.
    let dir = actions_dir(plugins_dir);
    for entry in std::fs::read_dir(&dir)?.flatten() {
        if parse_rev_file_name(&entry.file_name().to_string_lossy()).is_some_and(|r| r >= rev) {
            std::fs::remove_file(entry.path())?;
        }
    }

    info!(rev, "rolled back");
    Ok(Some(rev))
}
