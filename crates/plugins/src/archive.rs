//! Plugin archive handling: tar.gz unpack with path sanitization and
//! metadata extraction.

use std::{
    io::Read,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, bail};

use crate::types::PluginProperties;

/// Unpack a `.tar.gz` plugin archive into `target`, stripping the archive's
/// single top-level directory.
///
/// Symlink and hardlink entries are skipped; no entry may escape the target
/// directory.
pub fn unpack_archive(bytes: &[u8], target: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(target)?;
    let canonical_target = std::fs::canonicalize(target)?;
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_symlink() || entry.header().entry_type().is_hard_link() {
            tracing::warn!(
                path = %entry.path().map(|p| p.display().to_string()).unwrap_or_default(),
                "skipping symlink/hardlink archive entry"
            );
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(stripped) = sanitize_archive_path(&path)? else {
            continue;
        };

        let dest = target.join(&stripped);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
            let canonical_parent = std::fs::canonicalize(parent)?;
            if !canonical_parent.starts_with(&canonical_target) {
                bail!("archive entry escaped plugin directory");
            }
        }

        if dest.exists() {
            let meta = std::fs::symlink_metadata(&dest)?;
            if meta.file_type().is_symlink() {
                bail!("archive entry resolves to symlink destination");
            }
        }

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }

        entry.unpack(&dest)?;
    }

    Ok(())
}

/// Read `properties.yml` out of a plugin archive without unpacking it.
pub fn extract_properties(bytes: &[u8]) -> anyhow::Result<PluginProperties> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(stripped) = sanitize_archive_path(&path)? else {
            continue;
        };
        if stripped == Path::new("properties.yml") {
            let mut contents = String::new();
            entry.read_to_string(&mut contents)?;
            return serde_yaml::from_str(&contents).context("invalid properties.yml in archive");
        }
    }

    bail!("archive does not contain a properties.yml")
}

/// Strip the archive's top-level directory and reject unsafe components.
fn sanitize_archive_path(path: &Path) -> anyhow::Result<Option<PathBuf>> {
    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }

    for component in stripped.components() {
        match component {
            Component::Normal(_) => {},
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("archive contains unsafe path component: {}", path.display());
            },
        }
    }

    Ok(Some(stripped))
}
