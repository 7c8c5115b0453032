//! Plugin release builder.
//!
//! Stages a plugin source tree into a target directory (skipping VCS and
//! build droppings), writes its `properties.yml`, and packs a
//! `<module>-<version>.tar.gz` release archive rooted at a single top-level
//! directory, which is what the installer expects to unpack.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, bail},
    tracing::info,
    walkdir::WalkDir,
};

use mpm_plugins::types::PluginProperties;

/// Top-level names excluded from a staged release.
const SKIP_NAMES: &[&str] = &[".mpm-recipe", "target"];

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Package name; defaults to the target directory name.
    pub package_name: Option<String>,
    /// Release version; defaults to `0.1.alpha` for unversioned builds.
    pub version: Option<String>,
}

/// Stage the plugin, write `properties.yml`, and pack the release archive.
/// Returns the archive path.
pub fn build(opts: &BuildOptions) -> anyhow::Result<PathBuf> {
    let source_dir = opts
        .source_dir
        .canonicalize()
        .with_context(|| format!("source directory {}", opts.source_dir.display()))?;
    let target_dir = &opts.target_dir;
    std::fs::create_dir_all(target_dir)?;

    let plugin_name = target_dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("target directory {} has no name", target_dir.display()))?;
    let package_name = opts.package_name.clone().unwrap_or_else(|| plugin_name.clone());
    let version = opts.version.clone().unwrap_or_else(|| "0.1.alpha".to_string());

    info!(
        source = %source_dir.display(),
        target = %target_dir.display(),
        package = %package_name,
        %version,
        "building plugin release"
    );

    stage(&source_dir, target_dir)?;

    let props = PluginProperties {
        package_name,
        plugin_name: plugin_name.clone(),
        version: version.clone(),
        path: PathBuf::new(),
    };
    std::fs::write(
        target_dir.join("properties.yml"),
        serde_yaml::to_string(&props)?,
    )?;

    let archive_path = target_dir
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{plugin_name}-{version}.tar.gz"));
    pack(target_dir, &archive_path, &format!("{plugin_name}-{version}"))?;

    info!(archive = %archive_path.display(), "packed release archive");
    Ok(archive_path)
}

fn should_skip(rel: &Path) -> bool {
    let Some(first) = rel.components().next() else {
        return false;
    };
    let first = first.as_os_str().to_string_lossy();
    first.starts_with(".git") || SKIP_NAMES.iter().any(|name| first == *name)
}

/// Copy the source tree into the target directory. Symlinks are dropped
/// from releases.
fn stage(source_dir: &Path, target_dir: &Path) -> anyhow::Result<()> {
    let canonical_target = std::fs::canonicalize(target_dir)?;
    if canonical_target == source_dir {
        bail!("target directory must differ from the source directory");
    }

    for entry in WalkDir::new(source_dir) {
        let entry = entry?;
        // Never stage the target into itself when it nests under the source.
        if entry.path().starts_with(&canonical_target) {
            continue;
        }
        let rel = entry.path().strip_prefix(source_dir)?;
        if rel.as_os_str().is_empty() || should_skip(rel) {
            continue;
        }

        let dest = target_dir.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Pack the staged directory as `<top_level>/…` into a gzipped tar archive.
fn pack(staged_dir: &Path, archive_path: &Path, top_level: &str) -> anyhow::Result<()> {
    let file = std::fs::File::create(archive_path)
        .with_context(|| format!("failed to create {}", archive_path.display()))?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(top_level, staged_dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mpm_plugins::archive};

    fn seed_source(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        std::fs::create_dir_all(dir.join(".mpm-recipe")).unwrap();
        std::fs::write(dir.join("src/plugin.py"), "print('hi')\n").unwrap();
        std::fs::write(dir.join("README.md"), "# plugin\n").unwrap();
        std::fs::write(dir.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(dir.join(".gitignore"), "target\n").unwrap();
        std::fs::write(dir.join(".mpm-recipe/meta.yml"), "recipe\n").unwrap();
    }

    #[test]
    fn build_stages_writes_properties_and_packs() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("checkout");
        let target = tmp.path().join("out/foo_plugin");
        seed_source(&source);

        let archive_path = build(&BuildOptions {
            source_dir: source,
            target_dir: target.clone(),
            package_name: Some("microdrop.foo-plugin".into()),
            version: Some("1.2".into()),
        })
        .unwrap();

        // Staged tree: sources in, droppings out.
        assert!(target.join("src/plugin.py").is_file());
        assert!(target.join("README.md").is_file());
        assert!(!target.join(".git").exists());
        assert!(!target.join(".gitignore").exists());
        assert!(!target.join(".mpm-recipe").exists());

        let props: PluginProperties =
            serde_yaml::from_str(&std::fs::read_to_string(target.join("properties.yml")).unwrap())
                .unwrap();
        assert_eq!(props.package_name, "microdrop.foo-plugin");
        assert_eq!(props.plugin_name, "foo_plugin");
        assert_eq!(props.version, "1.2");

        assert_eq!(
            archive_path.file_name().and_then(|n| n.to_str()),
            Some("foo_plugin-1.2.tar.gz")
        );
        assert!(archive_path.is_file());
    }

    #[test]
    fn archive_round_trips_through_the_installer_primitives() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("checkout");
        let target = tmp.path().join("out/foo_plugin");
        seed_source(&source);

        let archive_path = build(&BuildOptions {
            source_dir: source,
            target_dir: target,
            package_name: Some("microdrop.foo-plugin".into()),
            version: Some("1.2".into()),
        })
        .unwrap();

        let bytes = std::fs::read(&archive_path).unwrap();
        let props = archive::extract_properties(&bytes).unwrap();
        assert_eq!(props.package_name, "microdrop.foo-plugin");
        assert_eq!(props.version, "1.2");

        let unpacked = tmp.path().join("unpacked");
        archive::unpack_archive(&bytes, &unpacked).unwrap();
        assert!(unpacked.join("properties.yml").is_file());
        assert!(unpacked.join("src/plugin.py").is_file());
    }

    #[test]
    fn defaults_for_package_name_and_version() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("checkout");
        let target = tmp.path().join("out/bare_plugin");
        seed_source(&source);

        build(&BuildOptions {
            source_dir: source,
            target_dir: target.clone(),
            package_name: None,
            version: None,
        })
        .unwrap();

        let props: PluginProperties =
            serde_yaml::from_str(&std::fs::read_to_string(target.join("properties.yml")).unwrap())
                .unwrap();
        assert_eq!(props.package_name, "bare_plugin");
        assert_eq!(props.version, "0.1.alpha");
    }

    #[test]
    fn skip_list_matches_top_level_components_only() {
        assert!(should_skip(Path::new(".git/HEAD")));
        assert!(should_skip(Path::new(".gitattributes")));
        assert!(should_skip(Path::new("target/debug/foo")));
        assert!(should_skip(Path::new(".mpm-recipe/meta.yml")));
        assert!(!should_skip(Path::new("src/target/keep.py")));
        assert!(!should_skip(Path::new("docs/.gitkeep.md")));
    }
}
