//! `microdrop-plugin-build` — build a plugin release from a source tree.
//!
//! Packaging scripts can omit the flags and drive the build through the
//! `MPM_SRC_DIR`, `MPM_PREFIX`, and `MPM_PKG_NAME` environment variables,
//! in which case the release stages into
//! `<prefix>/share/mpm/plugins/available/<module>`.

use std::path::PathBuf;

use {anyhow::Context, clap::Parser, tracing_subscriber::EnvFilter};

use {
    mpm_build::{BuildOptions, build},
    mpm_plugins::types::plugin_module_name,
};

#[derive(Parser)]
#[command(
    name = "microdrop-plugin-build",
    about = "MicroDrop plugin release builder"
)]
struct Args {
    /// Plugin source directory.
    #[arg(short = 's', long, env = "MPM_SRC_DIR")]
    source_dir: PathBuf,

    /// Target directory to stage the release into.
    #[arg(short = 't', long)]
    target_dir: Option<PathBuf>,

    /// Package name.
    #[arg(short = 'p', long, env = "MPM_PKG_NAME")]
    package_name: Option<String>,

    /// Package version number.
    #[arg(short = 'V', long)]
    version_number: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn resolve_target(args: &Args) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &args.target_dir {
        return Ok(dir.clone());
    }
    let prefix = std::env::var("MPM_PREFIX")
        .map(PathBuf::from)
        .ok()
        .context("either --target-dir or MPM_PREFIX must be set")?;
    let package = args
        .package_name
        .as_deref()
        .context("--package-name (or MPM_PKG_NAME) is required with MPM_PREFIX")?;
    Ok(prefix
        .join("share/mpm/plugins/available")
        .join(plugin_module_name(package)))
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let target_dir = match resolve_target(&args) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        },
    };

    let opts = BuildOptions {
        source_dir: args.source_dir.clone(),
        target_dir,
        package_name: args.package_name.clone(),
        version: args.version_number.clone(),
    };
    match build(&opts) {
        Ok(archive) => println!("✓ built {}", archive.display()),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        },
    }
}
