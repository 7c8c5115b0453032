//! `microdrop-plugin-api` — inspect an installed plugin by package name.
//!
//! Resolves the named plugin in the plugins directory, verifies its layout
//! (a real directory with a parseable `properties.yml` whose package name
//! matches), and prints the properties as JSON. Exits non-zero when the
//! plugin is missing or, without `--include-disabled`, not enabled.

use std::path::{Path, PathBuf};

use {anyhow::Context, clap::Parser, tracing_subscriber::EnvFilter};

use mpm_plugins::list;

#[derive(Parser)]
#[command(
    name = "microdrop-plugin-api",
    about = "MicroDrop plugin inspection tool"
)]
struct Args {
    /// Plugin package name.
    package_name: String,

    /// Also resolve plugins that are installed but not enabled.
    #[arg(short = 'a', long)]
    include_disabled: bool,

    /// Plugins directory (overrides config and profile resolution).
    #[arg(long)]
    plugins_dir: Option<PathBuf>,

    /// Config file path (`mpm.{toml,yaml,json}`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Profile root directory.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn run(args: &Args, plugins_dir: &Path) -> anyhow::Result<()> {
    let pool = if args.include_disabled {
        list::installed_plugins(plugins_dir)?
    } else {
        list::enabled_plugins(plugins_dir)?
    };

    let hint = if args.include_disabled {
        ""
    } else {
        " (enabled plugins only; try --include-disabled)"
    };
    let props = pool
        .into_iter()
        .find(|p| p.package_name == args.package_name)
        .with_context(|| {
            format!(
                "plugin `{}` not found in `{}`{hint}",
                args.package_name,
                plugins_dir.display()
            )
        })?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "package_name": props.package_name,
            "plugin_name": props.plugin_name,
            "version": props.version,
            "path": props.path,
        }))?
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let plugins_dir = args.plugins_dir.clone().unwrap_or_else(|| {
        mpm_config::resolve_plugins_dir(args.config.as_deref(), args.profile.as_deref()).0
    });

    if let Err(e) = run(&args, &plugins_dir) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
