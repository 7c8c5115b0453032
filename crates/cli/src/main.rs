mod hook_commands;
mod plugin_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    mpm_plugins::hooks,
    mpm_registry::{DEFAULT_INDEX_URL, PackageIndex},
};

#[derive(Parser)]
#[command(name = "mpm", about = "MicroDrop plugin manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Plugins directory (overrides config and profile resolution).
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,

    /// Config file path (`mpm.{toml,yaml,json}`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Profile root directory containing `mpm.toml` and `plugins/`.
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Custom data directory (overrides the platform default).
    #[arg(long, global = true, env = "MPM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Plugin index URL (overrides config value).
    #[arg(long, global = true, env = "MPM_INDEX_URL")]
    index_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install plugins from the index or local archives.
    Install {
        /// Plugin descriptors (`foo`, `foo==1.0`, `foo>=1.0`) or archive paths.
        plugins: Vec<String>,
        /// Install from a requirements file, one descriptor per line.
        #[arg(short = 'r', long)]
        requirements: Option<PathBuf>,
    },
    /// Uninstall plugins.
    Uninstall {
        #[arg(required = true)]
        plugins: Vec<String>,
    },
    /// List releases of a plugin available on the index.
    Search {
        /// Plugin descriptor; a specifier narrows the listed releases.
        plugin: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print installed plugins as `name==version` pins.
    Freeze,
    /// List installed plugins.
    List {
        /// Show only enabled plugins.
        #[arg(long)]
        enabled: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Enable installed plugins.
    Enable {
        #[arg(required = true)]
        plugins: Vec<String>,
    },
    /// Disable enabled plugins.
    Disable {
        #[arg(required = true)]
        plugins: Vec<String>,
    },
    /// Update plugins to the newest index release (all installed by default).
    Update { plugins: Vec<String> },
    /// Undo the most recent install/uninstall/enable/disable.
    Rollback,
    /// Hook management.
    Hooks {
        #[command(subcommand)]
        action: hook_commands::HookCommand,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = &cli.data_dir {
        mpm_config::set_data_dir(dir.clone());
    }

    let config = match &cli.config {
        Some(path) => match mpm_config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e:#}");
                std::process::exit(2);
            },
        },
        None => mpm_config::discover_and_load(),
    };

    let plugins_dir = match &cli.plugins_dir {
        Some(dir) => dir.clone(),
        None => mpm_config::resolve_plugins_dir(cli.config.as_deref(), cli.profile.as_deref()).0,
    };

    let index_url = cli
        .index_url
        .clone()
        .or_else(|| config.index.url.clone())
        .unwrap_or_else(|| DEFAULT_INDEX_URL.to_string());
    let index = PackageIndex::new(index_url);
    let registry = hooks::build_registry(&config.hooks);

    let result = match cli.command {
        Commands::Install {
            plugins,
            requirements,
        } => {
            plugin_commands::handle_install(plugins, requirements, &plugins_dir, &index, &registry)
                .await
        },
        Commands::Uninstall { plugins } => {
            plugin_commands::handle_uninstall(plugins, &plugins_dir, &registry).await
        },
        Commands::Search { plugin, json } => {
            plugin_commands::handle_search(&plugin, json, &index).await
        },
        Commands::Freeze => plugin_commands::handle_freeze(&plugins_dir),
        Commands::List { enabled, json } => {
            plugin_commands::handle_list(enabled, json, &plugins_dir)
        },
        Commands::Enable { plugins } => {
            plugin_commands::handle_enable(plugins, &plugins_dir, &registry).await
        },
        Commands::Disable { plugins } => {
            plugin_commands::handle_disable(plugins, &plugins_dir, &registry).await
        },
        Commands::Update { plugins } => {
            plugin_commands::handle_update(plugins, &plugins_dir, &index, &registry).await
        },
        Commands::Rollback => {
            plugin_commands::handle_rollback(&plugins_dir, &index, &registry).await
        },
        Commands::Hooks { action } => {
            hook_commands::handle_hooks(action, &plugins_dir, &registry).await
        },
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "operation failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
