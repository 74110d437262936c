mod install_commands;
mod marketplace_commands;
mod skill_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    skillforge_config::{SkillforgePaths, paths::expand_tilde},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skillforge", about = "SkillForge - agent skills from marketplaces", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Project directory holding `.skillforge/manifest.json` (defaults to the
    /// current directory).
    #[arg(long, global = true, hide = true)]
    project_root: Option<PathBuf>,

    /// Custom config directory (overrides default ~/.skillforge/).
    #[arg(long, global = true, env = "SKILLFORGE_HOME")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List skills installed in this project.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Discover skills through the project's `skill_paths` patterns.
    Discover {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print a skill's instructions.
    Read {
        /// Skill name.
        name: String,
        /// Directory whose subdirectories are searched.
        #[arg(long, default_value = "./skills")]
        from: PathBuf,
    },
    /// Install a skill (skill@marketplace).
    Install {
        spec: String,
        /// Destination directory; the skill lands in `<to>/<skill>`.
        #[arg(long, default_value = "./skills")]
        to: PathBuf,
        /// Replace an existing installation.
        #[arg(long)]
        force: bool,
    },
    /// Uninstall a skill.
    Uninstall {
        name: String,
        /// Stop tracking the skill but leave its files.
        #[arg(long)]
        keep_files: bool,
        /// Do not ask for confirmation.
        #[arg(long)]
        force: bool,
    },
    /// Marketplace management.
    Marketplace {
        #[command(subcommand)]
        action: marketplace_commands::MarketplaceAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn resolve_paths(cli: &Cli) -> anyhow::Result<SkillforgePaths> {
    let project_root = match &cli.project_root {
        Some(root) => expand_tilde(root),
        None => std::env::current_dir()?,
    };
    let paths = match &cli.config_dir {
        Some(dir) => SkillforgePaths::new(project_root, expand_tilde(dir)),
        None => SkillforgePaths::from_env_or_defaults(project_root)?,
    };
    debug!(
        project_root = %paths.project_root.display(),
        config_dir = %paths.config_dir.display(),
        "resolved paths"
    );
    Ok(paths)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let paths = resolve_paths(&cli)?;

    match cli.command {
        Commands::List { json } => skill_commands::handle_list(&paths, json),
        Commands::Discover { json } => skill_commands::handle_discover(&paths, json),
        Commands::Read { name, from } => skill_commands::handle_read(&paths, &name, &from),
        Commands::Install { spec, to, force } => {
            install_commands::handle_install(&paths, &spec, &to, force)
        },
        Commands::Uninstall {
            name,
            keep_files,
            force,
        } => install_commands::handle_uninstall(&paths, &name, keep_files, force),
        Commands::Marketplace { action } => marketplace_commands::handle_marketplace(&paths, action),
    }
}
