use clap::{ArgAction, Parser, Subcommand};
use commands::context::AppContext;
use commands::{config, daemon, media, status, sync};
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "sweeparr")]
#[command(about = "Sweeparr - Retention rules and a leaving-soon preview for your media library")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle now
    #[command(long_about = "Fetch the library from the managers, evaluate the retention rules, update the leaving-soon preview and, when both dry_run is off and enable_deletion is on, delete overdue items.")]
    Sync {
        /// Only refresh watch state, requesters and history
        #[arg(long, action = ArgAction::SetTrue)]
        incremental: bool,
    },
    /// Run as a long-lived service with full and incremental timers
    #[command(long_about = "Run Sweeparr in the foreground, syncing on the full and incremental intervals from the configuration. The configuration is re-read before every cycle. Stops on Ctrl-C.")]
    Daemon {
        /// Skip the sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },
    /// Show the latest sync job
    Status {
        /// Also list this many recent jobs
        #[arg(long, value_name = "N")]
        history: Option<usize>,
    },
    /// Items whose deletion date falls within the preview window
    LeavingSoon,
    /// List catalogued movies (or series)
    List {
        #[arg(long, action = ArgAction::SetTrue)]
        series: bool,
    },
    /// Show one item by internal ID or title
    Show {
        /// Internal ID (e.g. movie:tmdb:603) or title
        query: String,
    },
    /// Protect an item from deletion
    Exclude {
        /// Internal ID or exact title
        id: String,

        #[arg(long, default_value = "excluded manually")]
        reason: String,
    },
    /// Remove an exclusion
    Include {
        /// Internal ID or exact title
        id: String,
    },
    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate the configuration
    Validate {
        /// Also ping every enabled integration
        #[arg(long, action = ArgAction::SetTrue)]
        ping: bool,
    },
    /// Show current configuration (masks API keys)
    Show {
        /// Show API keys unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Print the paths Sweeparr reads and writes
    Path,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config.clone())?;

    let log_file = match cli.command {
        Commands::Daemon { .. } => ctx.logging_settings().file,
        _ => None,
    };
    logging::init_logging(cli.verbose, cli.quiet, &ctx.logging_settings(), log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync { incremental } => sync::run_sync(&ctx, incremental, &output).await,
        Commands::Daemon { no_startup_sync } => daemon::run_daemon(&ctx, no_startup_sync, &output).await,
        Commands::Status { history } => status::run_status(&ctx, history, &output).await,
        Commands::LeavingSoon => media::run_leaving_soon(&ctx, &output).await,
        Commands::List { series } => media::run_list(&ctx, series, &output).await,
        Commands::Show { query } => media::run_show(&ctx, &query, &output).await,
        Commands::Exclude { id, reason } => media::run_exclude(&ctx, &id, &reason, &output).await,
        Commands::Include { id } => media::run_include(&ctx, &id, &output).await,
        Commands::Config { cmd } => config::run_config(&ctx, cmd, &output).await,
    }
}
