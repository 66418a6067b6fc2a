//! Herald CLI - run the orchestration pipeline against recorded events.
//!
//! Provides a `herald` command that replays event files through the
//! orchestrator with simulated integrations, previews plans and inspects the
//! tool catalog and configuration.

mod commands;
mod config;
mod integrations;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use herald_orchestrator::{HeraldConfig, LogFormat};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Herald - event-driven task orchestration
///
/// Turns tracker and CI events into prioritized tasks, plans a chain of tool
/// calls for each and executes it.
#[derive(Parser, Debug)]
#[command(name = "herald", author, version, about = "Herald - event-driven task orchestration")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file (overrides HERALD_CONFIG and ./herald.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an event file through the orchestrator
    ///
    /// Reads one JSON event per line (`{"type": "...", "payload": {...}}`),
    /// processes every resulting task and prints the outcome.
    Run {
        /// JSON Lines event file
        events: PathBuf,

        /// Seed notification history from a JSON array of records
        #[arg(long)]
        history: Option<PathBuf>,

        /// Make a tool fail on every call (repeatable)
        #[arg(long = "fail-tool", value_name = "TOOL")]
        fail_tools: Vec<String>,

        /// Override the concurrency cap
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the plan an event would produce, without executing it
    Plan {
        /// Event type (e.g. build.completed)
        event_type: String,

        /// Event payload as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Seed notification history from a JSON array of records
        #[arg(long)]
        history: Option<PathBuf>,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the registered tools
    Tools {
        /// Only show tools in this category (fetch, summarize, notify)
        #[arg(long)]
        category: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_telemetry(config: &HeraldConfig, level: Option<&str>) {
    let level = level.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output stays machine-readable.
    match config.logging.format {
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().without_time().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut herald_config = config::load_config(args.config.as_deref())?;
    init_telemetry(&herald_config, args.log_level.as_deref());

    match args.command {
        Command::Run { events, history, fail_tools, max_concurrent, json } => {
            if let Some(cap) = max_concurrent {
                herald_config = herald_config.with_max_concurrent_tasks(cap);
                herald_config.validate()?;
            }
            commands::run::execute(herald_config, &events, history.as_deref(), &fail_tools, json).await?;
        }
        Command::Plan { event_type, payload, history, json } => {
            commands::plan::execute(herald_config, &event_type, &payload, history.as_deref(), json).await?;
        }
        Command::Tools { category, json } => {
            commands::tools::list(category.as_deref(), json)?;
        }
        Command::Config => {
            commands::config::show(&herald_config)?;
        }
    }

    Ok(())
}
