//! Quarry CLI: terminal front end for the Quarry research loop.
//!
//! Runs a single research task, serves the HTTP API, or inspects configuration.

mod commands;
mod render;
mod trace;

use clap::Parser;
use quarry_core::Tier;
use quarry_core::config::LimitOverrides;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Quarry: bounded, citation-checked web research
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about, long_about = None)]
struct Cli {
    /// Research task to run
    task: Option<String>,

    /// Depth tier: simple, standard, deep
    #[arg(short, long)]
    tier: Option<Tier>,

    /// Maximum plan/search/reflect cycles
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Maximum queries per cycle
    #[arg(long)]
    max_queries: Option<usize>,

    /// Maximum results kept per query
    #[arg(long)]
    max_sources: Option<usize>,

    /// Research persona, by id or name (see `quarry agents`)
    #[arg(short, long)]
    agent: Option<String>,

    /// Wall-clock limit in seconds
    #[arg(long)]
    max_seconds: Option<u64>,

    /// Model token budget for the run
    #[arg(long)]
    token_budget: Option<u64>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Write the run trace to this directory
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn overrides(&self) -> LimitOverrides {
        LimitOverrides {
            max_iterations: self.max_iterations,
            max_queries: self.max_queries,
            max_sources: self.max_sources,
            max_wall_clock_secs: self.max_seconds,
            token_budget: self.token_budget,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the research HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8088")]
        addr: SocketAddr,
    },
    /// List the research personas available to --agent
    Agents,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file to the workspace
    Init,
    /// Show the resolved configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_dir = directories::ProjectDirs::from("dev", "quarry", "quarry")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "quarry.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("quarry_core=debug,quarry=debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let overrides = cli.overrides();
    match cli.command {
        Some(Commands::Config { action }) => {
            commands::handle_config(action, &workspace, cli.config.as_deref())
        }
        Some(Commands::Agents) => {
            let config = commands::load(&workspace, cli.config.as_deref())?;
            let agents = commands::load_agents(&workspace, &config)?;
            print!("{}", render::agent_list(&agents));
            Ok(())
        }
        Some(Commands::Serve { addr }) => {
            let config = commands::load(&workspace, cli.config.as_deref())?;
            let agents = commands::load_agents(&workspace, &config)?;
            commands::serve(config, agents, cli.tier, addr).await
        }
        None => {
            let Some(task) = cli.task else {
                anyhow::bail!("no task given; run `quarry \"<task>\"` or `quarry --help`");
            };
            let config = commands::load(&workspace, cli.config.as_deref())?;
            let agents = commands::load_agents(&workspace, &config)?;
            let run = commands::RunArgs {
                tier: cli.tier,
                overrides,
                persona: agents.persona_for(cli.agent.as_deref(), cli.agent.as_deref())?,
                json: cli.json,
                trace_dir: cli.trace_dir,
            };
            commands::run_task(&task, config, run).await
        }
    }
}
