//! Subcommand handlers for the Quarry CLI.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_core::config::LimitOverrides;
use quarry_core::server::{self, AppState};
use quarry_core::{AgentStore, QuarryConfig, ResearchController, ResearchOptions, Tier};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ConfigAction;
use crate::{render, trace};

/// Per-invocation settings for a single research run.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub tier: Option<Tier>,
    pub overrides: LimitOverrides,
    /// Persona prompt resolved from `--agent`.
    pub persona: Option<String>,
    pub json: bool,
    pub trace_dir: Option<PathBuf>,
}

/// Load configuration and report non-fatal warnings.
pub fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<QuarryConfig> {
    let config = quarry_core::load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    for warning in config.validate() {
        warn!("{}", warning);
    }
    Ok(config)
}

/// Persona profiles from agents.json files and the `[[agents]]` config tables.
pub fn load_agents(workspace: &Path, config: &QuarryConfig) -> anyhow::Result<AgentStore> {
    AgentStore::discover(Some(workspace), &config.agents)
        .map_err(|e| anyhow::anyhow!("Failed to load agents: {}", e))
}

pub fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".quarry");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&QuarryConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = quarry_core::load_config(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; cancelling");
            token.cancel();
        }
    });
}

pub async fn run_task(task: &str, config: QuarryConfig, args: RunArgs) -> anyhow::Result<()> {
    let controller = ResearchController::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let options = ResearchOptions::for_tier(args.tier.unwrap_or(config.research.tier))
        .with_overrides(args.overrides)
        .with_persona(args.persona);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let outcome = controller.run_traced(task, options, cancel).await;

    let trace_dir = args
        .trace_dir
        .or_else(|| config.trace.enabled.then(|| config.trace.resolved_dir()));
    if let (Some(dir), Some(run_trace)) = (trace_dir, outcome.trace.as_ref()) {
        match trace::write_trace(&dir, run_trace) {
            Ok(path) => info!(path = %path.display(), "Wrote run trace"),
            Err(e) => warn!(error = %e, "Failed to write run trace"),
        }
    }

    match outcome.result {
        Ok(result) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render::final_result(&result));
            }
            Ok(())
        }
        Err(failure) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            Err(anyhow::anyhow!(failure))
        }
    }
}

pub async fn serve(
    config: QuarryConfig,
    agents: AgentStore,
    tier: Option<Tier>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let controller = ResearchController::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let state = Arc::new(
        AppState::new(controller, tier.unwrap_or(config.research.tier), shutdown).with_agents(agents),
    );
    server::serve(state, addr).await?;
    Ok(())
}
