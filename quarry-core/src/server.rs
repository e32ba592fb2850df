//! HTTP API built on axum.
//!
//! - `POST /run` runs one research task and returns the final result
//! - `POST /search` runs a single search through the provider chain
//! - `GET /agents` lists the persona profiles a run may name
//! - `GET /health` reports liveness

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agents::{AgentProfile, AgentStore};
use crate::config::{LimitOverrides, ResearchOptions, Tier};
use crate::controller::ResearchController;
use crate::types::{FailureKind, PhaseOutcome, ResearchFailure, SearchHit};

/// Status used when a run is cancelled (client closed request).
const STATUS_CANCELLED: u16 = 499;

/// Shared state for axum handlers.
pub struct AppState {
    controller: ResearchController,
    default_tier: Tier,
    agents: AgentStore,
    shutdown: CancellationToken,
    started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(controller: ResearchController, default_tier: Tier, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            default_tier,
            agents: AgentStore::default(),
            shutdown,
            started_at: Utc::now(),
        }
    }

    pub fn with_agents(mut self, agents: AgentStore) -> Self {
        self.agents = agents;
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub task: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub options: Option<LimitOverrides>,
    /// Persona selected by display name.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Persona selected by id.
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchReply {
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
pub struct AgentsReply {
    pub agents: Vec<AgentProfile>,
}

/// Build an axum Router with the research API.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/run", post(run_handler))
        .route("/search", post(search_handler))
        .route("/agents", get(agents_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run_handler(State(state): State<SharedState>, Json(req): Json<RunRequest>) -> Response {
    let persona = match state
        .agents
        .persona_for(req.agent_name.as_deref(), req.agent_id.as_deref())
    {
        Ok(persona) => persona,
        Err(e) => {
            let failure = ResearchFailure::configuration(e.to_string());
            return (StatusCode::BAD_REQUEST, Json(failure)).into_response();
        }
    };
    let options = ResearchOptions::for_tier(req.tier.unwrap_or(state.default_tier))
        .with_overrides(req.options.unwrap_or_default())
        .with_persona(persona);
    let cancel = state.shutdown.child_token();

    match state.controller.run(&req.task, options, cancel).await {
        Ok(result) => Json(result).into_response(),
        Err(failure) => {
            let status = match failure.kind {
                FailureKind::ConfigurationError => StatusCode::BAD_REQUEST,
                FailureKind::Cancelled => {
                    StatusCode::from_u16(STATUS_CANCELLED).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
                }
            };
            (status, Json(failure)).into_response()
        }
    }
}

async fn search_handler(State(state): State<SharedState>, Json(req): Json<SearchRequest>) -> Response {
    let query = req.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "query must not be empty"})),
        )
            .into_response();
    }
    let limit = req
        .limit
        .unwrap_or_else(|| ResearchOptions::for_tier(state.default_tier).limits().max_sources)
        .max(1);

    match state.controller.search_once(query, limit).await {
        PhaseOutcome::Success(hits) => Json(SearchReply { hits }).into_response(),
        other => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "error": other.failure_reason().unwrap_or("search failed"),
            })),
        )
            .into_response(),
    }
}

async fn agents_handler(State(state): State<SharedState>) -> Json<AgentsReply> {
    Json(AgentsReply {
        agents: state.agents.list().to_vec(),
    })
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
    }))
}

/// Serve the API on `addr` until the state's shutdown token is cancelled.
pub async fn serve(state: SharedState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let shutdown = state.shutdown.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Research API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
