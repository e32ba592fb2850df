//! Integration tests for the research HTTP API.

use axum::body::Body;
use quarry_core::agents::{AgentProfile, AgentStore};
use quarry_core::brain::MockLlmProvider;
use quarry_core::config::Tier;
use quarry_core::controller::ResearchController;
use quarry_core::error::SearchError;
use quarry_core::resilience::{Jitter, RecordingDelay, RetryPolicy};
use quarry_core::search::{MockSearchProvider, SearchProvider};
use quarry_core::server::{AppState, SharedState, router};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn make_state(llm: Arc<MockLlmProvider>, search: MockSearchProvider) -> SharedState {
    make_state_with_shutdown(llm, search, CancellationToken::new())
}

fn make_state_with_shutdown(
    llm: Arc<MockLlmProvider>,
    search: MockSearchProvider,
    shutdown: CancellationToken,
) -> SharedState {
    Arc::new(app_state(llm, search, shutdown))
}

fn make_state_with_agents(llm: Arc<MockLlmProvider>, search: MockSearchProvider) -> SharedState {
    Arc::new(app_state(llm, search, CancellationToken::new()).with_agents(agents()))
}

fn app_state(llm: Arc<MockLlmProvider>, search: MockSearchProvider, shutdown: CancellationToken) -> AppState {
    let search: Arc<dyn SearchProvider> = Arc::new(search);
    let controller = ResearchController::new(llm, vec![search])
        .with_delay(Arc::new(RecordingDelay::new()))
        .with_retry_policy(RetryPolicy::default().with_jitter(Jitter::None));
    AppState::new(controller, Tier::Simple, shutdown)
}

fn agents() -> AgentStore {
    AgentStore::new(vec![AgentProfile {
        id: "infra".into(),
        name: "Infrastructure Analyst".into(),
        description: "Cloud and datacenter markets".into(),
        prompt: "You analyze infrastructure markets.".into(),
    }])
}

fn make_request(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn make_post_request(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(
    state: SharedState,
    request: axum::http::Request<Body>,
) -> (axum::http::StatusCode, serde_json::Value) {
    let app = router(state);
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, request)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

// --- /health ---

#[tokio::test]
async fn test_health_reports_version() {
    let state = make_state(Arc::new(MockLlmProvider::new()), MockSearchProvider::new("mock"));
    let (status, json) = send(state, make_request("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime_secs"].is_u64());
}

// --- /run ---

#[tokio::test]
async fn test_run_returns_final_result() {
    let llm = Arc::new(MockLlmProvider::new());
    llm.queue_json(json!({"queries": [{"query": "rust async runtimes", "intent": "overview"}]}))
        .queue_json(json!({"sufficient": true, "confidence": 0.9, "gaps": []}))
        .queue_json(json!({"answer": "Tokio is the most used runtime [1].", "citations": [{"id": "[1]"}]}));
    let state = make_state(llm, MockSearchProvider::new("mock"));

    let (status, json) = send(
        state,
        make_post_request("/run", json!({"task": "Which async runtime is most used in Rust?"})),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["answer"], "Tokio is the most used runtime [1].");
    assert_eq!(json["iterations"], 1);
    assert_eq!(json["stop_reason"], "sufficient");
    assert_eq!(json["degraded"], false);
    assert_eq!(json["citations"][0]["id"], 1);
    assert_eq!(json["citations"][0]["title"], "rust async runtimes result 1");
    assert_eq!(json["citations"][0]["type"], "web");
}

#[tokio::test]
async fn test_run_applies_limit_overrides() {
    let llm = Arc::new(MockLlmProvider::new());
    llm.queue_json(json!({"queries": [{"query": "a", "intent": "i"}]}))
        .queue_json(json!({"sufficient": false, "confidence": 0.2, "new_queries": [{"query": "b", "intent": "i"}]}))
        .queue_json(json!({"sufficient": true, "confidence": 0.7}))
        .queue_json(json!({"answer": "Answer [4].", "citations": [{"id": 4}]}));
    let search = MockSearchProvider::new("mock");
    let state = make_state(llm, search);

    let (status, json) = send(
        state,
        make_post_request("/run", json!({"task": "t", "tier": "simple", "options": {"max_iterations": 2}})),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["iterations"], 2);
    assert_eq!(json["citations"][0]["title"], "b result 1");
}

#[tokio::test]
async fn test_run_with_agent_id_applies_persona() {
    let llm = Arc::new(MockLlmProvider::new());
    llm.queue_json(json!({"queries": [{"query": "iaas share", "intent": "numbers"}]}))
        .queue_json(json!({"sufficient": true, "confidence": 0.8}))
        .queue_json(json!({"answer": "AWS leads [1].", "citations": [{"id": 1}]}));
    let state = make_state_with_agents(llm.clone(), MockSearchProvider::new("mock"));

    let (status, json) = send(
        state,
        make_post_request("/run", json!({"task": "cloud market share", "agent_id": "infra"})),
    )
    .await;

    assert_eq!(status, 200, "{json}");
    assert!(
        llm.requests()[0]
            .prompt
            .contains("You analyze infrastructure markets.\n\ncloud market share")
    );
}

#[tokio::test]
async fn test_run_with_unknown_agent_is_rejected() {
    let llm = Arc::new(MockLlmProvider::new());
    let state = make_state(llm.clone(), MockSearchProvider::new("mock"));
    let (status, json) = send(
        state,
        make_post_request("/run", json!({"task": "t", "agent_name": "Nobody"})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(json["type"], "configuration_error");
    assert!(json["message"].as_str().unwrap().contains("unknown agent 'Nobody'"));
    assert_eq!(llm.call_count(), 0);
}

// --- /agents ---

#[tokio::test]
async fn test_agents_lists_profiles() {
    let state = make_state_with_agents(Arc::new(MockLlmProvider::new()), MockSearchProvider::new("mock"));
    let (status, json) = send(state, make_request("/agents")).await;
    assert_eq!(status, 200);
    assert_eq!(json["agents"][0]["id"], "infra");
    assert_eq!(json["agents"][0]["name"], "Infrastructure Analyst");
}

#[tokio::test]
async fn test_run_rejects_empty_task() {
    let llm = Arc::new(MockLlmProvider::new());
    let state = make_state(llm.clone(), MockSearchProvider::new("mock"));
    let (status, json) = send(state, make_post_request("/run", json!({"task": "  "}))).await;
    assert_eq!(status, 400);
    assert_eq!(json["type"], "configuration_error");
    assert_eq!(json["retryable"], false);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_run_during_shutdown_is_cancelled() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let state = make_state_with_shutdown(
        Arc::new(MockLlmProvider::new()),
        MockSearchProvider::new("mock"),
        shutdown,
    );
    let (status, json) = send(state, make_post_request("/run", json!({"task": "t"}))).await;
    assert_eq!(status.as_u16(), 499);
    assert_eq!(json["type"], "cancelled");
    assert_eq!(json["retryable"], true);
}

// --- /search ---

#[tokio::test]
async fn test_search_returns_hits() {
    let state = make_state(
        Arc::new(MockLlmProvider::new()),
        MockSearchProvider::new("mock").with_default_hits(8),
    );
    let (status, json) = send(
        state,
        make_post_request("/search", json!({"query": "vector databases", "limit": 4})),
    )
    .await;
    assert_eq!(status, 200);
    let hits = json["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0]["title"], "vector databases result 1");
}

#[tokio::test]
async fn test_search_rejects_empty_query() {
    let state = make_state(Arc::new(MockLlmProvider::new()), MockSearchProvider::new("mock"));
    let (status, json) = send(state, make_post_request("/search", json!({"query": ""}))).await;
    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_search_failure_is_bad_gateway() {
    let state = make_state(
        Arc::new(MockLlmProvider::new()),
        MockSearchProvider::new("mock").failing_with(SearchError::Rejected { status: 400 }),
    );
    let (status, json) = send(state, make_post_request("/search", json!({"query": "q"}))).await;
    assert_eq!(status, 502);
    assert!(json["error"].is_string());
}
