//! Integration tests for the Gravity API.
//!
//! Each test builds its own in-memory state: a memory vector store, demo
//! connectors, a manual clock and sequential action ids.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use gravity_api::create_router;
use gravity_api::handlers::HealthResponse;
use gravity_api::state::AppState;
use gravity_chat::SessionManager;
use gravity_connector::{ChatConnector, ConnectorRegistry, SourceControlConnector, TrackerConnector};
use gravity_core::{GravityConfig, ManualClock, SequentialIds, Timestamp};
use gravity_vector::{
    DistanceMetric, EmbeddingService, MemoryVectorStore, MockEmbedding, VectorError, VectorStore,
};

// =============================================================================
// Helpers
// =============================================================================

const NOW: Timestamp = Timestamp(1_700_000_000);

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    tracker: Arc<TrackerConnector>,
}

/// Embedder whose backend is down.
struct BrokenEmbedding;

#[async_trait]
impl EmbeddingService for BrokenEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, VectorError> {
        Err(VectorError::Embedding("model server unreachable".into()))
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn model_id(&self) -> &str {
        "broken"
    }
}

async fn build(embedder: Arc<dyn EmbeddingService>, create_collection: bool) -> TestApp {
    let config = GravityConfig::default();
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(MemoryVectorStore::new());
    if create_collection {
        store
            .create_collection(&config.vector.collection, 384, DistanceMetric::Cosine)
            .await
            .unwrap();
    }

    let tracker = Arc::new(TrackerConnector::with_demo_data(clock.clone()));
    let mut registry = ConnectorRegistry::with_retry_delay(Duration::from_millis(1));
    registry.register(tracker.clone());
    registry.register(Arc::new(ChatConnector::with_demo_data(clock.clone())));
    registry.register(Arc::new(SourceControlConnector::with_demo_data(clock.clone())));
    let registry = Arc::new(registry);

    let store: Arc<dyn VectorStore> = store;
    let sessions = SessionManager::from_config(
        &config,
        Arc::clone(&store),
        embedder,
        Arc::clone(&registry),
        clock.clone(),
        Arc::new(SequentialIds::new()),
    );
    let state = AppState::new(config, sessions, store, registry);
    TestApp {
        router: create_router(state),
        clock,
        tracker,
    }
}

async fn make_app() -> TestApp {
    build(Arc::new(MockEmbedding::new()), true).await
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.router.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn say(app: &TestApp, session: &str, message: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json(&format!("/sessions/{}/messages", session), json!({ "message": message })),
    )
    .await
}

async fn confirm(app: &TestApp, session: &str, action_id: &str, approved: bool) -> (StatusCode, Value) {
    send(
        app,
        post_json(
            &format!("/sessions/{}/actions/confirm", session),
            json!({ "action_id": action_id, "approved": approved }),
        ),
    )
    .await
}

// =============================================================================
// Probes
// =============================================================================

#[tokio::test]
async fn test_health_reports_collection_and_connectors() {
    let app = make_app().await;
    let resp = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.collection, "knowledge");
    assert_eq!(health.indexed_points, Some(0));
    let names: Vec<&str> = health.connectors.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["tracker", "chat", "scm"]);
    assert!(health.connectors.iter().all(|c| c.connected));
}

#[tokio::test]
async fn test_health_flags_unreachable_connector() {
    let app = make_app().await;
    app.tracker.faults().set_offline(true);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["connectors"][0]["name"], "tracker");
    assert_eq!(body["connectors"][0]["connected"], false);
    assert_eq!(body["connectors"][0]["error"], "tracker unavailable: service offline");
    assert_eq!(body["connectors"][1]["connected"], true);
    assert!(body["connectors"][1].get("error").is_none());
}

#[tokio::test]
async fn test_ready_and_live() {
    let app = make_app().await;
    assert_eq!(send(&app, get("/ready")).await.0, StatusCode::OK);
    let (status, body) = send(&app, get("/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let cold = build(Arc::new(MockEmbedding::new()), false).await;
    let (status, body) = send(&cold, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "service_unavailable");
    let (_, body) = send(&cold, get("/health")).await;
    assert_eq!(body["status"], "degraded");
    assert!(body["indexed_points"].is_null());
}

// =============================================================================
// Messages
// =============================================================================

#[tokio::test]
async fn test_ticket_status_message() {
    let app = make_app().await;
    let (status, body) = say(&app, "s1", "What's the status of PROJ-123?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "retrieval");
    assert_eq!(body["sources"], json!(["tracker:PROJ-123"]));
    assert_eq!(body["requires_confirmation"], false);
    assert!(body.get("pending_action").is_none());
    assert!(body["response"].as_str().unwrap().contains("[tracker:PROJ-123]"));
}

#[tokio::test]
async fn test_aggregation_message() {
    let app = make_app().await;
    let (status, body) = say(&app, "s1", "Summarize tracker activity today").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "aggregation");
    let sources = body["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s.as_str().unwrap().starts_with("tracker:")));
}

#[tokio::test]
async fn test_unclear_message_asks_for_clarification() {
    let app = make_app().await;
    let (status, body) = say(&app, "s1", "hmm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "clarification");
    assert_eq!(body["requires_confirmation"], false);
}

#[tokio::test]
async fn test_bad_message_bodies() {
    let app = make_app().await;
    let (status, body) = say(&app, "s1", "  ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let request = Request::post("/sessions/s1/messages")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = say(&app, "bad%20id", "hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_every_source_down_is_503() {
    let app = build(Arc::new(BrokenEmbedding), true).await;
    app.tracker.faults().set_offline(true);

    let (status, body) = say(&app, "s1", "What's the status of PROJ-123?").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("vector"));
    assert!(message.contains("tracker"));
}

#[tokio::test]
async fn test_missing_collection_is_500() {
    let app = build(Arc::new(MockEmbedding::new()), false).await;
    let (status, body) = say(&app, "s1", "What's the status of PROJ-123?").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "collection not found: knowledge");
}

// =============================================================================
// Actions
// =============================================================================

#[tokio::test]
async fn test_create_ticket_then_confirm() {
    let app = make_app().await;
    let (status, body) = say(&app, "s1", "Create a ticket for the API timeout issue").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "action");
    assert_eq!(body["requires_confirmation"], true);
    assert_eq!(body["pending_action"]["action_type"], "create_ticket");
    let action_id = body["pending_action"]["action_id"].as_str().unwrap().to_string();

    let (status, body) = confirm(&app, "s1", &action_id, true).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("PROJ-124"));

    let (status, action) = send(&app, get(&format!("/sessions/s1/actions/{}", action_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(action["status"], "succeeded");
    assert_eq!(action["history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_action_is_conflict() {
    let app = make_app().await;
    let (status, body) = confirm(&app, "s1", "act_42", true).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_repeat_confirmation_is_conflict() {
    let app = make_app().await;
    say(&app, "s1", "Close PROJ-5").await;
    assert_eq!(confirm(&app, "s1", "act_1", true).await.0, StatusCode::OK);
    assert_eq!(confirm(&app, "s1", "act_1", true).await.0, StatusCode::CONFLICT);
    assert_eq!(app.tracker.ticket("PROJ-5").unwrap().status, "Done");
}

#[tokio::test]
async fn test_expired_confirmation_is_gone() {
    let app = make_app().await;
    say(&app, "s1", "Close PROJ-5").await;
    app.clock.advance_secs(3_600);

    let (status, body) = confirm(&app, "s1", "act_1", true).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["message"], "Action act_1 has expired");
    assert_eq!(app.tracker.ticket("PROJ-5").unwrap().status, "Open");
}

#[tokio::test]
async fn test_swept_proposal_is_still_gone() {
    let app = make_app().await;
    say(&app, "s1", "Close PROJ-5").await;
    app.clock.advance_secs(3_600);
    say(&app, "s1", "What's the status of PROJ-5?").await;

    let (status, body) = confirm(&app, "s1", "act_1", true).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["message"], "Action act_1 has expired");
    assert_eq!(app.tracker.ticket("PROJ-5").unwrap().status, "Open");
}

#[tokio::test]
async fn test_rejected_mutation_is_reported_verbatim() {
    let app = make_app().await;
    say(&app, "s1", "Close PROJ-1").await;
    let (status, body) = confirm(&app, "s1", "act_1", true).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Action act_1 failed: PROJ-1 is already closed");
}

#[tokio::test]
async fn test_declined_action() {
    let app = make_app().await;
    say(&app, "s1", "Assign PROJ-5 to erin").await;
    let (status, body) = confirm(&app, "s1", "act_1", false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Cancelled: Assign ticket PROJ-5 to erin");
    assert_eq!(app.tracker.ticket("PROJ-5").unwrap().assignee, None);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_turn_history_and_session_list() {
    let app = make_app().await;
    let (status, _) = send(&app, get("/sessions/s1/turns")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    say(&app, "s1", "What's the status of PROJ-123?").await;
    say(&app, "s1", "Close it").await;
    say(&app, "s2", "hmm").await;

    let (status, body) = send(&app, get("/sessions/s1/turns")).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["role"], "assistant");
    assert_eq!(turns[1]["sources"], json!(["tracker:PROJ-123"]));
    assert_eq!(turns[3]["pending_action_ref"], "act_1");

    let (status, body) = send(&app, get("/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["session_id"], "s1");
    assert_eq!(sessions[0]["pending_actions"], 1);
    assert_eq!(sessions[1]["turn_count"], 2);
}
