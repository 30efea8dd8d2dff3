//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use gravity_core::{GravityConfig, GravityError};

use crate::handlers;
use crate::state::AppState;

/// Request bodies are single chat messages; anything larger is rejected.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Localhost origins on the configured port plus port+1 for a dev server.
    let port = state.config.general.port;
    let origins: Vec<HeaderValue> = [port, port.saturating_add(1)]
        .iter()
        .flat_map(|p| [format!("http://127.0.0.1:{}", p), format!("http://localhost:{}", p)])
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let probes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/live", get(handlers::live));

    let sessions = Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{session_id}/messages", post(handlers::submit_message))
        .route(
            "/sessions/{session_id}/actions/confirm",
            post(handlers::confirm_action),
        )
        .route(
            "/sessions/{session_id}/actions/{action_id}",
            get(handlers::get_action),
        )
        .route("/sessions/{session_id}/turns", get(handlers::session_turns));

    probes
        .merge(sessions)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the router on 127.0.0.1 at the configured port.
pub async fn start_server(config: &GravityConfig, state: AppState) -> Result<(), GravityError> {
    let addr = format!("127.0.0.1:{}", config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GravityError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| GravityError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
