//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use gravity_chat::SessionManager;
use gravity_connector::ConnectorRegistry;
use gravity_core::GravityConfig;
use gravity_vector::VectorStore;

/// Shared application state, passed to handlers via axum's `State`.
///
/// Every field is behind an `Arc`, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GravityConfig>,
    /// Sessions, classification, retrieval and actions.
    pub sessions: Arc<SessionManager>,
    /// Queried directly by the health and readiness probes.
    pub store: Arc<dyn VectorStore>,
    pub registry: Arc<ConnectorRegistry>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: GravityConfig,
        sessions: SessionManager,
        store: Arc<dyn VectorStore>,
        registry: Arc<ConnectorRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            store,
            registry,
            start_time: Instant::now(),
        }
    }
}
