//! In-memory connectors seeded with demo data.
//!
//! They stand in for the tracker, chat and source-control vendor clients
//! in demos and tests. Each carries a [`Faults`] switchboard for simulating
//! outages and slow responses.

pub mod chat;
pub mod scm;
pub mod tracker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub use chat::ChatConnector;
pub use scm::SourceControlConnector;
pub use tracker::TrackerConnector;

use crate::error::ConnectorError;

/// Injectable outage and latency for an in-memory connector.
#[derive(Debug, Default)]
pub struct Faults {
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl Faults {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Apply configured latency, then fail if offline.
    pub(crate) async fn gate(&self, connector: &str) -> Result<(), ConnectorError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConnectorError::unavailable(connector, "service offline"));
        }
        Ok(())
    }
}

/// Required string parameter, trimmed.
pub(crate) fn required_str<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ConnectorError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConnectorError::Action(format!("missing parameter: {}", key)))
}
