//! The connector capability trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ConnectorError;
use crate::types::{ActionOutcome, ConnectorDomain, EntityRef, Record, SearchScope};

/// A live data source with a uniform query/action surface.
///
/// Connectors are stateless from the orchestrator's point of view. Retries
/// and rate-limit backoff happen inside the connector (or the registry's
/// read wrapper); callers only ever observe latency or a terminal
/// [`ConnectorError::Unavailable`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique connector name, e.g. `tracker`.
    fn name(&self) -> &str;

    /// Source system and entity kinds this connector serves.
    fn domain(&self) -> ConnectorDomain;

    /// Action types this connector can execute, e.g. `create_ticket`.
    fn supported_actions(&self) -> &[&'static str] {
        &[]
    }

    /// Cheap reachability check. Never retried.
    async fn ping(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Current state of one entity.
    async fn fetch_status(&self, entity: &EntityRef) -> Result<Record, ConnectorError>;

    /// Most relevant recent records for a free-text query, best first.
    async fn search_recent(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<Record>, ConnectorError>;

    /// Perform a side-effecting action. Never retried by callers.
    async fn execute(&self, action_type: &str, params: &Value)
        -> Result<ActionOutcome, ConnectorError>;
}
