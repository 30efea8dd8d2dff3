//! Connector registry: registration, domain routing, and read retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use serde_json::Value;
use tracing::{debug, warn};

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::types::{
    ActionOutcome, ConnectorDomain, ConnectorStatus, EntityRef, Record, SearchScope,
};

/// Pause before the single read retry.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Registry of live connectors.
///
/// Every registered connector is wrapped so that `fetch_status` and
/// `search_recent` are retried once on [`ConnectorError::Unavailable`].
/// `execute` passes straight through.
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
    retry_delay: Duration,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            connectors: Vec::new(),
            retry_delay,
        }
    }

    /// Register a connector. A connector with the same name is replaced.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let name = connector.name().to_string();
        if let Some(pos) = self.connectors.iter().position(|c| c.name() == name) {
            warn!(connector = %name, "Replacing previously registered connector");
            self.connectors.remove(pos);
        }
        debug!(connector = %name, "Connector registered");
        self.connectors.push(Arc::new(RetryingReads {
            inner: connector,
            delay: self.retry_delay,
        }));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.name() == name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn Connector>> {
        self.connectors.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.connectors.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Connectors whose domain serves any of `entities`. No entities means
    /// every connector.
    pub fn route(&self, entities: &[EntityRef]) -> Vec<Arc<dyn Connector>> {
        if entities.is_empty() {
            return self.all();
        }
        self.connectors
            .iter()
            .filter(|c| {
                let domain = c.domain();
                entities.iter().any(|e| domain.serves(e.kind()))
            })
            .cloned()
            .collect()
    }

    /// Connectors whose source system is in `sources`. Empty means all.
    pub fn by_source(&self, sources: &[String]) -> Vec<Arc<dyn Connector>> {
        if sources.is_empty() {
            return self.all();
        }
        self.connectors
            .iter()
            .filter(|c| sources.contains(&c.domain().source_system))
            .cloned()
            .collect()
    }

    /// Ping every connector concurrently, each bounded by `timeout`.
    /// Results follow registration order.
    pub async fn probe(&self, timeout: Duration) -> Vec<ConnectorStatus> {
        let mut pings = JoinSet::new();
        for (index, connector) in self.connectors.iter().enumerate() {
            let connector = Arc::clone(connector);
            pings.spawn(async move {
                let error = match tokio::time::timeout(timeout, connector.ping()).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(_) => Some(format!("timed out after {}ms", timeout.as_millis())),
                };
                (index, connector.name().to_string(), connector.domain().source_system, error)
            });
        }

        let mut statuses = Vec::with_capacity(self.connectors.len());
        while let Some(joined) = pings.join_next().await {
            match joined {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(error = %e, "Connector ping task failed"),
            }
        }
        statuses.sort_by_key(|(index, ..)| *index);
        statuses
            .into_iter()
            .map(|(_, name, source_system, error)| {
                if let Some(ref reason) = error {
                    debug!(connector = %name, reason = %reason, "Connector unreachable");
                }
                ConnectorStatus {
                    name,
                    source_system,
                    connected: error.is_none(),
                    error,
                }
            })
            .collect()
    }

    /// The connector that executes `action_type`.
    pub fn owner_of(&self, action_type: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .iter()
            .find(|c| c.supported_actions().contains(&action_type))
            .cloned()
    }
}

/// Decorator adding one silent retry to reads.
struct RetryingReads {
    inner: Arc<dyn Connector>,
    delay: Duration,
}

#[async_trait]
impl Connector for RetryingReads {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn domain(&self) -> ConnectorDomain {
        self.inner.domain()
    }

    fn supported_actions(&self) -> &[&'static str] {
        self.inner.supported_actions()
    }

    async fn ping(&self) -> Result<(), ConnectorError> {
        self.inner.ping().await
    }

    async fn fetch_status(&self, entity: &EntityRef) -> Result<Record, ConnectorError> {
        match self.inner.fetch_status(entity).await {
            Err(e) if e.is_unavailable() => {
                debug!(connector = self.inner.name(), error = %e, "Retrying fetch_status once");
                tokio::time::sleep(self.delay).await;
                self.inner.fetch_status(entity).await
            }
            other => other,
        }
    }

    async fn search_recent(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<Record>, ConnectorError> {
        match self.inner.search_recent(query, scope, limit).await {
            Err(e) if e.is_unavailable() => {
                debug!(connector = self.inner.name(), error = %e, "Retrying search_recent once");
                tokio::time::sleep(self.delay).await;
                self.inner.search_recent(query, scope, limit).await
            }
            other => other,
        }
    }

    async fn execute(
        &self,
        action_type: &str,
        params: &Value,
    ) -> Result<ActionOutcome, ConnectorError> {
        self.inner.execute(action_type, params).await
    }
}
