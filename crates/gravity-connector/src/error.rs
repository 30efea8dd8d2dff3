//! Error taxonomy shared by every connector.

/// Errors a connector may report to the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectorError {
    /// Timeout or outage. Reads are retried once before this surfaces.
    #[error("{connector} unavailable: {reason}")]
    Unavailable { connector: String, reason: String },
    /// The external system rejected a mutation. Shown to the user verbatim.
    #[error("{0}")]
    Action(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ConnectorError {
    pub fn unavailable(connector: &str, reason: impl Into<String>) -> Self {
        ConnectorError::Unavailable {
            connector: connector.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ConnectorError::Unavailable { .. })
    }
}
