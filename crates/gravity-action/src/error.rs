//! Error types for the action orchestrator.

use crate::types::{ActionStatus, ActionType};

/// Errors from proposing, confirming, or executing actions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    /// Parameters failed the action's schema. The turn becomes a clarification.
    #[error("Invalid action parameters: {0}")]
    Validation(String),
    /// The action is unknown or no longer awaiting confirmation.
    #[error("Action {0} is not awaiting confirmation")]
    Stale(String),
    /// Confirmation arrived after the proposal's TTL.
    #[error("Action {0} has expired")]
    Expired(String),
    /// The connector rejected the mutation; `detail` is its message verbatim.
    #[error("Action {action_id} failed: {detail}")]
    Execution { action_id: String, detail: String },
    #[error("No connector can execute {0}")]
    NoConnector(ActionType),
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(ActionStatus, ActionStatus),
    #[error("Ledger error: {0}")]
    Ledger(String),
}
