//! Error types for the conversational front door.

use gravity_action::ActionError;
use gravity_vector::VectorError;

/// Errors from classification, retrieval and session handling.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    /// Every source failed or timed out. Holds one `name: reason` per source.
    #[error("no sources available ({})", .0.join("; "))]
    NoSourcesAvailable(Vec<String>),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("classifier error: {0}")]
    Classifier(String),
    #[error("synthesis error: {0}")]
    Synthesis(String),
    #[error("session lock poisoned: {0}")]
    SessionLock(String),
}
