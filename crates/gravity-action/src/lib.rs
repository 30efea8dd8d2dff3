//! Gravity Action crate - human-confirmed, at-most-once action execution.
//!
//! An action intent becomes a [`PendingAction`] proposal. Only an explicit
//! confirmation moves it forward, and a guarded compare-and-set on the
//! [`ActionLedger`] guarantees at most one `execute` per action id.

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod state_machine;
pub mod types;

pub use catalog::ActionCatalog;
pub use error::ActionError;
pub use ledger::{ActionLedger, ConfirmDecision};
pub use orchestrator::{ActionOrchestrator, ActionReceipt};
pub use state_machine::validate_transition;
pub use types::{ActionStatus, ActionType, PendingAction, Transition};
