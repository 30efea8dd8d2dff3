//! Action types, lifecycle states, and the pending action record.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gravity_core::Timestamp;

// =============================================================================
// Enums
// =============================================================================

/// The fixed set of side-effecting operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTicket,
    CloseTicket,
    AssignTicket,
    PostMessage,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::CreateTicket,
        ActionType::CloseTicket,
        ActionType::AssignTicket,
        ActionType::PostMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateTicket => "create_ticket",
            ActionType::CloseTicket => "close_ticket",
            ActionType::AssignTicket => "assign_ticket",
            ActionType::PostMessage => "post_message",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown action type: {}", s))
    }
}

/// Pending action lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Proposed,
    Confirmed,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded
                | ActionStatus::Failed
                | ActionStatus::Cancelled
                | ActionStatus::Expired
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Proposed => write!(f, "proposed"),
            ActionStatus::Confirmed => write!(f, "confirmed"),
            ActionStatus::Executing => write!(f, "executing"),
            ActionStatus::Succeeded => write!(f, "succeeded"),
            ActionStatus::Failed => write!(f, "failed"),
            ActionStatus::Cancelled => write!(f, "cancelled"),
            ActionStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(ActionStatus::Proposed),
            "confirmed" => Ok(ActionStatus::Confirmed),
            "executing" => Ok(ActionStatus::Executing),
            "succeeded" => Ok(ActionStatus::Succeeded),
            "failed" => Ok(ActionStatus::Failed),
            "cancelled" => Ok(ActionStatus::Cancelled),
            "expired" => Ok(ActionStatus::Expired),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// One audited state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ActionStatus,
    pub to: ActionStatus,
    pub at: Timestamp,
}

/// A proposed mutation awaiting explicit approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action_id: String,
    pub action_type: ActionType,
    pub parameters: Value,
    pub description: String,
    pub status: ActionStatus,
    /// Connector that will execute the action.
    pub connector: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// Success message or the connector's failure detail, once terminal.
    pub outcome: Option<String>,
    pub history: Vec<Transition>,
}

impl PendingAction {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
