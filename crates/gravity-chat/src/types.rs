//! Shared types for intents, turns and retrieval results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gravity_action::{ActionType, PendingAction};
use gravity_connector::EntityRef;
use gravity_core::Timestamp;

// =============================================================================
// Intent
// =============================================================================

/// The four intent kinds a message can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Retrieval,
    Aggregation,
    Action,
    Clarification,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Retrieval => write!(f, "retrieval"),
            IntentKind::Aggregation => write!(f, "aggregation"),
            IntentKind::Action => write!(f, "action"),
            IntentKind::Clarification => write!(f, "clarification"),
        }
    }
}

impl FromStr for IntentKind {
    type Err = String;

    /// Also accepts `direct_answer` and `triage`, which both mean a lookup.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retrieval" | "direct_answer" | "triage" => Ok(IntentKind::Retrieval),
            "aggregation" => Ok(IntentKind::Aggregation),
            "action" => Ok(IntentKind::Action),
            "clarification" | "unknown" => Ok(IntentKind::Clarification),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Time window and source hints for an aggregation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationScope {
    /// Only consider items updated at or after this instant.
    pub since: Option<Timestamp>,
    /// Source systems named in the request (`tracker`, `chat`, `scm`).
    /// Empty means every connector.
    pub sources: Vec<String>,
}

/// A classified request with its variant-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Retrieval {
        query: String,
    },
    Aggregation {
        query: String,
        scope: AggregationScope,
    },
    Action {
        action_type: ActionType,
        parameters: Value,
    },
    Clarification {
        question: String,
    },
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Retrieval { .. } => IntentKind::Retrieval,
            Intent::Aggregation { .. } => IntentKind::Aggregation,
            Intent::Action { .. } => IntentKind::Action,
            Intent::Clarification { .. } => IntentKind::Clarification,
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// Entities referenced by the message, or inherited from context.
    pub entities: Vec<EntityRef>,
}

// =============================================================================
// Turns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's append-only conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub intent: Option<IntentKind>,
    pub confidence: Option<f32>,
    /// Citations backing an assistant turn, as `source_system:uri`.
    #[serde(default)]
    pub sources: Vec<String>,
    pub pending_action_ref: Option<String>,
    pub timestamp: Timestamp,
}

// =============================================================================
// Retrieval
// =============================================================================

/// Where a piece of evidence came from, e.g. `tracker:PROJ-123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub source_system: String,
    pub uri: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_system, self.uri)
    }
}

/// Which path produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ResultSource {
    Vector,
    Connector(String),
}

impl ResultSource {
    /// Live data outranks indexed data on equal scores.
    pub fn priority(&self) -> u8 {
        match self {
            ResultSource::Connector(_) => 0,
            ResultSource::Vector => 1,
        }
    }
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Vector => write!(f, "vector"),
            ResultSource::Connector(name) => write!(f, "connector:{}", name),
        }
    }
}

impl From<ResultSource> for String {
    fn from(source: ResultSource) -> Self {
        source.to_string()
    }
}

impl TryFrom<String> for ResultSource {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "vector" {
            return Ok(ResultSource::Vector);
        }
        s.strip_prefix("connector:")
            .filter(|name| !name.is_empty())
            .map(|name| ResultSource::Connector(name.to_string()))
            .ok_or_else(|| format!("Unknown result source: {}", s))
    }
}

/// One ranked piece of evidence. Produced per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub source: ResultSource,
    pub score: f64,
    pub title: String,
    pub content: String,
    pub citation: Citation,
    pub updated_at: Timestamp,
}

/// A source that produced nothing for this query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Aggregator output: grounded text plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response_text: String,
    pub sources: Vec<Citation>,
    pub confidence: f32,
    pub results: Vec<RetrievalResult>,
    pub unavailable: Vec<SourceFailure>,
}

// =============================================================================
// External responses
// =============================================================================

/// The slice of a pending action shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingActionView {
    pub action_id: String,
    pub action_type: ActionType,
    pub description: String,
    pub parameters: Value,
}

impl From<&PendingAction> for PendingActionView {
    fn from(action: &PendingAction) -> Self {
        Self {
            action_id: action.action_id.clone(),
            action_type: action.action_type,
            description: action.description.clone(),
            parameters: action.parameters.clone(),
        }
    }
}

/// Response to a submitted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub response: String,
    pub intent: IntentKind,
    pub confidence: f32,
    #[serde(default)]
    pub sources: Vec<String>,
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingActionView>,
}

/// Response to a successful confirmation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    /// Actions still awaiting confirmation.
    pub pending_actions: usize,
    pub created_at: Timestamp,
    pub last_activity: Option<Timestamp>,
}
