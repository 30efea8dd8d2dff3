//! Value types exchanged with connectors.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gravity_core::Timestamp;

// =============================================================================
// Entities
// =============================================================================

/// Kinds of entity a connector may declare it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ticket,
    Channel,
    Commit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Ticket => write!(f, "ticket"),
            EntityKind::Channel => write!(f, "channel"),
            EntityKind::Commit => write!(f, "commit"),
        }
    }
}

/// A reference to one entity in an external system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// Issue key, e.g. `PROJ-123`.
    Ticket(String),
    /// Channel name without the leading `#`.
    Channel(String),
    /// Full or abbreviated commit SHA.
    Commit(String),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Ticket(_) => EntityKind::Ticket,
            EntityRef::Channel(_) => EntityKind::Channel,
            EntityRef::Commit(_) => EntityKind::Commit,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::Ticket(id) | EntityRef::Channel(id) | EntityRef::Commit(id) => id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Ticket(key) => write!(f, "{}", key),
            EntityRef::Channel(name) => write!(f, "#{}", name),
            EntityRef::Commit(sha) => write!(f, "{}", sha),
        }
    }
}

/// What a connector serves: its source system name and entity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorDomain {
    pub source_system: String,
    pub entity_kinds: Vec<EntityKind>,
}

impl ConnectorDomain {
    pub fn serves(&self, kind: EntityKind) -> bool {
        self.entity_kinds.contains(&kind)
    }
}

// =============================================================================
// Records and scopes
// =============================================================================

/// A structured record returned by a live source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source_system: String,
    /// Stable locator inside the source system, e.g. `PROJ-123`.
    pub uri: String,
    pub title: String,
    pub content: String,
    pub updated_at: Timestamp,
    /// Source-specific fields (status, assignee, author, ...).
    #[serde(default)]
    pub fields: Value,
}

/// Narrowing applied to `search_recent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchScope {
    /// Only records updated at or after this instant.
    pub since: Option<Timestamp>,
    /// Only records about these entities (empty means any).
    #[serde(default)]
    pub entities: Vec<EntityRef>,
}

impl SearchScope {
    pub fn since(ts: Timestamp) -> Self {
        Self {
            since: Some(ts),
            entities: Vec::new(),
        }
    }

    pub fn admits(&self, updated_at: Timestamp) -> bool {
        self.since.map_or(true, |since| updated_at >= since)
    }
}

/// Result of a successful `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Human-readable confirmation naming the affected entity.
    pub message: String,
    pub entity: Option<EntityRef>,
}

// =============================================================================
// Query terms
// =============================================================================

/// Words that carry no topic: question scaffolding, aggregation cues, time
/// phrases and source names.
const STOPWORDS: &[&str] = &[
    "a", "about", "across", "activity", "all", "an", "and", "any", "are", "at", "be", "by",
    "can", "chat", "commits", "day", "days", "did", "do", "does", "for", "from", "git", "going",
    "happened", "has", "have", "how", "i", "in", "is", "it", "jira", "last", "latest", "me",
    "messages", "of", "on", "overview", "past", "please", "recap", "recent", "slack", "status",
    "summarize", "summary", "tell", "that", "the", "this", "ticket", "tickets", "to", "today",
    "tracker", "update", "updates", "was", "week", "what", "what's", "whats", "when", "where",
    "which", "who", "why", "with", "yesterday",
];

/// Lowercased topic words of a query, without stopwords or punctuation.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|w| w.trim_matches(|c: char| c == '-' || c == '\'').to_lowercase())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect();
    terms.dedup();
    terms
}

/// Number of `terms` found in `haystack` (case-insensitive).
pub(crate) fn matched_terms(terms: &[String], haystack: &str) -> usize {
    let haystack = haystack.to_lowercase();
    terms.iter().filter(|t| haystack.contains(t.as_str())).count()
}

/// Reachability of one connector at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStatus {
    pub name: String,
    pub source_system: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_display_and_kind() {
        assert_eq!(EntityRef::Ticket("PROJ-1".into()).to_string(), "PROJ-1");
        assert_eq!(EntityRef::Channel("releases".into()).to_string(), "#releases");
        assert_eq!(EntityRef::Commit("a1b2c3d".into()).kind(), EntityKind::Commit);
        assert_eq!(EntityRef::Channel("ops".into()).id(), "ops");
    }

    #[test]
    fn test_entity_ref_serde() {
        let json = serde_json::to_value(EntityRef::Ticket("PROJ-7".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "ticket", "id": "PROJ-7"}));
    }

    #[test]
    fn test_domain_serves() {
        let domain = ConnectorDomain {
            source_system: "tracker".into(),
            entity_kinds: vec![EntityKind::Ticket],
        };
        assert!(domain.serves(EntityKind::Ticket));
        assert!(!domain.serves(EntityKind::Channel));
    }

    #[test]
    fn test_scope_admits() {
        assert!(SearchScope::default().admits(Timestamp(0)));
        let scope = SearchScope::since(Timestamp(100));
        assert!(scope.admits(Timestamp(100)));
        assert!(!scope.admits(Timestamp(99)));
    }

    #[test]
    fn test_query_terms_drop_scaffolding() {
        assert_eq!(
            query_terms("What's the status of the billing migration?"),
            vec!["billing", "migration"]
        );
        assert!(query_terms("Summarize what happened this week").is_empty());
        assert_eq!(query_terms("deployment-pipeline flaky"), vec!["deployment-pipeline", "flaky"]);
    }

    #[test]
    fn test_matched_terms_case_insensitive() {
        let terms = query_terms("API timeout");
        assert_eq!(matched_terms(&terms, "Checkout API Timeout under load"), 2);
        assert_eq!(matched_terms(&terms, "unrelated"), 0);
    }
}
