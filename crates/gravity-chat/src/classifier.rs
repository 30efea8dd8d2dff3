//! Intent classifier.
//!
//! Three layers, in order:
//! 1. a deterministic rule layer that turns imperative action verbs at the
//!    start of a message into an `action` intent with extracted parameters;
//! 2. a pluggable [`ModelClassifier`] for everything else;
//! 3. a confidence gate that turns anything below the threshold into a
//!    clarifying question, so low-confidence actions never get proposed.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use gravity_action::ActionType;
use gravity_connector::EntityRef;
use gravity_core::config::ClassifierConfig;
use gravity_core::Timestamp;

use crate::error::ChatError;
use crate::types::{AggregationScope, Classification, Intent, IntentKind, Turn};

/// Confidence assigned by the rule layer.
pub const RULE_CONFIDENCE: f32 = 0.95;

const DAY_SECS: i64 = 24 * 3600;

// =============================================================================
// Compiled patterns
// =============================================================================

static TICKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Z0-9]+-\d+)\b").expect("Invalid ticket regex"));

/// Ticket keys inside commands, where users often type them lowercase.
static TICKET_ANY_CASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9]+-\d+)\b").expect("Invalid ticket regex")
});

static CHANNEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s(])#([a-z0-9][a-z0-9_-]*)").expect("Invalid channel regex")
});

static SHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([0-9a-f]{7,40})\b").expect("Invalid sha regex"));

static REFERS_BACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:it|its|them|those|they|he|she|him|her)\b|\b(?:this|that|the same)\s+(?:one|ticket|issue|channel|commit)\b",
    )
    .expect("Invalid pronoun regex")
});

struct ActionPatterns {
    create: Regex,
    close: Regex,
    assign: Regex,
    post: Regex,
}

static ACTION_PATTERNS: LazyLock<ActionPatterns> = LazyLock::new(|| {
    let lead = r"(?i)^(?:please\s+|can you\s+|could you\s+|let's\s+)?";
    let mk = |body: &str| Regex::new(&format!("{}{}", lead, body)).expect("Invalid action regex");
    ActionPatterns {
        create: mk(
            r"(?:create|open|file|raise|log)\s+(?:up\s+)?(?:a\s+|an\s+)?(?:new\s+)?(?:(?P<prio>low|medium|high|critical)(?:[\s-]+priority)?\s+)?(?:ticket|issue|bug)\b(?P<rest>.*)$",
        ),
        close: mk(r"(?:close|resolve)(?:\s+(?P<rest>.*))?$"),
        assign: mk(r"assign(?:\s+(?P<rest>.*))?$"),
        post: mk(r"(?:post|send)(?:\s+(?P<rest>.*))?$"),
    }
});

/// "send me ...", "send us ...": a request for content, not a chat post.
static PERSONAL_RECIPIENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:me|us|him|her|them)\b").expect("Invalid recipient regex")
});

static PRIORITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:with\s+)?(?:a\s+)?(?P<a>low|medium|high|critical)\s+priority\b|\bpriority\s*[:=]?\s*(?P<b>low|medium|high|critical)\b",
    )
    .expect("Invalid priority regex")
});

static ASSIGNED_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:and\s+)?assign(?:ed)?\s+(?:it\s+)?to\s+@?(?P<who>[a-z][\w-]*(?:\.[\w-]+)*)")
        .expect("Invalid assignee regex")
});

static TO_WHOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bto\s+@?(?P<who>[a-z][\w-]*(?:\.[\w-]+)*)").expect("Invalid assignee regex")
});

static WHO_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*@?(?P<who>[a-z][\w-]*(?:\.[\w-]+)*)\s+to\b").expect("Invalid assignee regex")
});

static SUMMARY_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:for|about|on|to track|titled|called|named|saying)\b)?\s*[:\-]?\s*(?:the\s+)?")
        .expect("Invalid summary regex")
});

static POST_CHANNEL_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:a\s+)?(?:message\s+)?(?:to|in|on)\s+#?(?P<channel>[\w-]+)\s*(?:[:,]\s*|\s+(?:that|saying)\s+|\s+)(?P<text>.+)$",
    )
    .expect("Invalid post regex")
});

static POST_TEXT_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<text>.+?)\s+(?:to|in|on)\s+#(?P<channel>[\w-]+)\s*[.!]?\s*$")
        .expect("Invalid post regex")
});

static LAST_N_DAYS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last|past)\s+(\d{1,3})\s+days?\b").expect("Invalid window regex")
});

static QUESTION_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:what|what's|whats|who|whom|when|where|why|how|which|is|are|was|were|does|do|did|has|have|can|could|list|show|find)\b")
        .expect("Invalid question regex")
});

static ACTION_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:create|close|resolve|assign|delete|update|post|send|reopen)\b")
        .expect("Invalid action word regex")
});

const AGGREGATION_CUES: &[&str] = &[
    "summarize", "summarise", "summary", "overview", "recap", "digest", "across",
    "this week", "last week", "past week", "this month", "last month", "today", "yesterday",
    "what happened", "what's new", "whats new", "latest updates", "recent activity",
];

const TRIAGE_WORDS: &[&str] = &[
    "ticket", "issue", "bug", "commit", "pr", "deploy", "deployment", "release", "sprint",
    "blocked", "outage", "incident", "backlog",
];

/// Words that name a source system, keyed by connector source.
const SOURCE_HINTS: &[(&str, &[&str])] = &[
    ("tracker", &["jira", "tracker", "ticket", "tickets", "issues"]),
    ("chat", &["slack", "chat", "channel", "channels", "messages"]),
    ("scm", &["git", "github", "commit", "commits", "repo", "scm"]),
];

const ACTION_HINT: &str = "It sounds like you want me to change something. Say it as a command, \
for example \"Create a ticket for the login bug\" or \"Close PROJ-123\".";

// =============================================================================
// Entities
// =============================================================================

/// Ticket keys, `#channels` and commit SHAs mentioned in `text`, in order.
pub fn extract_entities(text: &str) -> Vec<EntityRef> {
    let mut found: Vec<(usize, EntityRef)> = Vec::new();
    for m in TICKET_RE.captures_iter(text).filter_map(|c| c.get(1)) {
        found.push((m.start(), EntityRef::Ticket(m.as_str().to_string())));
    }
    for m in CHANNEL_RE.captures_iter(text).filter_map(|c| c.get(1)) {
        found.push((m.start(), EntityRef::Channel(m.as_str().to_lowercase())));
    }
    for m in SHA_RE.captures_iter(text).filter_map(|c| c.get(1)) {
        let s = m.as_str();
        let has_digit = s.chars().any(|c| c.is_ascii_digit());
        let has_letter = s.chars().any(|c| c.is_ascii_alphabetic());
        if has_digit && has_letter {
            found.push((m.start(), EntityRef::Commit(s.to_lowercase())));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, e)| e)
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// Whether `text` points back at something said earlier.
fn refers_back(text: &str) -> bool {
    REFERS_BACK_RE.is_match(text)
}

/// Entities of the most recent turn that mentioned any.
fn inherited_entities(context: &[Turn]) -> Vec<EntityRef> {
    context
        .iter()
        .rev()
        .map(|t| extract_entities(&t.content))
        .find(|e| !e.is_empty())
        .unwrap_or_default()
}

// =============================================================================
// Rule layer
// =============================================================================

fn clean(s: &str) -> String {
    let s = s
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .trim_matches(['"', '\'']);
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ticket_in(rest: &str, entities: &[EntityRef]) -> Option<String> {
    TICKET_ANY_CASE_RE
        .captures(rest)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
        .or_else(|| {
            entities.iter().find_map(|e| match e {
                EntityRef::Ticket(key) => Some(key.clone()),
                _ => None,
            })
        })
}

fn create_params(prio: Option<&str>, rest: &str) -> Map<String, Value> {
    let mut params = Map::new();
    let mut rest = rest.to_string();

    let mut priority = prio.map(str::to_string);
    let stated = PRIORITY_RE
        .captures(&rest)
        .and_then(|c| c.name("a").or_else(|| c.name("b")))
        .map(|m| m.as_str().to_string());
    if stated.is_some() {
        priority = stated;
        rest = PRIORITY_RE.replace(&rest, "").into_owned();
    }
    let assignee = ASSIGNED_TO_RE
        .captures(&rest)
        .and_then(|c| c.name("who"))
        .map(|m| m.as_str().to_string());
    if let Some(who) = assignee {
        params.insert("assignee".into(), Value::String(who));
        rest = ASSIGNED_TO_RE.replace(&rest, "").into_owned();
    }
    if let Some(priority) = priority {
        params.insert("priority".into(), Value::String(priority));
    }

    let summary = clean(&SUMMARY_LEAD_RE.replace(&rest, ""));
    let summary = summary.trim_end_matches([',', ';']).trim().to_string();
    if !summary.is_empty() {
        params.insert("summary".into(), Value::String(summary));
    }
    params
}

fn assign_params(rest: &str, entities: &[EntityRef]) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(ticket) = ticket_in(rest, entities) {
        params.insert("ticket".into(), Value::String(ticket));
    }
    let is_ticket = |s: &str| TICKET_ANY_CASE_RE.is_match(s);
    let assignee = TO_WHOM_RE
        .captures(rest)
        .and_then(|c| c.name("who"))
        .map(|m| m.as_str())
        .filter(|who| !is_ticket(who) && !who.eq_ignore_ascii_case("it"))
        .or_else(|| {
            WHO_TO_RE
                .captures(rest)
                .and_then(|c| c.name("who"))
                .map(|m| m.as_str())
                .filter(|who| !is_ticket(who) && !who.eq_ignore_ascii_case("it"))
        });
    if let Some(who) = assignee {
        params.insert("assignee".into(), Value::String(who.to_string()));
    }
    params
}

fn post_params(rest: &str) -> Map<String, Value> {
    let mut params = Map::new();
    let captures = POST_CHANNEL_FIRST_RE
        .captures(rest)
        .or_else(|| POST_TEXT_FIRST_RE.captures(rest));
    if let Some(c) = captures {
        if let Some(channel) = c.name("channel") {
            params.insert("channel".into(), Value::String(channel.as_str().to_lowercase()));
        }
        if let Some(text) = c.name("text") {
            let text = clean(text.as_str());
            if !text.is_empty() {
                params.insert("text".into(), Value::String(text));
            }
        }
    }
    params
}

/// Imperative action verb at the start of `text`, with whatever
/// parameters could be read off it. Missing parameters are left out so
/// that catalog validation can ask for them.
pub fn rule_action(text: &str, entities: &[EntityRef]) -> Option<(ActionType, Value)> {
    let text = text.trim();
    let p = &*ACTION_PATTERNS;
    let rest = |c: &regex::Captures<'_>| c.name("rest").map_or("", |m| m.as_str()).to_string();

    let (action_type, params) = if let Some(c) = p.create.captures(text) {
        let prio = c.name("prio").map(|m| m.as_str());
        (ActionType::CreateTicket, create_params(prio, &rest(&c)))
    } else if let Some(c) = p.close.captures(text) {
        let mut params = Map::new();
        if let Some(ticket) = ticket_in(&rest(&c), entities) {
            params.insert("ticket".into(), Value::String(ticket));
        }
        (ActionType::CloseTicket, params)
    } else if let Some(c) = p.assign.captures(text) {
        (ActionType::AssignTicket, assign_params(&rest(&c), entities))
    } else if let Some(c) = p
        .post
        .captures(text)
        .filter(|c| !PERSONAL_RECIPIENT_RE.is_match(&rest(c)))
    {
        (ActionType::PostMessage, post_params(&rest(&c)))
    } else {
        return None;
    };
    Some((action_type, Value::Object(params)))
}

// =============================================================================
// Aggregation scope
// =============================================================================

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Time window and source hints named in `text`.
pub fn aggregation_scope(text: &str, now: Timestamp) -> AggregationScope {
    let lower = text.to_lowercase();
    let window_days = if let Some(n) = LAST_N_DAYS_RE
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        Some(n.max(1))
    } else if lower.contains("today") {
        Some(1)
    } else if lower.contains("yesterday") {
        Some(2)
    } else if ["this week", "last week", "past week"].iter().any(|p| lower.contains(p)) {
        Some(7)
    } else if ["this month", "last month", "past month"].iter().any(|p| lower.contains(p)) {
        Some(30)
    } else {
        None
    };

    let words = words(text);
    let sources = SOURCE_HINTS
        .iter()
        .filter(|(_, hints)| hints.iter().any(|h| words.contains(*h)))
        .map(|(source, _)| source.to_string())
        .collect();

    AggregationScope {
        since: window_days.map(|d| now.plus_secs(-d * DAY_SECS)),
        sources,
    }
}

// =============================================================================
// Model layer
// =============================================================================

/// What a model-backed classifier returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub kind: IntentKind,
    pub confidence: f32,
    pub entities: Vec<EntityRef>,
}

/// Classifier for messages the rule layer does not claim.
#[async_trait]
pub trait ModelClassifier: Send + Sync {
    async fn classify(&self, text: &str, context: &[Turn]) -> Result<ModelVerdict, ChatError>;
}

/// Keyword-scored stand-in for a model classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicModel;

#[async_trait]
impl ModelClassifier for HeuristicModel {
    async fn classify(&self, text: &str, _context: &[Turn]) -> Result<ModelVerdict, ChatError> {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();
        let entities = extract_entities(trimmed);

        let cues = AGGREGATION_CUES.iter().filter(|c| lower.contains(*c)).count()
            + usize::from(LAST_N_DAYS_RE.is_match(&lower));
        let is_question = trimmed.ends_with('?') || QUESTION_LEAD_RE.is_match(trimmed);
        let triage = {
            let w = words(trimmed);
            TRIAGE_WORDS.iter().any(|t| w.contains(*t))
        };

        let (kind, confidence) = if cues > 0 {
            (IntentKind::Aggregation, (0.75 + 0.05 * cues as f32).min(0.9))
        } else if !is_question && ACTION_WORD_RE.is_match(trimmed) {
            (IntentKind::Action, 0.45)
        } else if !entities.is_empty() {
            (IntentKind::Retrieval, if is_question { 0.85 } else { 0.75 })
        } else if is_question {
            (IntentKind::Retrieval, 0.7)
        } else if triage {
            (IntentKind::Retrieval, 0.6)
        } else {
            (IntentKind::Retrieval, 0.35)
        };

        Ok(ModelVerdict {
            kind,
            confidence,
            entities,
        })
    }
}

// =============================================================================
// IntentClassifier
// =============================================================================

/// Question asked when the classifier is not confident enough to proceed.
pub fn clarifying_question(entities: &[EntityRef]) -> String {
    if entities.is_empty() {
        "Could you be more specific? Name a ticket (e.g. PROJ-123), a channel \
         (e.g. #releases), or a time window (e.g. this week)."
            .to_string()
    } else {
        let names: Vec<String> = entities.iter().map(|e| e.to_string()).collect();
        format!(
            "Do you want the current status of {}, or a summary of recent activity around it?",
            names.join(", ")
        )
    }
}

pub struct IntentClassifier {
    model: Arc<dyn ModelClassifier>,
    threshold: f32,
    context_turns: usize,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn ModelClassifier>, threshold: f32, context_turns: usize) -> Self {
        Self {
            model,
            threshold,
            context_turns,
        }
    }

    /// Heuristic model with the configured threshold and context window.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            Arc::new(HeuristicModel),
            config.confidence_threshold,
            config.context_turns,
        )
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify `text` given the session's turns so far.
    pub async fn classify(
        &self,
        text: &str,
        context: &[Turn],
        now: Timestamp,
    ) -> Result<Classification, ChatError> {
        let recent = &context[context.len().saturating_sub(self.context_turns)..];

        let mut entities = extract_entities(text);
        if entities.is_empty() && refers_back(text) {
            entities = inherited_entities(recent);
            if !entities.is_empty() {
                debug!(count = entities.len(), "Follow-up inherits entities from context");
            }
        }

        if let Some((action_type, parameters)) = rule_action(text, &entities) {
            return Ok(self.gate(Classification {
                intent: Intent::Action {
                    action_type,
                    parameters,
                },
                confidence: RULE_CONFIDENCE,
                entities,
            }));
        }

        let verdict = self.model.classify(text, recent).await?;
        for e in verdict.entities {
            if !entities.contains(&e) {
                entities.push(e);
            }
        }

        let query = text.trim().to_string();
        let intent = match verdict.kind {
            IntentKind::Retrieval => Intent::Retrieval { query },
            IntentKind::Aggregation => Intent::Aggregation {
                scope: aggregation_scope(&query, now),
                query,
            },
            // Actions need parameters, which only the rule layer extracts.
            IntentKind::Action => Intent::Clarification {
                question: ACTION_HINT.to_string(),
            },
            IntentKind::Clarification => Intent::Clarification {
                question: clarifying_question(&entities),
            },
        };

        Ok(self.gate(Classification {
            intent,
            confidence: verdict.confidence.clamp(0.0, 1.0),
            entities,
        }))
    }

    fn gate(&self, classification: Classification) -> Classification {
        if classification.confidence >= self.threshold
            || matches!(classification.intent, Intent::Clarification { .. })
        {
            return classification;
        }
        debug!(
            intent = %classification.intent.kind(),
            confidence = classification.confidence,
            threshold = self.threshold,
            "Below threshold, asking for clarification"
        );
        let question = match classification.intent {
            Intent::Action { .. } => ACTION_HINT.to_string(),
            _ => clarifying_question(&classification.entities),
        };
        Classification {
            intent: Intent::Clarification { question },
            ..classification
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Role;

    const NOW: Timestamp = Timestamp(1_700_000_000);

    fn classifier() -> IntentClassifier {
        IntentClassifier::from_config(&ClassifierConfig::default())
    }

    fn turn(role: Role, content: &str) -> Turn {
        Turn {
            role,
            content: content.to_string(),
            intent: None,
            confidence: None,
            sources: Vec::new(),
            pending_action_ref: None,
            timestamp: NOW,
        }
    }

    struct Fixed(ModelVerdict);

    #[async_trait]
    impl ModelClassifier for Fixed {
        async fn classify(&self, _: &str, _: &[Turn]) -> Result<ModelVerdict, ChatError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_extract_entities() {
        let entities = extract_entities("Is PROJ-123 related to 9f2c4e1 in #Incidents? Also PROJ-123.");
        assert_eq!(
            entities,
            vec![
                EntityRef::Ticket("PROJ-123".into()),
                EntityRef::Commit("9f2c4e1".into()),
                EntityRef::Channel("incidents".into()),
            ]
        );
        // Hex-looking words without digits are not SHAs.
        assert!(extract_entities("the decaded facade").is_empty());
    }

    #[tokio::test]
    async fn test_status_question_is_retrieval() {
        let c = classifier()
            .classify("What's the status of PROJ-123?", &[], NOW)
            .await
            .unwrap();
        assert_eq!(c.intent.kind(), IntentKind::Retrieval);
        assert!(c.confidence >= 0.8);
        assert_eq!(c.entities, vec![EntityRef::Ticket("PROJ-123".into())]);
    }

    #[tokio::test]
    async fn test_create_ticket_rule() {
        let c = classifier()
            .classify("Create a ticket for the API timeout issue", &[], NOW)
            .await
            .unwrap();
        assert_eq!(c.confidence, RULE_CONFIDENCE);
        assert_eq!(
            c.intent,
            Intent::Action {
                action_type: ActionType::CreateTicket,
                parameters: json!({"summary": "API timeout issue"}),
            }
        );
    }

    #[test]
    fn test_create_ticket_with_priority_and_assignee() {
        let (t, params) = rule_action(
            "Please open a high priority bug: checkout fails on Safari, assigned to carol",
            &[],
        )
        .unwrap();
        assert_eq!(t, ActionType::CreateTicket);
        assert_eq!(
            params,
            json!({"summary": "checkout fails on Safari", "priority": "high", "assignee": "carol"})
        );
    }

    #[test]
    fn test_close_and_assign_rules() {
        assert_eq!(
            rule_action("close proj-5", &[]).unwrap(),
            (ActionType::CloseTicket, json!({"ticket": "PROJ-5"}))
        );
        assert_eq!(
            rule_action("Assign PROJ-5 to erin", &[]).unwrap(),
            (ActionType::AssignTicket, json!({"ticket": "PROJ-5", "assignee": "erin"}))
        );
        assert_eq!(
            rule_action("assign dave to PROJ-6", &[]).unwrap(),
            (ActionType::AssignTicket, json!({"ticket": "PROJ-6", "assignee": "dave"}))
        );
    }

    #[test]
    fn test_post_rules() {
        assert_eq!(
            rule_action("Post to #Releases: Deploy finished", &[]).unwrap(),
            (ActionType::PostMessage, json!({"channel": "releases", "text": "Deploy finished"}))
        );
        assert_eq!(
            rule_action("send \"standup moved to 10am\" to #general", &[]).unwrap(),
            (ActionType::PostMessage, json!({"channel": "general", "text": "standup moved to 10am"}))
        );
    }

    #[test]
    fn test_verb_prefixes_are_not_actions() {
        for text in [
            "Post-mortem summary of this week's incidents",
            "Send me a summary of tracker activity this week",
            "send us the release notes",
            "Close-out report for the sprint",
            "Assignment overview for last week",
        ] {
            assert!(rule_action(text, &[]).is_none(), "{}", text);
        }
    }

    #[tokio::test]
    async fn test_summary_requests_with_verb_prefix_are_aggregation() {
        for text in [
            "Post-mortem summary of this week's incidents",
            "Send me a summary of tracker activity this week",
        ] {
            let c = classifier().classify(text, &[], NOW).await.unwrap();
            let Intent::Aggregation { scope, .. } = c.intent else {
                panic!("expected aggregation for {:?}, got {:?}", text, c.intent);
            };
            assert_eq!(scope.since, Some(NOW.plus_secs(-7 * DAY_SECS)));
        }
    }

    #[test]
    fn test_rule_leaves_missing_params_out() {
        assert_eq!(
            rule_action("Create a ticket", &[]).unwrap(),
            (ActionType::CreateTicket, json!({}))
        );
        assert!(rule_action("What did we create last sprint?", &[]).is_none());
    }

    #[tokio::test]
    async fn test_follow_up_inherits_ticket() {
        let context = vec![
            turn(Role::User, "What's the status of PROJ-5?"),
            turn(Role::Assistant, "PROJ-5 is Open [tracker:PROJ-5]"),
        ];
        let c = classifier().classify("Close it", &context, NOW).await.unwrap();
        assert_eq!(
            c.intent,
            Intent::Action {
                action_type: ActionType::CloseTicket,
                parameters: json!({"ticket": "PROJ-5"}),
            }
        );

        let c = classifier()
            .classify("who is working on it?", &context, NOW)
            .await
            .unwrap();
        assert_eq!(c.intent.kind(), IntentKind::Retrieval);
        assert_eq!(c.entities, vec![EntityRef::Ticket("PROJ-5".into())]);
    }

    #[tokio::test]
    async fn test_context_window_is_bounded() {
        let mut context = vec![turn(Role::User, "status of PROJ-9?")];
        for _ in 0..10 {
            context.push(turn(Role::Assistant, "nothing to report"));
        }
        let c = classifier().classify("and what about it?", &context, NOW).await.unwrap();
        assert!(c.entities.is_empty());
    }

    #[tokio::test]
    async fn test_aggregation_scope() {
        let c = classifier()
            .classify("Summarize what happened this week in slack", &[], NOW)
            .await
            .unwrap();
        let Intent::Aggregation { scope, .. } = c.intent else {
            panic!("expected aggregation");
        };
        assert_eq!(scope.since, Some(NOW.plus_secs(-7 * DAY_SECS)));
        assert_eq!(scope.sources, vec!["chat".to_string()]);

        let scope = aggregation_scope("recap of jira and git over the last 3 days", NOW);
        assert_eq!(scope.since, Some(NOW.plus_secs(-3 * DAY_SECS)));
        assert_eq!(scope.sources, vec!["tracker".to_string(), "scm".to_string()]);
    }

    #[tokio::test]
    async fn test_vague_message_asks_for_clarification() {
        let c = classifier().classify("hmm", &[], NOW).await.unwrap();
        assert_eq!(c.intent.kind(), IntentKind::Clarification);
        assert!(c.confidence < 0.5);
    }

    #[tokio::test]
    async fn test_non_leading_action_word_never_becomes_action() {
        let c = classifier()
            .classify("maybe we should close something", &[], NOW)
            .await
            .unwrap();
        assert_eq!(
            c.intent,
            Intent::Clarification {
                question: ACTION_HINT.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_low_confidence_never_yields_action_or_retrieval() {
        let strict = IntentClassifier::new(Arc::new(HeuristicModel), 0.99, 5);
        for text in [
            "Create a ticket for the API timeout issue",
            "What's the status of PROJ-123?",
            "Summarize this week",
        ] {
            let c = strict.classify(text, &[], NOW).await.unwrap();
            assert_eq!(c.intent.kind(), IntentKind::Clarification, "{}", text);
        }
    }

    #[tokio::test]
    async fn test_model_action_verdict_becomes_clarification() {
        let model = Fixed(ModelVerdict {
            kind: IntentKind::Action,
            confidence: 0.9,
            entities: Vec::new(),
        });
        let c = IntentClassifier::new(Arc::new(model), 0.5, 5)
            .classify("do the thing", &[], NOW)
            .await
            .unwrap();
        assert_eq!(c.intent.kind(), IntentKind::Clarification);
    }

    #[test]
    fn test_clarifying_question_mentions_entities() {
        let q = clarifying_question(&[EntityRef::Channel("ops".into())]);
        assert!(q.contains("#ops"));
    }
}
