//! Parameter schemas and descriptions for each action type.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ActionError;
use crate::types::ActionType;

static TICKET_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9]+-\d+$").expect("Invalid ticket key regex"));

const PRIORITIES: &[&str] = &["Low", "Medium", "High", "Critical"];

/// How a parameter value is checked and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    Text,
    TicketKey,
    /// Channel name; a leading `#` is stripped.
    Channel,
    Priority,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub rule: ParamRule,
}

const fn required(name: &'static str, rule: ParamRule) -> ParamSpec {
    ParamSpec {
        name,
        required: true,
        rule,
    }
}

const fn optional(name: &'static str, rule: ParamRule) -> ParamSpec {
    ParamSpec {
        name,
        required: false,
        rule,
    }
}

const CREATE_TICKET: &[ParamSpec] = &[
    required("summary", ParamRule::Text),
    optional("description", ParamRule::Text),
    optional("priority", ParamRule::Priority),
    optional("assignee", ParamRule::Text),
];
const CLOSE_TICKET: &[ParamSpec] = &[required("ticket", ParamRule::TicketKey)];
const ASSIGN_TICKET: &[ParamSpec] = &[
    required("ticket", ParamRule::TicketKey),
    required("assignee", ParamRule::Text),
];
const POST_MESSAGE: &[ParamSpec] = &[
    required("channel", ParamRule::Channel),
    required("text", ParamRule::Text),
];

/// Declares the parameters each action type accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionCatalog;

impl ActionCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn params(&self, action_type: ActionType) -> &'static [ParamSpec] {
        match action_type {
            ActionType::CreateTicket => CREATE_TICKET,
            ActionType::CloseTicket => CLOSE_TICKET,
            ActionType::AssignTicket => ASSIGN_TICKET,
            ActionType::PostMessage => POST_MESSAGE,
        }
    }

    /// Required parameters that are absent or blank.
    pub fn missing(&self, action_type: ActionType, params: &Value) -> Vec<&'static str> {
        self.params(action_type)
            .iter()
            .filter(|p| p.required)
            .filter(|p| text_of(params, p.name).is_none())
            .map(|p| p.name)
            .collect()
    }

    /// Check `params` against the schema and return a normalized copy
    /// holding only declared keys.
    pub fn validate(&self, action_type: ActionType, params: &Value) -> Result<Value, ActionError> {
        if !(params.is_object() || params.is_null()) {
            return Err(ActionError::Validation(format!(
                "{} parameters must be an object",
                action_type
            )));
        }

        let missing = self.missing(action_type, params);
        if !missing.is_empty() {
            return Err(ActionError::Validation(format!(
                "{} needs {}",
                action_type,
                missing.join(" and ")
            )));
        }

        let mut normalized = Map::new();
        for spec in self.params(action_type) {
            let Some(raw) = text_of(params, spec.name) else {
                continue;
            };
            let value = match spec.rule {
                ParamRule::Text => raw.to_string(),
                ParamRule::TicketKey => {
                    let key = raw.to_uppercase();
                    if !TICKET_KEY.is_match(&key) {
                        return Err(ActionError::Validation(format!(
                            "'{}' is not a ticket key (expected e.g. PROJ-123)",
                            raw
                        )));
                    }
                    key
                }
                ParamRule::Channel => {
                    let name = raw.trim_start_matches('#');
                    if name.is_empty() || name.contains(char::is_whitespace) {
                        return Err(ActionError::Validation(format!(
                            "'{}' is not a channel name",
                            raw
                        )));
                    }
                    name.to_lowercase()
                }
                ParamRule::Priority => PRIORITIES
                    .iter()
                    .find(|p| p.eq_ignore_ascii_case(raw))
                    .map(|p| p.to_string())
                    .ok_or_else(|| {
                        ActionError::Validation(format!(
                            "priority must be one of {}",
                            PRIORITIES.join(", ")
                        ))
                    })?,
            };
            normalized.insert(spec.name.to_string(), Value::String(value));
        }
        Ok(Value::Object(normalized))
    }

    /// Human-readable description of what executing the action will do.
    pub fn describe(&self, action_type: ActionType, params: &Value) -> String {
        let get = |key: &str| text_of(params, key).unwrap_or("?");
        match action_type {
            ActionType::CreateTicket => {
                let mut desc = format!("Create ticket \"{}\"", get("summary"));
                if let Some(priority) = text_of(params, "priority") {
                    desc.push_str(&format!(" with {} priority", priority));
                }
                if let Some(assignee) = text_of(params, "assignee") {
                    desc.push_str(&format!(" assigned to {}", assignee));
                }
                desc
            }
            ActionType::CloseTicket => format!("Close ticket {}", get("ticket")),
            ActionType::AssignTicket => {
                format!("Assign ticket {} to {}", get("ticket"), get("assignee"))
            }
            ActionType::PostMessage => {
                format!("Post to #{}: \"{}\"", get("channel"), get("text"))
            }
        }
    }
}

fn text_of<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn catalog() -> ActionCatalog {
        ActionCatalog::new()
    }

    #[test]
    fn test_create_ticket_valid() {
        let params = json!({"summary": " API timeout issue ", "priority": "high", "extra": 1});
        let normalized = catalog()
            .validate(ActionType::CreateTicket, &params)
            .unwrap();
        assert_eq!(
            normalized,
            json!({"summary": "API timeout issue", "priority": "High"})
        );
    }

    #[test]
    fn test_missing_required_params() {
        let err = catalog()
            .validate(ActionType::AssignTicket, &json!({}))
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::Validation("assign_ticket needs ticket and assignee".to_string())
        );
        assert_eq!(
            catalog().missing(ActionType::PostMessage, &json!({"channel": "ops"})),
            vec!["text"]
        );
    }

    #[test]
    fn test_null_params_report_missing() {
        let err = catalog()
            .validate(ActionType::CreateTicket, &Value::Null)
            .unwrap_err();
        assert!(err.to_string().contains("create_ticket needs summary"));
    }

    #[test]
    fn test_non_object_params_rejected() {
        assert!(catalog()
            .validate(ActionType::CloseTicket, &json!(["PROJ-1"]))
            .is_err());
    }

    #[test]
    fn test_ticket_key_normalized_and_checked() {
        let normalized = catalog()
            .validate(ActionType::CloseTicket, &json!({"ticket": "proj-42"}))
            .unwrap();
        assert_eq!(normalized["ticket"], "PROJ-42");

        let err = catalog()
            .validate(ActionType::CloseTicket, &json!({"ticket": "the login bug"}))
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[test]
    fn test_channel_normalized() {
        let normalized = catalog()
            .validate(
                ActionType::PostMessage,
                &json!({"channel": "#Releases", "text": "Deploy done"}),
            )
            .unwrap();
        assert_eq!(normalized["channel"], "releases");
        assert!(catalog()
            .validate(
                ActionType::PostMessage,
                &json!({"channel": "two words", "text": "x"})
            )
            .is_err());
    }

    #[test]
    fn test_bad_priority() {
        let err = catalog()
            .validate(
                ActionType::CreateTicket,
                &json!({"summary": "x", "priority": "urgent"}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("priority must be one of"));
    }

    #[test]
    fn test_describe() {
        let c = catalog();
        assert_eq!(
            c.describe(ActionType::CreateTicket, &json!({"summary": "API timeout issue"})),
            "Create ticket \"API timeout issue\""
        );
        assert_eq!(
            c.describe(
                ActionType::CreateTicket,
                &json!({"summary": "Flaky test", "priority": "Low", "assignee": "bob"})
            ),
            "Create ticket \"Flaky test\" with Low priority assigned to bob"
        );
        assert_eq!(
            c.describe(ActionType::AssignTicket, &json!({"ticket": "PROJ-5", "assignee": "erin"})),
            "Assign ticket PROJ-5 to erin"
        );
        assert_eq!(
            c.describe(ActionType::PostMessage, &json!({"channel": "ops", "text": "hi"})),
            "Post to #ops: \"hi\""
        );
        assert_eq!(
            c.describe(ActionType::CloseTicket, &json!({"ticket": "PROJ-1"})),
            "Close ticket PROJ-1"
        );
    }
}
