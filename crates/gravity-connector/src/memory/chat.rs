//! Team chat connector backed by in-memory channels.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use gravity_core::{Clock, Timestamp};

use super::{required_str, Faults};
use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::types::{
    matched_terms, query_terms, ActionOutcome, ConnectorDomain, EntityKind, EntityRef, Record,
    SearchScope,
};

const NAME: &str = "chat";
const ACTIONS: &[&str] = &["post_message"];
/// Messages folded into a channel status record.
const STATUS_TAIL: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: Timestamp,
}

impl Message {
    fn to_record(&self) -> Record {
        Record {
            source_system: NAME.to_string(),
            uri: format!("#{}/{}", self.channel, self.id),
            title: format!("{} in #{}", self.user, self.channel),
            content: self.text.clone(),
            updated_at: self.ts,
            fields: json!({ "channel": self.channel, "user": self.user }),
        }
    }
}

struct Workspace {
    channels: BTreeMap<String, Vec<Message>>,
    next_id: u64,
}

/// In-memory chat workspace serving channels.
pub struct ChatConnector {
    workspace: Mutex<Workspace>,
    clock: Arc<dyn Clock>,
    faults: Faults,
}

fn channel_name(raw: &str) -> &str {
    raw.trim().trim_start_matches('#')
}

impl ChatConnector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            workspace: Mutex::new(Workspace {
                channels: BTreeMap::new(),
                next_id: 1,
            }),
            clock,
            faults: Faults::default(),
        }
    }

    /// `#releases`, `#incidents` and `#general` with recent chatter.
    pub fn with_demo_data(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let chat = Self::new(clock);
        for name in ["releases", "incidents", "general"] {
            chat.create_channel(name);
        }
        let seed = [
            ("releases", "dave", "Deployment pipeline is blocked on the staging smoke tests (PROJ-6).", 5),
            ("releases", "alice", "Release 2.4 is cut; auth changes from PROJ-3 are behind a flag.", 20),
            ("incidents", "bob", "Checkout API timeout spiking again, tracking in PROJ-123.", 3),
            ("incidents", "carol", "Gateway upgrade rolled back in eu-west, latency recovering.", 2),
            ("general", "erin", "Reminder: integration test triage on Thursday.", 40),
        ];
        for (channel, user, text, age_hours) in seed {
            chat.push(channel, user, text, now.plus_secs(-(age_hours * 3600)));
        }
        chat
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn create_channel(&self, name: &str) {
        if let Ok(mut ws) = self.workspace.lock() {
            ws.channels.entry(channel_name(name).to_string()).or_default();
        }
    }

    /// Append a message to an existing channel.
    pub fn push(&self, channel: &str, user: &str, text: &str, ts: Timestamp) -> Option<Message> {
        let mut ws = self.workspace.lock().ok()?;
        let id = format!("m{}", ws.next_id);
        let messages = ws.channels.get_mut(channel_name(channel))?;
        let message = Message {
            id,
            channel: channel_name(channel).to_string(),
            user: user.to_string(),
            text: text.to_string(),
            ts,
        };
        messages.push(message.clone());
        ws.next_id += 1;
        Some(message)
    }

    pub fn messages(&self, channel: &str) -> Vec<Message> {
        self.workspace
            .lock()
            .ok()
            .and_then(|ws| ws.channels.get(channel_name(channel)).cloned())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Result<Vec<Message>, ConnectorError> {
        let ws = self
            .workspace
            .lock()
            .map_err(|e| ConnectorError::unavailable(NAME, format!("Lock poisoned: {}", e)))?;
        Ok(ws.channels.values().flatten().cloned().collect())
    }
}

#[async_trait]
impl Connector for ChatConnector {
    fn name(&self) -> &str {
        NAME
    }

    fn domain(&self) -> ConnectorDomain {
        ConnectorDomain {
            source_system: NAME.to_string(),
            entity_kinds: vec![EntityKind::Channel],
        }
    }

    fn supported_actions(&self) -> &[&'static str] {
        ACTIONS
    }

    async fn ping(&self) -> Result<(), ConnectorError> {
        self.faults.gate(NAME).await
    }

    async fn fetch_status(&self, entity: &EntityRef) -> Result<Record, ConnectorError> {
        self.faults.gate(NAME).await?;
        let EntityRef::Channel(name) = entity else {
            return Err(ConnectorError::Unsupported(format!(
                "{} does not serve {} entities",
                NAME,
                entity.kind()
            )));
        };
        let name = channel_name(name);
        let ws = self
            .workspace
            .lock()
            .map_err(|e| ConnectorError::unavailable(NAME, format!("Lock poisoned: {}", e)))?;
        let messages = ws
            .channels
            .get(name)
            .ok_or_else(|| ConnectorError::NotFound(format!("channel #{}", name)))?;

        let tail = &messages[messages.len().saturating_sub(STATUS_TAIL)..];
        let content = tail
            .iter()
            .map(|m| format!("{}: {}", m.user, m.text))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Record {
            source_system: NAME.to_string(),
            uri: format!("#{}", name),
            title: format!("#{} ({} messages)", name, messages.len()),
            content,
            updated_at: tail.last().map_or(Timestamp(0), |m| m.ts),
            fields: json!({ "channel": name, "message_count": messages.len() }),
        })
    }

    async fn search_recent(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<Record>, ConnectorError> {
        self.faults.gate(NAME).await?;
        let terms = query_terms(query);
        let wanted: Vec<&str> = scope
            .entities
            .iter()
            .filter(|e| e.kind() == EntityKind::Channel)
            .map(|e| channel_name(e.id()))
            .collect();

        let mut hits: Vec<(usize, Message)> = self
            .snapshot()?
            .into_iter()
            .filter(|m| scope.admits(m.ts))
            .filter(|m| wanted.is_empty() || wanted.contains(&m.channel.as_str()))
            .map(|m| (matched_terms(&terms, &m.text), m))
            .filter(|(matched, _)| terms.is_empty() || *matched > 0)
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.ts.cmp(&a.1.ts)));
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, m)| m.to_record())
            .collect())
    }

    async fn execute(
        &self,
        action_type: &str,
        params: &Value,
    ) -> Result<ActionOutcome, ConnectorError> {
        self.faults.gate(NAME).await?;
        if action_type != "post_message" {
            return Err(ConnectorError::Unsupported(format!(
                "{} cannot execute {}",
                NAME, action_type
            )));
        }
        let channel = channel_name(required_str(params, "channel")?).to_string();
        let text = required_str(params, "text")?;
        let user = params
            .get("user")
            .and_then(Value::as_str)
            .unwrap_or("gravity");

        let message = self
            .push(&channel, user, text, self.clock.now())
            .ok_or_else(|| ConnectorError::Action(format!("channel_not_found: #{}", channel)))?;

        info!(channel = %channel, message_id = %message.id, "Message posted");
        Ok(ActionOutcome {
            message: format!("Posted to #{}", channel),
            entity: Some(EntityRef::Channel(channel)),
        })
    }
}
