//! Issue tracker connector backed by an in-memory ticket table.

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

const NAME: &str = "tracker";
const ACTIONS: &[&str] = &["create_ticket", "close_ticket", "assign_ticket"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assignee: Option<String>,
    pub updated_at: Timestamp,
}

impl Ticket {
    fn to_record(&self) -> Record {
        let assignee = self.assignee.as_deref().unwrap_or("unassigned");
        Record {
            source_system: NAME.to_string(),
            uri: self.key.clone(),
            title: format!("{}: {}", self.key, self.summary),
            content: format!(
                "{} is {} (priority {}, {}). {}",
                self.key, self.status, self.priority, assignee, self.description
            )
            .trim_end()
            .to_string(),
            updated_at: self.updated_at,
            fields: json!({
                "status": self.status,
                "priority": self.priority,
                "assignee": self.assignee,
            }),
        }
    }
}

struct Board {
    tickets: BTreeMap<String, Ticket>,
    next_number: u64,
}

/// In-memory issue tracker serving tickets.
pub struct TrackerConnector {
    project: String,
    board: Mutex<Board>,
    clock: Arc<dyn Clock>,
    faults: Faults,
}

impl TrackerConnector {
    pub fn new(project: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            project: project.to_string(),
            board: Mutex::new(Board {
                tickets: BTreeMap::new(),
                next_number: 1,
            }),
            clock,
            faults: Faults::default(),
        }
    }

    /// A `PROJ` board with a handful of tickets in assorted states.
    pub fn with_demo_data(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let tracker = Self::new("PROJ", clock);
        let seed = [
            (1, "Initial Setup", "Done", "Low", Some("alice"), 24 * 30),
            (2, "Database Schema", "Done", "Medium", Some("bob"), 24 * 14),
            (3, "API Authentication", "In Progress", "High", Some("alice"), 30),
            (4, "Frontend Layout", "In Progress", "Medium", Some("carol"), 52),
            (5, "Integration Tests", "Open", "Medium", None, 75),
            (6, "Deployment Pipeline", "Blocked", "High", Some("dave"), 6),
        ];
        for (n, summary, status, priority, assignee, age_hours) in seed {
            tracker.insert(Ticket {
                key: format!("PROJ-{}", n),
                summary: summary.to_string(),
                description: String::new(),
                status: status.to_string(),
                priority: priority.to_string(),
                assignee: assignee.map(str::to_string),
                updated_at: now.plus_secs(-(age_hours * 3600)),
            });
        }
        tracker.insert(Ticket {
            key: "PROJ-123".to_string(),
            summary: "API timeout on checkout".to_string(),
            description: "Checkout requests time out under load after the gateway upgrade."
                .to_string(),
            status: "In Progress".to_string(),
            priority: "High".to_string(),
            assignee: Some("bob".to_string()),
            updated_at: now.plus_secs(-2 * 3600),
        });
        tracker
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Insert or replace a ticket. Keeps the key counter ahead of it.
    pub fn insert(&self, ticket: Ticket) {
        if let Ok(mut board) = self.board.lock() {
            if let Some(n) = ticket
                .key
                .strip_prefix(&format!("{}-", self.project))
                .and_then(|n| n.parse::<u64>().ok())
            {
                board.next_number = board.next_number.max(n + 1);
            }
            board.tickets.insert(ticket.key.clone(), ticket);
        }
    }

    pub fn ticket(&self, key: &str) -> Option<Ticket> {
        self.board.lock().ok()?.tickets.get(key).cloned()
    }

    pub fn ticket_count(&self) -> usize {
        self.board.lock().map(|b| b.tickets.len()).unwrap_or(0)
    }

    fn with_board<T>(
        &self,
        f: impl FnOnce(&mut Board) -> Result<T, ConnectorError>,
    ) -> Result<T, ConnectorError> {
        let mut board = self
            .board
            .lock()
            .map_err(|e| ConnectorError::unavailable(NAME, format!("Lock poisoned: {}", e)))?;
        f(&mut board)
    }

    fn create_ticket(&self, params: &Value) -> Result<ActionOutcome, ConnectorError> {
        let summary = required_str(params, "summary")?.to_string();
        let description = params
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let priority = params
            .get("priority")
            .and_then(Value::as_str)
            .unwrap_or("Medium")
            .to_string();
        let assignee = params
            .get("assignee")
            .and_then(Value::as_str)
            .map(str::to_string);
        let now = self.clock.now();

        let key = self.with_board(|board| {
            let key = format!("{}-{}", self.project, board.next_number);
            board.next_number += 1;
            board.tickets.insert(
                key.clone(),
                Ticket {
                    key: key.clone(),
                    summary: summary.clone(),
                    description,
                    status: "Open".to_string(),
                    priority,
                    assignee,
                    updated_at: now,
                },
            );
            Ok(key)
        })?;

        info!(ticket = %key, "Ticket created");
        Ok(ActionOutcome {
            message: format!("Created {}: {}", key, summary),
            entity: Some(EntityRef::Ticket(key)),
        })
    }

    fn close_ticket(&self, params: &Value) -> Result<ActionOutcome, ConnectorError> {
        let key = required_str(params, "ticket")?.to_string();
        let now = self.clock.now();
        self.with_board(|board| {
            let ticket = board
                .tickets
                .get_mut(&key)
                .ok_or_else(|| ConnectorError::NotFound(format!("ticket {}", key)))?;
            if ticket.status == "Done" {
                return Err(ConnectorError::Action(format!("{} is already closed", key)));
            }
            ticket.status = "Done".to_string();
            ticket.updated_at = now;
            Ok(())
        })?;

        info!(ticket = %key, "Ticket closed");
        Ok(ActionOutcome {
            message: format!("Closed {}", key),
            entity: Some(EntityRef::Ticket(key)),
        })
    }

    fn assign_ticket(&self, params: &Value) -> Result<ActionOutcome, ConnectorError> {
        let key = required_str(params, "ticket")?.to_string();
        let assignee = required_str(params, "assignee")?.to_string();
        let now = self.clock.now();
        self.with_board(|board| {
            let ticket = board
                .tickets
                .get_mut(&key)
                .ok_or_else(|| ConnectorError::NotFound(format!("ticket {}", key)))?;
            ticket.assignee = Some(assignee.clone());
            ticket.updated_at = now;
            Ok(())
        })?;

        info!(ticket = %key, assignee = %assignee, "Ticket assigned");
        Ok(ActionOutcome {
            message: format!("Assigned {} to {}", key, assignee),
            entity: Some(EntityRef::Ticket(key)),
        })
    }
}

#[async_trait]
impl Connector for TrackerConnector {
    fn name(&self) -> &str {
        NAME
    }

    fn domain(&self) -> ConnectorDomain {
        ConnectorDomain {
            source_system: NAME.to_string(),
            entity_kinds: vec![EntityKind::Ticket],
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
        let EntityRef::Ticket(key) = entity else {
            return Err(ConnectorError::Unsupported(format!(
                "{} does not serve {} entities",
                NAME,
                entity.kind()
            )));
        };
        self.with_board(|board| {
            board
                .tickets
                .get(key)
                .map(Ticket::to_record)
                .ok_or_else(|| ConnectorError::NotFound(format!("ticket {}", key)))
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
            .filter(|e| e.kind() == EntityKind::Ticket)
            .map(EntityRef::id)
            .collect();

        let mut hits = self.with_board(|board| {
            Ok(board
                .tickets
                .values()
                .filter(|t| scope.admits(t.updated_at))
                .filter(|t| wanted.is_empty() || wanted.contains(&t.key.as_str()))
                .map(|t| {
                    let text = format!("{} {} {} {}", t.key, t.summary, t.description, t.status);
                    (matched_terms(&terms, &text), t.to_record())
                })
                .filter(|(matched, _)| terms.is_empty() || *matched > 0)
                .collect::<Vec<_>>())
        })?;

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.updated_at.cmp(&a.1.updated_at)));
        Ok(hits.into_iter().take(limit).map(|(_, r)| r).collect())
    }

    async fn execute(
        &self,
        action_type: &str,
        params: &Value,
    ) -> Result<ActionOutcome, ConnectorError> {
        self.faults.gate(NAME).await?;
        match action_type {
            "create_ticket" => self.create_ticket(params),
            "close_ticket" => self.close_ticket(params),
            "assign_ticket" => self.assign_ticket(params),
            other => Err(ConnectorError::Unsupported(format!(
                "{} cannot execute {}",
                NAME, other
            ))),
        }
    }
}
