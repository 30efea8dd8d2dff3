//! Action orchestrator.
//!
//! Turns validated action intents into proposals and drives confirmed
//! proposals through exactly one connector call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use gravity_connector::ConnectorRegistry;
use gravity_core::{Clock, IdGenerator};

use crate::catalog::ActionCatalog;
use crate::error::ActionError;
use crate::ledger::{ActionLedger, ConfirmDecision};
use crate::types::{ActionStatus, ActionType, PendingAction};

/// Result of a confirmation that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub action: PendingAction,
    /// Connector confirmation text, or a cancellation note.
    pub message: String,
}

pub struct ActionOrchestrator {
    registry: Arc<ConnectorRegistry>,
    catalog: ActionCatalog,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    ttl_secs: i64,
}

impl ActionOrchestrator {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            registry,
            catalog: ActionCatalog::new(),
            clock,
            ids,
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// Validate parameters and record a `Proposed` action. Nothing executes.
    pub fn propose(
        &self,
        ledger: &ActionLedger,
        action_type: ActionType,
        params: &Value,
    ) -> Result<PendingAction, ActionError> {
        let parameters = self.catalog.validate(action_type, params)?;
        let connector = self
            .registry
            .owner_of(action_type.as_str())
            .ok_or(ActionError::NoConnector(action_type))?;

        let now = self.clock.now();
        let action = PendingAction {
            action_id: self.ids.next_id("act"),
            action_type,
            description: self.catalog.describe(action_type, &parameters),
            parameters,
            status: ActionStatus::Proposed,
            connector: connector.name().to_string(),
            created_at: now,
            expires_at: now.plus_secs(self.ttl_secs),
            outcome: None,
            history: Vec::new(),
        };
        ledger.insert(action.clone())?;

        info!(
            action_id = %action.action_id,
            action_type = %action_type,
            connector = %action.connector,
            "Action proposed"
        );
        Ok(action)
    }

    /// Resolve a proposal.
    ///
    /// Declining cancels. Approving wins the ledger's compare-and-set and
    /// then runs the connector call on its own task, so dropping this
    /// future cannot leave the action stuck in `Executing`.
    pub async fn confirm(
        &self,
        ledger: &Arc<ActionLedger>,
        action_id: &str,
        approved: bool,
    ) -> Result<ActionReceipt, ActionError> {
        let action = match ledger.begin_confirmation(action_id, approved, self.clock.now())? {
            ConfirmDecision::Cancelled(action) => {
                return Ok(ActionReceipt {
                    message: format!("Cancelled: {}", action.description),
                    action,
                });
            }
            ConfirmDecision::Execute(action) => action,
        };

        let Some(connector) = self.registry.get(&action.connector) else {
            let detail = format!("connector {} is not registered", action.connector);
            ledger.record_outcome(action_id, Err(detail.clone()), self.clock.now())?;
            return Err(ActionError::Execution {
                action_id: action_id.to_string(),
                detail,
            });
        };

        let task_ledger = Arc::clone(ledger);
        let clock = Arc::clone(&self.clock);
        let handle = tokio::spawn(async move {
            let result = connector
                .execute(action.action_type.as_str(), &action.parameters)
                .await
                .map(|outcome| outcome.message)
                .map_err(|e| e.to_string());
            task_ledger.record_outcome(&action.action_id, result, clock.now())
        });

        let settled = handle.await.map_err(|e| ActionError::Execution {
            action_id: action_id.to_string(),
            detail: format!("execution task aborted: {}", e),
        })??;

        let message = settled.outcome.clone().unwrap_or_default();
        match settled.status {
            ActionStatus::Succeeded => Ok(ActionReceipt {
                action: settled,
                message,
            }),
            _ => {
                warn!(action_id, detail = %message, "Action failed");
                Err(ActionError::Execution {
                    action_id: action_id.to_string(),
                    detail: message,
                })
            }
        }
    }

    /// Expire proposals in `ledger` whose TTL has elapsed.
    pub fn expire_overdue(&self, ledger: &ActionLedger) -> Vec<String> {
        ledger.expire_overdue(self.clock.now())
    }
}
