//! Per-session record of pending actions.
//!
//! Every status change goes through [`validate_transition`] while the
//! ledger lock is held, so each transition is a compare-and-set: two
//! callers racing on the same action id cannot both leave `Proposed`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use gravity_core::Timestamp;

use crate::error::ActionError;
use crate::state_machine::validate_transition;
use crate::types::{ActionStatus, PendingAction, Transition};

/// What a confirmation call won the right to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmDecision {
    /// The user declined; the action is now `Cancelled`.
    Cancelled(PendingAction),
    /// The caller owns the single execution attempt; the action is `Executing`.
    Execute(PendingAction),
}

#[derive(Debug, Default)]
pub struct ActionLedger {
    actions: Mutex<HashMap<String, PendingAction>>,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, PendingAction>>, ActionError> {
        self.actions
            .lock()
            .map_err(|e| ActionError::Ledger(format!("Lock poisoned: {}", e)))
    }

    /// Record a new proposal. Ids are never reused.
    pub fn insert(&self, action: PendingAction) -> Result<(), ActionError> {
        let mut actions = self.lock()?;
        if actions.contains_key(&action.action_id) {
            return Err(ActionError::Ledger(format!(
                "duplicate action id {}",
                action.action_id
            )));
        }
        actions.insert(action.action_id.clone(), action);
        Ok(())
    }

    pub fn get(&self, action_id: &str) -> Option<PendingAction> {
        self.lock().ok()?.get(action_id).cloned()
    }

    /// All actions, oldest first.
    pub fn list(&self) -> Vec<PendingAction> {
        let mut all: Vec<PendingAction> = self
            .lock()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.action_id.cmp(&b.action_id))
        });
        all
    }

    /// Actions still awaiting confirmation.
    pub fn proposed(&self) -> Vec<PendingAction> {
        self.list()
            .into_iter()
            .filter(|a| a.status == ActionStatus::Proposed)
            .collect()
    }

    /// Guarded step out of `Proposed`.
    ///
    /// - already `Expired` (by an earlier sweep or attempt): `Expired`
    /// - unknown id or any other status than `Proposed`: `Stale`
    /// - at or past `expires_at`: moves to `Expired` and fails with `Expired`
    /// - not approved: moves to `Cancelled`
    /// - approved: moves through `Confirmed` to `Executing`
    pub fn begin_confirmation(
        &self,
        action_id: &str,
        approved: bool,
        now: Timestamp,
    ) -> Result<ConfirmDecision, ActionError> {
        let mut actions = self.lock()?;
        let action = actions
            .get_mut(action_id)
            .ok_or_else(|| ActionError::Stale(action_id.to_string()))?;

        if action.status == ActionStatus::Expired {
            return Err(ActionError::Expired(action_id.to_string()));
        }
        if action.status != ActionStatus::Proposed {
            return Err(ActionError::Stale(action_id.to_string()));
        }

        if action.is_expired_at(now) {
            apply(action, ActionStatus::Expired, now)?;
            info!(action_id, "Confirmation arrived after expiry");
            return Err(ActionError::Expired(action_id.to_string()));
        }

        if !approved {
            apply(action, ActionStatus::Cancelled, now)?;
            info!(action_id, "Action cancelled");
            return Ok(ConfirmDecision::Cancelled(action.clone()));
        }

        apply(action, ActionStatus::Confirmed, now)?;
        apply(action, ActionStatus::Executing, now)?;
        info!(action_id, action_type = %action.action_type, "Action confirmed, executing");
        Ok(ConfirmDecision::Execute(action.clone()))
    }

    /// Settle an `Executing` action with the connector's result.
    pub fn record_outcome(
        &self,
        action_id: &str,
        outcome: Result<String, String>,
        now: Timestamp,
    ) -> Result<PendingAction, ActionError> {
        let mut actions = self.lock()?;
        let action = actions
            .get_mut(action_id)
            .ok_or_else(|| ActionError::Stale(action_id.to_string()))?;

        let (status, text) = match outcome {
            Ok(message) => (ActionStatus::Succeeded, message),
            Err(detail) => (ActionStatus::Failed, detail),
        };
        apply(action, status, now)?;
        action.outcome = Some(text);
        info!(action_id, status = %status, "Action settled");
        Ok(action.clone())
    }

    /// Expire every proposal whose TTL has elapsed. Returns their ids.
    pub fn expire_overdue(&self, now: Timestamp) -> Vec<String> {
        let Ok(mut actions) = self.lock() else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        for action in actions.values_mut() {
            if action.status == ActionStatus::Proposed
                && action.is_expired_at(now)
                && apply(action, ActionStatus::Expired, now).is_ok()
            {
                expired.push(action.action_id.clone());
            }
        }
        expired.sort();
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue proposals");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply(action: &mut PendingAction, to: ActionStatus, at: Timestamp) -> Result<(), ActionError> {
    validate_transition(action.status, to)?;
    action.history.push(Transition {
        from: action.status,
        to,
        at,
    });
    action.status = to;
    Ok(())
}
