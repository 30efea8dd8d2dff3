//! Session/turn manager: the orchestrator's externally callable surface.
//!
//! Each session owns an append-only turn list and an [`ActionLedger`].
//! `submit_message` and `confirm_action` on the same session are serialized
//! by an async gate, so turns land in call-arrival order. A call either
//! appends its user/assistant pair or leaves the turn list untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use gravity_action::{ActionError, ActionLedger, ActionOrchestrator, ActionType, PendingAction};
use gravity_connector::{ConnectorRegistry, EntityRef};
use gravity_core::{Clock, GravityConfig, IdGenerator, Timestamp};
use gravity_vector::{EmbeddingService, VectorStore};

use crate::aggregator::{AggregatorSettings, RetrievalAggregator};
use crate::classifier::IntentClassifier;
use crate::error::ChatError;
use crate::types::{
    AggregationScope, ConfirmResponse, Intent, IntentKind, PendingActionView, Role, SessionSummary,
    SubmitResponse, Turn,
};

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

fn poisoned<E: std::fmt::Display>(e: E) -> ChatError {
    ChatError::SessionLock(e.to_string())
}

struct Session {
    gate: Arc<tokio::sync::Mutex<()>>,
    turns: Mutex<Vec<Turn>>,
    ledger: Arc<ActionLedger>,
    created_at: Timestamp,
}

impl Session {
    fn new(created_at: Timestamp) -> Self {
        Self {
            gate: Arc::new(tokio::sync::Mutex::new(())),
            turns: Mutex::new(Vec::new()),
            ledger: Arc::new(ActionLedger::new()),
            created_at,
        }
    }

    fn turns(&self) -> Result<Vec<Turn>, ChatError> {
        self.turns.lock().map(|t| t.clone()).map_err(poisoned)
    }

    /// Append a user turn and its reply together.
    fn append(&self, user: Turn, assistant: Turn) -> Result<(), ChatError> {
        let mut turns = self.turns.lock().map_err(poisoned)?;
        turns.push(user);
        turns.push(assistant);
        Ok(())
    }
}

/// What the assistant says back, before it becomes a turn.
struct Reply {
    intent: IntentKind,
    text: String,
    sources: Vec<String>,
    pending: Option<PendingActionView>,
}

impl Reply {
    fn clarification(text: String) -> Self {
        Self {
            intent: IntentKind::Clarification,
            text,
            sources: Vec::new(),
            pending: None,
        }
    }
}

pub struct SessionManager {
    classifier: IntentClassifier,
    aggregator: RetrievalAggregator,
    actions: Arc<ActionOrchestrator>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(
        classifier: IntentClassifier,
        aggregator: RetrievalAggregator,
        actions: Arc<ActionOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier,
            aggregator,
            actions,
            clock,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Wire the heuristic classifier, the aggregator and the action
    /// orchestrator from configuration.
    pub fn from_config(
        config: &GravityConfig,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
        registry: Arc<ConnectorRegistry>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let aggregator = RetrievalAggregator::new(
            store,
            embedder,
            config.vector.collection.clone(),
            Arc::clone(&registry),
            Arc::clone(&clock),
            AggregatorSettings::from(&config.retrieval),
        );
        let actions = ActionOrchestrator::new(
            registry,
            Arc::clone(&clock),
            ids,
            config.actions.ttl_secs,
        );
        Self::new(
            IntentClassifier::from_config(&config.classifier),
            aggregator,
            Arc::new(actions),
            clock,
        )
    }

    fn session(&self, session_id: &str) -> Result<Option<Arc<Session>>, ChatError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn session_or_create(&self, session_id: &str) -> Result<Arc<Session>, ChatError> {
        if let Some(session) = self.session(session_id)? {
            return Ok(session);
        }
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, "Session created");
                Arc::new(Session::new(self.clock.now()))
            })
            .clone();
        Ok(session)
    }

    /// Handle one user message: classify, then answer, aggregate, propose
    /// an action or ask for clarification.
    pub async fn submit_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<SubmitResponse, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::MessageTooLong(MAX_MESSAGE_LENGTH));
        }

        let session = self.session_or_create(session_id)?;
        let _gate = session.gate.lock().await;

        let expired = self.actions.expire_overdue(&session.ledger);
        if !expired.is_empty() {
            debug!(session_id, count = expired.len(), "Expired overdue proposals");
        }

        let context = session.turns()?;
        let received_at = self.clock.now();
        let classification = self.classifier.classify(text, &context, received_at).await?;
        let confidence = classification.confidence;
        let entities = classification.entities;

        let reply = match classification.intent {
            Intent::Clarification { question } => Reply::clarification(question),
            Intent::Retrieval { query } => {
                self.answer(IntentKind::Retrieval, &query, &entities, None).await?
            }
            Intent::Aggregation { query, scope } => {
                self.answer(IntentKind::Aggregation, &query, &entities, Some(&scope))
                    .await?
            }
            Intent::Action {
                action_type,
                parameters,
            } => self.propose(&session.ledger, action_type, &parameters)?,
        };

        let user = Turn {
            role: Role::User,
            content: text.to_string(),
            intent: Some(reply.intent),
            confidence: Some(confidence),
            sources: Vec::new(),
            pending_action_ref: None,
            timestamp: received_at,
        };
        let assistant = Turn {
            role: Role::Assistant,
            content: reply.text.clone(),
            intent: Some(reply.intent),
            confidence: Some(confidence),
            sources: reply.sources.clone(),
            pending_action_ref: reply.pending.as_ref().map(|p| p.action_id.clone()),
            timestamp: self.clock.now(),
        };
        session.append(user, assistant)?;

        info!(
            session_id,
            intent = %reply.intent,
            confidence,
            sources = reply.sources.len(),
            "Message handled"
        );
        Ok(SubmitResponse {
            response: reply.text,
            intent: reply.intent,
            confidence,
            sources: reply.sources,
            requires_confirmation: reply.pending.is_some(),
            pending_action: reply.pending,
        })
    }

    async fn answer(
        &self,
        intent: IntentKind,
        query: &str,
        entities: &[EntityRef],
        scope: Option<&AggregationScope>,
    ) -> Result<Reply, ChatError> {
        let answer = self.aggregator.retrieve(query, entities, scope).await?;
        Ok(Reply {
            intent,
            text: answer.response_text,
            sources: answer.sources.iter().map(|c| c.to_string()).collect(),
            pending: None,
        })
    }

    /// Record a proposal. Parameter problems become a clarifying question.
    fn propose(
        &self,
        ledger: &ActionLedger,
        action_type: ActionType,
        parameters: &serde_json::Value,
    ) -> Result<Reply, ChatError> {
        match self.actions.propose(ledger, action_type, parameters) {
            Ok(action) => Ok(Reply {
                intent: IntentKind::Action,
                text: format!(
                    "{}. Please confirm to proceed (expires {}).",
                    action.description, action.expires_at
                ),
                sources: Vec::new(),
                pending: Some(PendingActionView::from(&action)),
            }),
            Err(ActionError::Validation(detail)) => {
                let missing = self.actions.catalog().missing(action_type, parameters);
                let verb = action_type.as_str().replace('_', " ");
                let question = if missing.is_empty() {
                    format!("I can't {} with that: {}. Could you rephrase?", verb, detail)
                } else {
                    format!(
                        "To {} I still need the {}. Could you add it?",
                        verb,
                        missing.join(" and ")
                    )
                };
                Ok(Reply::clarification(question))
            }
            Err(ActionError::NoConnector(_)) => Ok(Reply::clarification(format!(
                "None of the connected systems can {} right now.",
                action_type.as_str().replace('_', " ")
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Approve or decline a pending action.
    ///
    /// Runs on its own task holding the session gate, so a caller that
    /// stops waiting cannot interrupt an execution or lose its turns.
    /// Stale and expired confirmations append nothing.
    pub async fn confirm_action(
        &self,
        session_id: &str,
        action_id: &str,
        approved: bool,
    ) -> Result<ConfirmResponse, ChatError> {
        let Some(session) = self.session(session_id)? else {
            return Err(ActionError::Stale(action_id.to_string()).into());
        };

        let actions = Arc::clone(&self.actions);
        let clock = Arc::clone(&self.clock);
        let id = action_id.to_string();
        let task = tokio::spawn(async move {
            let _gate = Arc::clone(&session.gate).lock_owned().await;
            let requested_at = clock.now();
            let result = actions.confirm(&session.ledger, &id, approved).await;
            let reply = match &result {
                Ok(receipt) => Some(receipt.message.clone()),
                Err(ActionError::Execution { detail, .. }) => {
                    Some(format!("Action failed: {}", detail))
                }
                Err(_) => None,
            };
            let Some(reply) = reply else {
                return result.map_err(ChatError::from);
            };

            let user = Turn {
                role: Role::User,
                content: format!("{} {}", if approved { "Confirmed" } else { "Declined" }, id),
                intent: Some(IntentKind::Action),
                confidence: None,
                sources: Vec::new(),
                pending_action_ref: Some(id.clone()),
                timestamp: requested_at,
            };
            let assistant = Turn {
                role: Role::Assistant,
                content: reply,
                intent: Some(IntentKind::Action),
                confidence: None,
                sources: Vec::new(),
                pending_action_ref: Some(id.clone()),
                timestamp: clock.now(),
            };
            session.append(user, assistant)?;
            result.map_err(ChatError::from)
        });

        let receipt = task.await.map_err(|e| {
            ChatError::Action(ActionError::Execution {
                action_id: action_id.to_string(),
                detail: format!("confirmation task aborted: {}", e),
            })
        })??;

        info!(session_id, action_id, status = %receipt.action.status, "Confirmation handled");
        Ok(ConfirmResponse {
            message: receipt.message,
        })
    }

    /// Turns of a session, oldest first. `None` for unknown sessions.
    pub fn history(&self, session_id: &str) -> Result<Option<Vec<Turn>>, ChatError> {
        match self.session(session_id)? {
            Some(session) => Ok(Some(session.turns()?)),
            None => Ok(None),
        }
    }

    pub fn pending_action(
        &self,
        session_id: &str,
        action_id: &str,
    ) -> Result<Option<PendingAction>, ChatError> {
        Ok(self
            .session(session_id)?
            .and_then(|s| s.ledger.get(action_id)))
    }

    /// Summaries of every session, ordered by id.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        let sessions: Vec<(String, Arc<Session>)> = {
            let map = self.sessions.read().map_err(poisoned)?;
            map.iter().map(|(id, s)| (id.clone(), Arc::clone(s))).collect()
        };

        let mut summaries = Vec::with_capacity(sessions.len());
        for (session_id, session) in sessions {
            let turns = session.turns()?;
            summaries.push(SessionSummary {
                session_id,
                turn_count: turns.len(),
                pending_actions: session.ledger.proposed().len(),
                created_at: session.created_at,
                last_activity: turns.last().map(|t| t.timestamp),
            });
        }
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gravity_action::ActionStatus;
    use gravity_connector::{ChatConnector, TrackerConnector};
    use gravity_core::{ManualClock, SequentialIds};
    use gravity_vector::{DistanceMetric, MemoryVectorStore, MockEmbedding};

    use super::*;

    const NOW: Timestamp = Timestamp(1_700_000_000);

    struct Fixture {
        manager: Arc<SessionManager>,
        tracker: Arc<TrackerConnector>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let config = GravityConfig::default();
        let store = Arc::new(MemoryVectorStore::new());
        store
            .create_collection(&config.vector.collection, 384, DistanceMetric::Cosine)
            .await
            .unwrap();

        let tracker = Arc::new(TrackerConnector::with_demo_data(clock.clone()));
        let mut registry = ConnectorRegistry::with_retry_delay(Duration::from_millis(1));
        registry.register(tracker.clone());
        registry.register(Arc::new(ChatConnector::with_demo_data(clock.clone())));

        let manager = SessionManager::from_config(
            &config,
            store,
            Arc::new(MockEmbedding::new()),
            Arc::new(registry),
            clock.clone(),
            Arc::new(SequentialIds::new()),
        );
        Fixture {
            manager: Arc::new(manager),
            tracker,
            clock,
        }
    }

    #[tokio::test]
    async fn test_ticket_status_question() {
        let f = fixture().await;
        let response = f
            .manager
            .submit_message("s1", "What's the status of PROJ-123?")
            .await
            .unwrap();

        assert_eq!(response.intent, IntentKind::Retrieval);
        assert_eq!(response.sources, vec!["tracker:PROJ-123"]);
        assert!(!response.requires_confirmation);
        assert!(response.pending_action.is_none());
        assert!(response.confidence >= 0.5);
    }

    #[tokio::test]
    async fn test_create_then_confirm() {
        let f = fixture().await;
        let response = f
            .manager
            .submit_message("s1", "Create a ticket for the API timeout issue")
            .await
            .unwrap();

        assert_eq!(response.intent, IntentKind::Action);
        assert!(response.requires_confirmation);
        let pending = response.pending_action.unwrap();
        assert_eq!(pending.action_type, ActionType::CreateTicket);
        assert_eq!(pending.action_id, "act_1");
        assert_eq!(pending.parameters["summary"], "API timeout issue");
        // Nothing happens before confirmation.
        assert!(f.tracker.ticket("PROJ-124").is_none());

        let confirmed = f
            .manager
            .confirm_action("s1", &pending.action_id, true)
            .await
            .unwrap();
        assert!(confirmed.message.contains("PROJ-124"));
        assert!(f.tracker.ticket("PROJ-124").is_some());

        let action = f.manager.pending_action("s1", "act_1").unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Succeeded);

        let turns = f.manager.history("s1").unwrap().unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[1].pending_action_ref.as_deref(), Some("act_1"));
        assert_eq!(turns[3].content, confirmed.message);
    }

    #[tokio::test]
    async fn test_unknown_action_is_stale() {
        let f = fixture().await;
        let err = f.manager.confirm_action("nobody", "act_9", true).await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::Stale(_))));

        f.manager.submit_message("s1", "hmm").await.unwrap();
        let err = f.manager.confirm_action("s1", "act_9", true).await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::Stale(_))));
        assert_eq!(f.manager.history("s1").unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_confirmation_is_stale() {
        let f = fixture().await;
        f.manager.submit_message("s1", "Close PROJ-5").await.unwrap();
        f.manager.confirm_action("s1", "act_1", true).await.unwrap();
        let err = f.manager.confirm_action("s1", "act_1", true).await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::Stale(_))));
    }

    #[tokio::test]
    async fn test_decline_cancels_without_executing() {
        let f = fixture().await;
        let before = f.tracker.ticket_count();
        f.manager
            .submit_message("s1", "Create a ticket for flaky login tests")
            .await
            .unwrap();
        let response = f.manager.confirm_action("s1", "act_1", false).await.unwrap();

        assert!(response.message.starts_with("Cancelled:"));
        assert_eq!(f.tracker.ticket_count(), before);
        let action = f.manager.pending_action("s1", "act_1").unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_expired_confirmation_never_executes() {
        let f = fixture().await;
        f.manager.submit_message("s1", "Close PROJ-5").await.unwrap();
        f.clock.advance_secs(901);

        let err = f.manager.confirm_action("s1", "act_1", true).await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::Expired(_))));
        assert_eq!(f.tracker.ticket("PROJ-5").unwrap().status, "Open");
        assert_eq!(f.manager.history("s1").unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overdue_proposals_expire_on_next_message() {
        let f = fixture().await;
        f.manager.submit_message("s1", "Close PROJ-5").await.unwrap();
        f.clock.advance_secs(1_000);
        f.manager.submit_message("s1", "hmm").await.unwrap();

        let action = f.manager.pending_action("s1", "act_1").unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Expired);

        let err = f.manager.confirm_action("s1", "act_1", true).await.unwrap_err();
        assert!(matches!(err, ChatError::Action(ActionError::Expired(_))));
        assert_eq!(f.tracker.ticket("PROJ-5").unwrap().status, "Open");
        assert_eq!(f.manager.history("s1").unwrap().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_connector_failure_is_surfaced_verbatim() {
        let f = fixture().await;
        f.manager.submit_message("s1", "Close PROJ-1").await.unwrap();
        let err = f.manager.confirm_action("s1", "act_1", true).await.unwrap_err();

        match err {
            ChatError::Action(ActionError::Execution { detail, .. }) => {
                assert_eq!(detail, "PROJ-1 is already closed")
            }
            other => panic!("unexpected error: {}", other),
        }
        let turns = f.manager.history("s1").unwrap().unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[3].content, "Action failed: PROJ-1 is already closed");
        let action = f.manager.pending_action("s1", "act_1").unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_parameters_become_clarification() {
        let f = fixture().await;
        let response = f.manager.submit_message("s1", "Close the ticket").await.unwrap();

        assert_eq!(response.intent, IntentKind::Clarification);
        assert!(!response.requires_confirmation);
        assert!(response.response.contains("ticket"));
        assert!(f.manager.pending_action("s1", "act_1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_low_confidence_asks_for_clarification() {
        let f = fixture().await;
        let response = f.manager.submit_message("s1", "hmm").await.unwrap();
        assert_eq!(response.intent, IntentKind::Clarification);
        assert!(response.sources.is_empty());
        assert!(!response.requires_confirmation);
    }

    #[tokio::test]
    async fn test_follow_up_uses_session_context() {
        let f = fixture().await;
        f.manager
            .submit_message("s1", "What's the status of PROJ-5?")
            .await
            .unwrap();
        let response = f.manager.submit_message("s1", "Close it").await.unwrap();

        assert_eq!(response.intent, IntentKind::Action);
        assert_eq!(response.pending_action.unwrap().parameters["ticket"], "PROJ-5");
    }

    #[tokio::test]
    async fn test_invalid_messages_leave_no_trace() {
        let f = fixture().await;
        assert!(matches!(
            f.manager.submit_message("s1", "   ").await,
            Err(ChatError::EmptyMessage)
        ));
        let long = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            f.manager.submit_message("s1", &long).await,
            Err(ChatError::MessageTooLong(MAX_MESSAGE_LENGTH))
        ));
        assert!(f.manager.history("s1").unwrap().is_none());
        assert!(f.manager.list_sessions().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_messages_keep_turns_paired() {
        let f = fixture().await;
        let mut handles = Vec::new();
        for i in 0..6 {
            let manager = Arc::clone(&f.manager);
            handles.push(tokio::spawn(async move {
                manager
                    .submit_message("shared", &format!("What's the status of PROJ-{}?", i + 1))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let turns = f.manager.history("shared").unwrap().unwrap();
        assert_eq!(turns.len(), 12);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            let key = pair[0].content.trim_start_matches("What's the status of ").trim_end_matches('?');
            assert_eq!(pair[1].sources, vec![format!("tracker:{}", key)]);
        }
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let f = fixture().await;
        f.manager.submit_message("b", "hmm").await.unwrap();
        f.manager.submit_message("a", "Close PROJ-5").await.unwrap();

        let sessions = f.manager.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "a");
        assert_eq!(sessions[0].turn_count, 2);
        assert_eq!(sessions[0].pending_actions, 1);
        assert_eq!(sessions[1].pending_actions, 0);
        assert_eq!(sessions[1].last_activity, Some(NOW));
    }
}
