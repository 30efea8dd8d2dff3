//! Gravity Chat crate - the conversational front door.
//!
//! Classifies each message, answers it from indexed and live sources with
//! citations, or proposes an action that waits for explicit confirmation.

pub mod aggregator;
pub mod classifier;
pub mod error;
pub mod session;
pub mod synthesizer;
pub mod types;

pub use aggregator::{AggregatorSettings, RetrievalAggregator};
pub use classifier::{HeuristicModel, IntentClassifier, ModelClassifier, ModelVerdict};
pub use error::ChatError;
pub use session::{SessionManager, MAX_MESSAGE_LENGTH};
pub use synthesizer::{Synthesizer, TemplateSynthesizer};
pub use types::{
    AggregationScope, Answer, Citation, Classification, ConfirmResponse, Intent, IntentKind,
    PendingActionView, ResultSource, RetrievalResult, Role, SessionSummary, SourceFailure,
    SubmitResponse, Turn,
};
