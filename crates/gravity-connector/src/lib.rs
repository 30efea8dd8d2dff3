//! Gravity Connector crate - uniform capability surface over live sources.
//!
//! Each external system (issue tracker, chat, source control) implements
//! [`Connector`]. The [`ConnectorRegistry`] routes requests by declared
//! domain and silently retries reads once.

pub mod connector;
pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

pub use connector::Connector;
pub use error::ConnectorError;
pub use memory::{ChatConnector, Faults, SourceControlConnector, TrackerConnector};
pub use registry::ConnectorRegistry;
pub use types::{
    query_terms, ActionOutcome, ConnectorDomain, ConnectorStatus, EntityKind, EntityRef, Record,
    SearchScope,
};
