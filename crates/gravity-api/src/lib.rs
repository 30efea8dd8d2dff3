//! Gravity API crate - axum HTTP surface over the session manager.
//!
//! Exposes message submission, action confirmation, turn history and
//! health probes as JSON endpoints.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
