pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::GravityConfig;
pub use error::{GravityError, Result};
pub use types::*;
