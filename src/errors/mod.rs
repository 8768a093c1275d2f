//! Centralized error handling module
//!
//! Typed errors for every component of the relay. The binary boundary still
//! speaks `anyhow`, so conversions exist in both directions.

pub mod context;
pub mod types;

pub use context::ErrorContextExt;
pub use types::{AppError, AppResult};

/// Convert from anyhow::Error to AppError at the CLI boundary
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Other {
            message: err.to_string(),
            source: None,
        }
    }
}
