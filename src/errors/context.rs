//! Error context helpers
//!
//! Lets call sites attach the file or operation they were working on
//! without spelling out an `AppError` constructor each time.

use super::types::AppError;
use std::path::PathBuf;

/// Extension trait for adding context to foreign error types
pub trait ErrorContextExt<T> {
    /// Wrap the error with a description of the operation
    fn with_context(self, operation: impl Into<String>) -> Result<T, AppError>;

    /// Wrap the error as a file I/O failure
    fn in_file_operation(
        self,
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
    ) -> Result<T, AppError>;
}

impl<T, E> ErrorContextExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context(self, operation: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| {
            let operation = operation.into();
            AppError::Other {
                message: format!("{}: {}", operation, e),
                source: Some(Box::new(e)),
            }
        })
    }

    fn in_file_operation(
        self,
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
    ) -> Result<T, AppError> {
        self.map_err(|e| AppError::io_with_source(path, operation, e))
    }
}

/// Shorthand for [`ErrorContextExt::with_context`]
#[macro_export]
macro_rules! context {
    ($expr:expr, $context:expr) => {
        $crate::errors::ErrorContextExt::with_context($expr, $context)
    };
}
