//! Error types for datasource operations.

use thiserror::Error;

/// Result type for datasource operations.
pub type DatasourceResult<T> = Result<T, DatasourceError>;

/// Errors that can occur while talking to a datasource.
#[derive(Debug, Error)]
pub enum DatasourceError {
    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A column alias was not present in the result set.
    #[error("column not found: {column}")]
    ColumnNotFound {
        /// The alias that was looked up.
        column: String,
    },

    /// A column held a value of an unexpected type.
    #[error("type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The column alias.
        column: String,
        /// The expected type.
        expected: &'static str,
        /// The type actually found.
        actual: &'static str,
    },

    /// No connection could be acquired.
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The operation is not valid in the connection's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the misuse.
        message: String,
    },
}

impl DatasourceError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
