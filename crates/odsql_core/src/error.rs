//! Error types for request processing.

use crate::response::{ODataResponse, StatusCode};
use odsql_datasource::DatasourceError;
use serde_json::json;
use thiserror::Error;

/// Result type for request processing.
pub type ODataResult<T> = Result<T, ODataError>;

/// Errors that can occur while processing a request.
#[derive(Debug, Error)]
pub enum ODataError {
    /// The request breaks a protocol rule.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An event handler vetoed the operation.
    #[error("{operation} operation on entity: {entity_type} is forbidden")]
    Forbidden {
        /// The vetoed operation.
        operation: &'static str,
        /// Fully-qualified name of the target type.
        entity_type: String,
    },

    /// The addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is valid but not supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The datasource failed.
    #[error("data access error: {0}")]
    DataAccess(#[from] DatasourceError),

    /// A row could not be turned into an entity.
    #[error("materialization error: {0}")]
    Materialization(String),

    /// A component was used in a state it does not support.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// An event handler or interceptor failed.
    #[error("hook error: {0}")]
    Hook(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ODataError {
    /// Creates a forbidden error for an operation on a type.
    pub fn forbidden(operation: &'static str, entity_type: impl Into<String>) -> Self {
        Self::Forbidden {
            operation,
            entity_type: entity_type.into(),
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ODataError::BadRequest(_)
                | ODataError::Forbidden { .. }
                | ODataError::NotFound(_)
                | ODataError::NotImplemented(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ODataError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ODataError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ODataError::NotFound(_) => StatusCode::NOT_FOUND,
            ODataError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders this error as a protocol error response.
    pub fn to_response(&self) -> ODataResponse {
        let body = json!({
            "error": {
                "code": self.status().as_u16().to_string(),
                "message": { "lang": "en", "value": self.to_string() }
            }
        });
        ODataResponse::json(self.status(), &body)
    }
}
