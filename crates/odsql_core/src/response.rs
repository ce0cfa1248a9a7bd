//! Protocol responses.

use crate::error::{ODataError, ODataResult};
use serde_json::Value;
use std::fmt;

/// An HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 200 OK
    pub const OK: StatusCode = StatusCode(200);
    /// 201 Created
    pub const CREATED: StatusCode = StatusCode(201);
    /// 202 Accepted
    pub const ACCEPTED: StatusCode = StatusCode(202);
    /// 204 No Content
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    /// 400 Bad Request
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// 403 Forbidden
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    /// 404 Not Found
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    /// 501 Not Implemented
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);

    /// Creates a status code from its number.
    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true for 4xx and 5xx.
    pub const fn is_error(self) -> bool {
        self.0 >= 400
    }

    /// Returns the reason phrase of a status line, empty if unknown.
    pub const fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A protocol response: status plus optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct ODataResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl ODataResponse {
    /// Creates a response with a raw body.
    pub fn new(status: StatusCode, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: Some(content_type.into()),
            body,
        }
    }

    /// Creates a JSON response.
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self::new(status, "application/json", body.to_string().into_bytes())
    }

    /// Creates a plain text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain", body.into().into_bytes())
    }

    /// Creates a bodiless response.
    pub fn status_only(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Creates a 204 No Content response.
    pub fn no_content() -> Self {
        Self::status_only(StatusCode::NO_CONTENT)
    }

    /// Returns the status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns true for error-class statuses.
    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Returns the content type, if there is a body.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns true if the body is empty.
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Parses the body as JSON.
    pub fn json_body(&self) -> ODataResult<Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ODataError::Internal(format!("response body is not JSON: {e}")))
    }

    /// Returns the body as UTF-8 text.
    pub fn text_body(&self) -> ODataResult<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| ODataError::Internal(format!("response body is not text: {e}")))
    }
}

/// The response to one batch part.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResponsePart {
    /// Response to a standalone request.
    Response(ODataResponse),
    /// Responses of a changeset: all of them on success, the single failure otherwise.
    ChangeSet(Vec<ODataResponse>),
}

/// The response to a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    /// Identifier used to correlate log lines of this batch.
    pub batch_id: String,
    /// Part responses, positionally matching the request parts.
    pub parts: Vec<BatchResponsePart>,
}

impl BatchResponse {
    /// The status of the batch envelope.
    pub fn status(&self) -> StatusCode {
        StatusCode::ACCEPTED
    }
}
