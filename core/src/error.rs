//! Error types for the portfolio API client.
//!
//! # Design
//! `NotFound` and `Unauthorized` get dedicated variants because callers
//! branch on them (a missing entity, an expired session). All other non-2xx
//! responses land in `HttpError` with the status code and the server's
//! message. The type is `Clone` so one in-flight fetch can hand the same
//! outcome to every reader waiting on it.

use std::fmt;

use thiserror::Error;

/// A single rejected field from client-side validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors returned by the client, the transport and the query cache.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned 401; the stored token is missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The server returned a non-2xx status other than 401 and 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The server answered 2xx but flagged the envelope as unsuccessful.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The request never produced a response (connection, DNS, timeout).
    #[error("transport failed: {0}")]
    Transport(String),

    /// Reading or writing the session store failed.
    #[error("session storage failed: {0}")]
    Storage(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The payload failed client-side validation and was not sent.
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// The fetch was cancelled before it could commit and nothing was cached.
    #[error("query cancelled")]
    Cancelled,
}

impl ApiError {
    /// Whether the query layer should try the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::HttpError { .. })
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ApiError::Transport("refused".into()).is_retryable());
        assert!(ApiError::HttpError {
            status: 500,
            body: String::new()
        }
        .is_retryable());
        assert!(!ApiError::NotFound.is_retryable());
        assert!(!ApiError::Unauthorized.is_retryable());
        assert!(!ApiError::Validation(Vec::new()).is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = ApiError::Validation(vec![
            FieldError::new("title", "Title is required"),
            FieldError::new("content_markdown", "Content is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: title: Title is required, content_markdown: Content is required"
        );
    }
}
