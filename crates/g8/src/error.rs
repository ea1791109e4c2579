//! JSON error responses and library errors.
//!
//! Handlers return boxed errors ([`crate::Error`]). Errors that are an
//! [`ApiError`] are sent to API callers as-is; anything else is logged as an
//! unhandled error and replaced by [`ApiError::internal_server`], so internal
//! details never leak into responses.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::Error;

/// Error code for unexpected failures.
pub const CODE_INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";

/// Error code for request bodies that are not valid JSON for the target type.
pub const CODE_INVALID_REQUEST_BODY: &str = "INVALID_REQUEST_BODY";

/// Error body returned to API Gateway callers.
///
/// Serializes as `{"code": "...", "detail": "..."}`; the status is carried in
/// the response status line rather than the body.
///
/// # Example
///
/// ```
/// use g8::ApiError;
/// use http::StatusCode;
///
/// let err = ApiError::new(StatusCode::BAD_REQUEST, "INVALID_QUERY_PARAM", "Invalid query param");
/// assert_eq!(
///     err.to_string(),
///     "Code: INVALID_QUERY_PARAM; Status: 400; Detail: Invalid query param"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code for this error.
    #[serde(skip, default = "default_status")]
    pub status: u16,

    /// Machine-readable error code.
    pub code: String,

    /// Human-readable explanation.
    pub detail: String,
}

fn default_status() -> u16 {
    StatusCode::INTERNAL_SERVER_ERROR.as_u16()
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            code: code.into(),
            detail: detail.into(),
        }
    }

    /// 500 Internal Server Error, used for every unhandled error.
    pub fn internal_server() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            CODE_INTERNAL_SERVER_ERROR,
            "Internal server error",
        )
    }

    /// 400 Bad Request for bodies that fail to bind.
    pub fn invalid_body() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            CODE_INVALID_REQUEST_BODY,
            "Invalid request body",
        )
    }

    /// Status as an [`http::StatusCode`], falling back to 500 for invalid values.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Serialize the error body.
    pub fn to_json(&self) -> String {
        // Two string fields cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Code: {}; Status: {}; Detail: {}",
            self.code, self.status, self.detail
        )
    }
}

impl StdError for ApiError {}

/// Errors raised by the library itself.
#[derive(Debug, Error)]
pub enum G8Error {
    /// The authorizer event did not carry a method ARN.
    #[error("MethodArn is not set")]
    MissingMethodArn,

    /// The method ARN did not have the `arn:aws:execute-api:...` shape.
    #[error("invalid method ARN: {arn}")]
    InvalidMethodArn { arn: String },

    /// A handler that needs at least one record received none.
    #[error("event contains no records")]
    EmptyEvent,

    /// An APM transaction refused an attribute.
    #[error("transaction rejected attribute '{key}': {reason}")]
    AttributeRejected { key: String, reason: String },

    /// Wrapper for JSON errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convert a handler error into the [`ApiError`] sent to the caller.
///
/// Returns the error and whether it was handled (i.e. already an `ApiError`).
pub fn normalize_error(err: &Error) -> (ApiError, bool) {
    match err.downcast_ref::<ApiError>() {
        Some(api_error) => (api_error.clone(), true),
        None => (ApiError::internal_server(), false),
    }
}

/// Collect the messages of an error and its sources, outermost first.
///
/// The last element is the root cause.
pub fn error_chain(err: &(dyn StdError + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// Log an error that no handler dealt with.
///
/// Emits a single error event with message `Unhandled error`, the root cause
/// and the wrapping context messages.
pub fn log_unhandled_error(err: &(dyn StdError + 'static)) {
    let chain = error_chain(err);
    let root = chain.last().cloned().unwrap_or_default();
    let wrap = &chain[..chain.len().saturating_sub(1)];

    error!(
        error = %err,
        error.root = %root,
        error.wrap = ?wrap,
        "Unhandled error"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("additional context")]
    struct Wrapped {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_QUERY_PARAM",
            "Invalid query param",
        );

        assert_eq!(
            err.to_string(),
            "Code: INVALID_QUERY_PARAM; Status: 400; Detail: Invalid query param"
        );
    }

    #[test]
    fn test_api_error_serialization_omits_status() {
        let json = ApiError::internal_server().to_json();
        assert_eq!(
            json,
            r#"{"code":"INTERNAL_SERVER_ERROR","detail":"Internal server error"}"#
        );
    }

    #[test]
    fn test_invalid_body() {
        let err = ApiError::invalid_body();
        assert_eq!(err.status, 400);
        assert_eq!(err.code, CODE_INVALID_REQUEST_BODY);
    }

    #[test]
    fn test_status_code_fallback() {
        let mut err = ApiError::invalid_body();
        err.status = 42;
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_normalize_api_error() {
        let err: Error = ApiError::invalid_body().into();
        let (api_error, handled) = normalize_error(&err);

        assert!(handled);
        assert_eq!(api_error, ApiError::invalid_body());
    }

    #[test]
    fn test_normalize_other_error() {
        let err: Error = "external error".into();
        let (api_error, handled) = normalize_error(&err);

        assert!(!handled);
        assert_eq!(api_error, ApiError::internal_server());
    }

    #[test]
    fn test_error_chain_root_last() {
        let err = Wrapped {
            source: std::io::Error::new(std::io::ErrorKind::Other, "external error"),
        };

        assert_eq!(error_chain(&err), vec!["additional context", "external error"]);
    }

    #[test]
    fn test_g8_error_messages() {
        assert_eq!(G8Error::MissingMethodArn.to_string(), "MethodArn is not set");
        assert!(G8Error::InvalidMethodArn {
            arn: "nope".to_string()
        }
        .to_string()
        .contains("nope"));
    }
}
