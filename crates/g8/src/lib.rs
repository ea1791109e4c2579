//! Per-invocation contexts for AWS Lambda event handlers.
//!
//! This crate wraps the payloads delivered by the Lambda runtime into small
//! context objects that carry everything a handler needs besides the event:
//!
//! - [`HandlerConfig`]: application, function, environment and build metadata
//! - [`init_tracing`] / [`init_logging`]: JSON-formatted tracing for CloudWatch Logs
//! - [`ApiError`]: JSON error bodies returned to API Gateway callers
//! - [`Transaction`]: APM attributes attached to each invocation
//! - [`AuthorizerResponse`]: IAM policy builder for custom authorizers
//! - One handler wrapper per event source (see [`handlers`])
//!
//! # Example
//!
//! ```no_run
//! use g8::{ApiError, ApiGatewayProxyContext, ApiGatewayProxyHandler, HandlerConfig};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     g8::init_tracing()?;
//!
//!     let handler = ApiGatewayProxyHandler::new(
//!         |c: ApiGatewayProxyContext| async move {
//!             if c.header("authorization").is_none() {
//!                 return Err(ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing token").into());
//!             }
//!             c.json(StatusCode::OK, &serde_json::json!({ "ok": true }))
//!         },
//!         HandlerConfig::from_env(),
//!     );
//!     handler.run().await
//! }
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides a recording transaction factory and
//! log capture helpers. Enable the `test-utils` feature to access it from
//! dependent crates.

mod config;
mod correlation;
mod error;
pub mod handlers;
pub mod logging;
mod policy;
mod telemetry;
mod validate;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::HandlerConfig;
pub use correlation::{
    correlation_id_from_headers, generate_correlation_id, HEADER_BUILD_VERSION,
    HEADER_CORRELATION_ID,
};
pub use error::{error_chain, log_unhandled_error, normalize_error, ApiError, G8Error};
pub use handlers::{
    ApiGatewayCustomAuthorizerContext, ApiGatewayCustomAuthorizerHandler, ApiGatewayProxyContext,
    ApiGatewayProxyHandler, CloudWatchContext, CloudWatchHandler, Cookie, DynamoDbContext,
    DynamoDbHandler, S3Context, S3Handler, S3StepHandler, SqsContext, SqsHandler,
    SqsMessageEnvelope, SqsMessageMeta, StepContext, StepHandler,
};
pub use logging::{init_logging, init_tracing, LogFormat, LoggingConfig};
pub use policy::{
    AuthorizerResponse, Effect, MethodArn, PolicyDocument, PolicyStatement, ALL,
    EXECUTE_API_INVOKE, POLICY_VERSION,
};
pub use telemetry::{
    AttributeValue, Invocation, TracingTransaction, TracingTransactions, Transaction,
    TransactionFactory,
};
pub use validate::Validate;

/// Boxed error type returned by user handlers.
///
/// This is the Lambda runtime's error type, so handler errors can be returned
/// to the runtime without conversion.
pub type Error = lambda_runtime::Error;
