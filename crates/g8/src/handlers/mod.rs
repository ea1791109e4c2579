//! Handler wrappers, one per Lambda event source.
//!
//! Every wrapper follows the same shape:
//!
//! 1. derive a correlation id (from the event when it carries one)
//! 2. open an `invocation` span with the configuration fields, the
//!    correlation id and one event-specific field
//! 3. start an APM transaction and record the standard attributes
//! 4. build the context and run the user handler inside the span
//!
//! Batch events (S3, SQS, DynamoDB) run the handler once per record, in
//! order, and stop at the first error.

mod apigw;
mod authorizer;
mod cloudwatch;
mod dynamodb;
mod s3;
mod sqs;
mod step;

pub use apigw::{ApiGatewayProxyContext, ApiGatewayProxyHandler, Cookie};
pub use authorizer::{ApiGatewayCustomAuthorizerContext, ApiGatewayCustomAuthorizerHandler};
pub use cloudwatch::{CloudWatchContext, CloudWatchHandler};
pub use dynamodb::{DynamoDbContext, DynamoDbHandler};
pub use s3::{S3Context, S3Handler, S3StepHandler};
pub use sqs::{SqsContext, SqsHandler, SqsMessageEnvelope, SqsMessageMeta};
pub use step::{StepContext, StepHandler};

/// Open the per-invocation span.
///
/// Carries the [`crate::HandlerConfig`] fields and the correlation id, plus
/// any event-specific `field = value` pairs (recorded with `Display`).
macro_rules! invocation_span {
    ($config:expr, $correlation_id:expr $(, $field:ident = $value:expr)*) => {{
        let config: &crate::HandlerConfig = &$config;
        tracing::info_span!(
            "invocation",
            application = %config.app_name,
            function_name = %config.function_name,
            env = %config.env_name,
            build_version = %config.build_version,
            correlation_id = %$correlation_id
            $(, $field = %$value)*
        )
    }};
}

pub(crate) use invocation_span;

/// Implement [`crate::Invocation`] for a context with `correlation_id`,
/// `span` and `transaction` fields.
macro_rules! impl_invocation {
    ($($context:ty),+ $(,)?) => {
        $(
            impl crate::telemetry::Invocation for $context {
                fn correlation_id(&self) -> &str {
                    &self.correlation_id
                }

                fn span(&self) -> &tracing::Span {
                    &self.span
                }

                fn transaction(&self) -> Option<&std::sync::Arc<dyn crate::telemetry::Transaction>> {
                    self.transaction.as_ref()
                }
            }
        )+
    };
}

pub(crate) use impl_invocation;

/// Log a handler error as unhandled and report it to the transaction.
pub(crate) fn report_unhandled(
    span: &tracing::Span,
    transaction: Option<&std::sync::Arc<dyn crate::telemetry::Transaction>>,
    err: &crate::Error,
) {
    span.in_scope(|| crate::error::log_unhandled_error(&**err));
    if let Some(transaction) = transaction {
        transaction.notice_error(&**err);
    }
}
