//! SQS handler and the message envelope used to carry correlation ids.
//!
//! Producers may wrap message payloads in an envelope:
//!
//! ```json
//! {"data": {"order_id": 42}, "meta": {"correlation_id": "abc"}}
//! ```
//!
//! The handler unwraps it so that [`SqsContext::bind`] sees only `data`, and
//! the invocation continues the producer's correlation id.

use std::future::Future;
use std::sync::Arc;

use aws_lambda_events::event::sqs::{SqsEvent, SqsMessage};
use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::or_generate;
use crate::handlers::{impl_invocation, invocation_span, report_unhandled};
use crate::telemetry::{start_transaction, Invocation, Transaction};
use crate::validate::Validate;
use crate::Error;

/// Envelope wrapping an SQS message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqsMessageEnvelope {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: Option<SqsMessageMeta>,
}

/// Metadata carried next to the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqsMessageMeta {
    #[serde(default)]
    pub correlation_id: String,
}

impl SqsMessageEnvelope {
    /// Wrap `data` with a correlation id.
    pub fn new(data: Value, correlation_id: impl Into<String>) -> Self {
        Self {
            data,
            meta: Some(SqsMessageMeta {
                correlation_id: correlation_id.into(),
            }),
        }
    }

    /// Split a raw body into its metadata and the payload to bind.
    ///
    /// Bodies that are not a JSON object with a `meta` member are returned
    /// untouched.
    pub fn unwrap_body(body: &str) -> (Option<SqsMessageMeta>, String) {
        let passthrough = || (None, body.to_string());

        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return passthrough();
        };
        if !value.is_object() {
            return passthrough();
        }
        let Ok(envelope) = serde_json::from_value::<SqsMessageEnvelope>(value) else {
            return passthrough();
        };
        let Some(meta) = envelope.meta else {
            return passthrough();
        };

        match serde_json::to_string(&envelope.data) {
            Ok(data) => (Some(meta), data),
            Err(_) => passthrough(),
        }
    }
}

/// Context for one SQS message.
pub struct SqsContext {
    pub lambda: Context,
    /// The message, with its body replaced by the envelope's `data` when the
    /// body was enveloped.
    pub message: SqsMessage,
    pub correlation_id: String,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl_invocation!(SqsContext);

impl SqsContext {
    /// Deserialize the message body.
    ///
    /// Unlike API Gateway binding, the JSON error is returned as-is.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self.message.body.as_deref().unwrap_or_default();
        Ok(serde_json::from_str(body)?)
    }

    /// Deserialize the message body and validate it.
    pub fn bind_valid<T: DeserializeOwned + Validate>(&self) -> Result<T, Error> {
        let value: T = self.bind()?;
        value.validate()?;
        Ok(value)
    }
}

/// Wraps a handler called once per SQS message.
///
/// Messages are processed in order. The first error is logged as unhandled
/// and fails the invocation; remaining messages are skipped.
pub struct SqsHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> SqsHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut>(&self, event: LambdaEvent<SqsEvent>) -> Result<(), Error>
    where
        F: Fn(SqsContext) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let LambdaEvent { payload, context } = event;
        let transaction = start_transaction(&self.config, &context);

        for mut message in payload.records {
            let (meta, body) =
                SqsMessageEnvelope::unwrap_body(message.body.as_deref().unwrap_or_default());
            if meta.is_some() {
                message.body = Some(body);
            }

            let correlation_id =
                or_generate(meta.as_ref().map(|m| m.correlation_id.as_str()));
            let source = message.event_source.clone().unwrap_or_default();
            let message_id = message.message_id.clone().unwrap_or_default();
            let span = invocation_span!(
                self.config,
                correlation_id,
                sqs_event_source = source,
                sqs_message_id = message_id
            );

            let c = SqsContext {
                lambda: context.clone(),
                message,
                correlation_id: correlation_id.clone(),
                span: span.clone(),
                transaction: transaction.clone(),
            };

            c.add_attribute("functionName", &self.config.function_name);
            c.add_attribute("sqsEventSource", &source);
            c.add_attribute("sqsMessageID", &message_id);
            c.add_attribute("correlationID", &correlation_id);
            c.add_attribute("buildVersion", &self.config.build_version);

            if let Err(err) = (self.handler)(c).instrument(span.clone()).await {
                report_unhandled(&span, transaction.as_ref(), &err);
                return Err(err);
            }
        }

        Ok(())
    }

    /// Run the handler on the Lambda runtime until it shuts down.
    pub async fn run<Fut>(self) -> Result<(), Error>
    where
        F: Fn(SqsContext) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        lambda_runtime::run(service_fn(|event| self.handle(event))).await
    }
}
