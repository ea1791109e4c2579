//! S3 notification handlers.

use std::future::Future;
use std::sync::Arc;

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::generate_correlation_id;
use crate::error::G8Error;
use crate::handlers::{impl_invocation, invocation_span, report_unhandled};
use crate::telemetry::{start_transaction, Invocation, Transaction};
use crate::Error;

/// Context for one S3 event record.
pub struct S3Context {
    pub lambda: Context,
    pub record: S3EventRecord,
    /// Freshly generated for every record.
    pub correlation_id: String,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl_invocation!(S3Context);

impl S3Context {
    /// Key of the object the record refers to.
    pub fn object_key(&self) -> Option<&str> {
        self.record.s3.object.key.as_deref()
    }

    /// Name of the bucket the record refers to.
    pub fn bucket_name(&self) -> Option<&str> {
        self.record.s3.bucket.name.as_deref()
    }
}

fn event_source(record: &S3EventRecord) -> String {
    record.event_source.clone().unwrap_or_default()
}

/// Wraps a handler called once per S3 record.
///
/// Records are processed in order. The first error is logged as unhandled
/// and fails the invocation; remaining records are skipped.
pub struct S3Handler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> S3Handler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut>(&self, event: LambdaEvent<S3Event>) -> Result<(), Error>
    where
        F: Fn(S3Context) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let LambdaEvent { payload, context } = event;
        let transaction = start_transaction(&self.config, &context);

        for record in payload.records {
            let correlation_id = generate_correlation_id();
            let source = event_source(&record);
            let span = invocation_span!(self.config, correlation_id, s3_event_source = source);

            let c = S3Context {
                lambda: context.clone(),
                record,
                correlation_id: correlation_id.clone(),
                span: span.clone(),
                transaction: transaction.clone(),
            };

            c.add_attribute("functionName", &self.config.function_name);
            c.add_attribute("buildVersion", &self.config.build_version);
            c.add_attribute("correlationID", &correlation_id);
            c.add_attribute("s3EventSource", &source);

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
        F: Fn(S3Context) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        lambda_runtime::run(service_fn(|event| self.handle(event))).await
    }
}

/// Wraps a Step Functions task triggered by an S3 event.
///
/// Only the first record is handled. Its result becomes the task output.
pub struct S3StepHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> S3StepHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut, R>(&self, event: LambdaEvent<S3Event>) -> Result<R, Error>
    where
        F: Fn(S3Context) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let LambdaEvent { payload, context } = event;
        let record = payload
            .records
            .into_iter()
            .next()
            .ok_or(G8Error::EmptyEvent)?;

        let correlation_id = generate_correlation_id();
        let source = event_source(&record);
        let span = invocation_span!(self.config, correlation_id, s3_step_event_source = source);
        let transaction = start_transaction(&self.config, &context);

        let c = S3Context {
            lambda: context,
            record,
            correlation_id: correlation_id.clone(),
            span: span.clone(),
            transaction: transaction.clone(),
        };

        c.add_attribute("functionName", &self.config.function_name);
        c.add_attribute("buildVersion", &self.config.build_version);
        c.add_attribute("correlationID", &correlation_id);
        c.add_attribute("s3StepEventSource", &source);

        let result = (self.handler)(c).instrument(span.clone()).await;
        if let Err(err) = &result {
            report_unhandled(&span, transaction.as_ref(), err);
        }
        result
    }

    /// Run the handler on the Lambda runtime until it shuts down.
    pub async fn run<Fut, R>(self) -> Result<(), Error>
    where
        F: Fn(S3Context) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
        R: Serialize,
    {
        let this = &self;
        lambda_runtime::run(service_fn(move |event: LambdaEvent<S3Event>| async move {
            let output = this.handle(event).await?;
            Ok::<Value, Error>(serde_json::to_value(output)?)
        }))
        .await
    }
}
