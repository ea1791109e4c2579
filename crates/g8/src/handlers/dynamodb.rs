//! DynamoDB Streams handler.

use std::future::Future;
use std::sync::Arc;

use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use lambda_runtime::{service_fn, Context, LambdaEvent};
use tracing::{Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::generate_correlation_id;
use crate::handlers::{impl_invocation, invocation_span, report_unhandled};
use crate::telemetry::{start_transaction, Invocation, Transaction};
use crate::Error;

/// Context for one stream record.
pub struct DynamoDbContext {
    pub lambda: Context,
    pub record: EventRecord,
    pub correlation_id: String,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl_invocation!(DynamoDbContext);

/// Wraps a handler called once per stream record, in order.
pub struct DynamoDbHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> DynamoDbHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut>(&self, event: LambdaEvent<Event>) -> Result<(), Error>
    where
        F: Fn(DynamoDbContext) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let LambdaEvent { payload, context } = event;
        let transaction = start_transaction(&self.config, &context);

        for record in payload.records {
            let correlation_id = generate_correlation_id();
            let source = record.event_source.clone().unwrap_or_default();
            let span = invocation_span!(self.config, correlation_id, dynamodb_event_source = source);

            let c = DynamoDbContext {
                lambda: context.clone(),
                record,
                correlation_id: correlation_id.clone(),
                span: span.clone(),
                transaction: transaction.clone(),
            };

            c.add_attribute("functionName", &self.config.function_name);
            c.add_attribute("buildVersion", &self.config.build_version);
            c.add_attribute("correlationID", &correlation_id);
            c.add_attribute("dynamodbEventSource", &source);

            if let Err(err) = (self.handler)(c).instrument(span.clone()).await {
                report_unhandled(&span, transaction.as_ref(), &err);
                return Err(err);
            }
        }

        Ok(())
    }

    pub async fn run<Fut>(self) -> Result<(), Error>
    where
        F: Fn(DynamoDbContext) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        lambda_runtime::run(service_fn(|event| self.handle(event))).await
    }
}
