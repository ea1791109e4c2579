//! CloudWatch Events / EventBridge handler, including scheduled rules.

use std::future::Future;
use std::sync::Arc;

use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::generate_correlation_id;
use crate::handlers::{impl_invocation, invocation_span, report_unhandled};
use crate::telemetry::{start_transaction, Invocation, Transaction};
use crate::Error;

pub struct CloudWatchContext {
    pub lambda: Context,
    pub event: CloudWatchEvent,
    pub correlation_id: String,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl_invocation!(CloudWatchContext);

/// Wraps a handler for CloudWatch events.
///
/// The first entry of the event's `resources` (e.g. the ARN of the rule that
/// fired) is recorded on the span and the transaction.
pub struct CloudWatchHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> CloudWatchHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut, R>(&self, event: LambdaEvent<CloudWatchEvent>) -> Result<R, Error>
    where
        F: Fn(CloudWatchContext) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let LambdaEvent { payload, context } = event;

        let correlation_id = generate_correlation_id();
        let resource = payload.resources.first().cloned().unwrap_or_default();
        let span = invocation_span!(self.config, correlation_id, cloud_watch_resource = resource);
        let transaction = start_transaction(&self.config, &context);

        let c = CloudWatchContext {
            lambda: context,
            event: payload,
            correlation_id: correlation_id.clone(),
            span: span.clone(),
            transaction: transaction.clone(),
        };

        c.add_attribute("functionName", &self.config.function_name);
        c.add_attribute("buildVersion", &self.config.build_version);
        c.add_attribute("correlationID", &correlation_id);
        c.add_attribute("cloudWatchResource", &resource);

        let result = (self.handler)(c).instrument(span.clone()).await;
        if let Err(err) = &result {
            report_unhandled(&span, transaction.as_ref(), err);
        }
        result
    }

    pub async fn run<Fut, R>(self) -> Result<(), Error>
    where
        F: Fn(CloudWatchContext) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
        R: Serialize,
    {
        let this = &self;
        lambda_runtime::run(service_fn(
            move |event: LambdaEvent<CloudWatchEvent>| async move {
                let output = this.handle(event).await?;
                Ok::<Value, Error>(serde_json::to_value(output)?)
            },
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_logs, lambda_event, RecordingTransactions};
    use serde_json::json;

    const RULE: &str = "arn:aws:events:us-east-1:123456789012:rule/MyScheduledRule";

    fn event_with_resources(resources: &[&str]) -> CloudWatchEvent {
        serde_json::from_value(json!({
            "version": "0",
            "id": "53dc4d37-cffa-4f76-80c9-8b7d4a4d2eaa",
            "detail-type": "Scheduled Event",
            "source": "aws.events",
            "account": "123456789012",
            "time": "2015-10-08T16:53:06Z",
            "region": "us-east-1",
            "resources": resources,
            "detail": {}
        }))
        .unwrap()
    }

    fn scheduled_event() -> CloudWatchEvent {
        event_with_resources(&[RULE])
    }

    #[tokio::test]
    async fn test_scheduled_event() {
        let handler = CloudWatchHandler::new(
            |c: CloudWatchContext| async move {
                assert_eq!(c.event.resources, vec![RULE]);
                assert_eq!(c.correlation_id.len(), 36);
                Ok(json!({ "processed": true }))
            },
            HandlerConfig::default(),
        );

        let output = handler.handle(lambda_event(scheduled_event())).await.unwrap();
        assert_eq!(output, json!({ "processed": true }));
    }

    #[tokio::test]
    async fn test_handler_error_is_logged_and_returned() {
        let logs = capture_logs();
        let handler = CloudWatchHandler::new(
            |_c: CloudWatchContext| async move { Err::<(), Error>("external error".into()) },
            HandlerConfig::default(),
        );

        let err = handler
            .handle(lambda_event(scheduled_event()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "external error");
        let entry = logs.find("Unhandled error").unwrap();
        assert_eq!(entry["span"]["cloud_watch_resource"], RULE);
    }

    #[tokio::test]
    async fn test_event_without_resources() {
        let transactions = RecordingTransactions::default();
        let handler = CloudWatchHandler::new(
            |_c: CloudWatchContext| async move { Ok::<(), Error>(()) },
            HandlerConfig::default().with_transactions(transactions.clone()),
        );

        handler
            .handle(lambda_event(event_with_resources(&[])))
            .await
            .unwrap();

        let tx = transactions.last().unwrap();
        assert_eq!(tx.get("cloudWatchResource"), Some("".into()));
        assert_eq!(
            tx.keys(),
            vec![
                "functionName",
                "buildVersion",
                "correlationID",
                "cloudWatchResource"
            ]
        );
    }
}
