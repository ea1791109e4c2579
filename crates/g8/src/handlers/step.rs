//! Step Functions task handler.

use std::future::Future;
use std::sync::Arc;

use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::generate_correlation_id;
use crate::handlers::{invocation_span, report_unhandled};
use crate::telemetry::{start_transaction, Invocation, Transaction};
use crate::Error;

const STEP_FUNCTION_EVENT: &str = "step_function_event";

/// Context for one Step Functions task, carrying the state input `I`.
pub struct StepContext<I> {
    pub lambda: Context,
    pub event: I,
    pub correlation_id: String,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl<I> Invocation for StepContext<I> {
    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn span(&self) -> &Span {
        &self.span
    }

    fn transaction(&self) -> Option<&Arc<dyn Transaction>> {
        self.transaction.as_ref()
    }
}

/// Wraps a Step Functions task: state input in, state output out.
pub struct StepHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> StepHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut, I, O>(&self, event: LambdaEvent<I>) -> Result<O, Error>
    where
        F: Fn(StepContext<I>) -> Fut,
        Fut: Future<Output = Result<O, Error>>,
    {
        let LambdaEvent { payload, context } = event;

        let correlation_id = generate_correlation_id();
        let span = invocation_span!(self.config, correlation_id, event_source = STEP_FUNCTION_EVENT);
        let transaction = start_transaction(&self.config, &context);

        let c = StepContext {
            lambda: context,
            event: payload,
            correlation_id: correlation_id.clone(),
            span: span.clone(),
            transaction: transaction.clone(),
        };

        c.add_attribute("functionName", &self.config.function_name);
        c.add_attribute("buildVersion", &self.config.build_version);
        c.add_attribute("correlationID", &correlation_id);
        c.add_attribute("eventSource", STEP_FUNCTION_EVENT);

        let result = (self.handler)(c).instrument(span.clone()).await;
        if let Err(err) = &result {
            report_unhandled(&span, transaction.as_ref(), err);
        }
        result
    }

    /// Run the handler on the Lambda runtime until it shuts down.
    ///
    /// The state input is deserialized into `I`; a mismatch fails the
    /// invocation before the handler is called.
    pub async fn run<Fut, I, O>(self) -> Result<(), Error>
    where
        F: Fn(StepContext<I>) -> Fut,
        Fut: Future<Output = Result<O, Error>>,
        I: DeserializeOwned,
        O: Serialize,
    {
        let this = &self;
        lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
            let LambdaEvent { payload, context } = event;
            let input: I = serde_json::from_value(payload)?;
            let output = this.handle(LambdaEvent::new(input, context)).await?;
            Ok::<Value, Error>(serde_json::to_value(output)?)
        }))
        .await
    }
}
