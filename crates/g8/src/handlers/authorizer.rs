//! API Gateway custom authorizer (request type) handler.

use std::future::Future;
use std::sync::Arc;

use aws_lambda_events::event::apigw::ApiGatewayCustomAuthorizerRequestTypeRequest;
use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde_json::json;
use tracing::{debug, error, warn, Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::correlation_id_from_headers;
use crate::error::G8Error;
use crate::handlers::{impl_invocation, invocation_span};
use crate::policy::{AuthorizerResponse, MethodArn};
use crate::telemetry::{record_attribute, start_transaction, Transaction};
use crate::Error;

/// Context for one authorizer request.
pub struct ApiGatewayCustomAuthorizerContext {
    pub lambda: Context,
    pub request: ApiGatewayCustomAuthorizerRequestTypeRequest,
    pub correlation_id: String,
    /// Parsed method ARN of the request being authorized.
    pub method_arn: MethodArn,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl_invocation!(ApiGatewayCustomAuthorizerContext);

impl ApiGatewayCustomAuthorizerContext {
    /// Empty response whose statements target the request's API and stage.
    pub fn new_response(&self) -> AuthorizerResponse {
        AuthorizerResponse::new(self.method_arn.clone())
    }

    /// Retrieve a request header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }
}

/// Wraps a handler for API Gateway `REQUEST` authorizers.
///
/// The user handler builds the policy from
/// [`ApiGatewayCustomAuthorizerContext::new_response`]. The wrapper sets the
/// response context to `{"customer-id": <principal id>}`.
pub struct ApiGatewayCustomAuthorizerHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> ApiGatewayCustomAuthorizerHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub async fn handle<Fut>(
        &self,
        event: LambdaEvent<ApiGatewayCustomAuthorizerRequestTypeRequest>,
    ) -> Result<AuthorizerResponse, Error>
    where
        F: Fn(ApiGatewayCustomAuthorizerContext) -> Fut,
        Fut: Future<Output = Result<AuthorizerResponse, Error>>,
    {
        let LambdaEvent { payload, context } = event;

        let raw_arn = match payload.method_arn.as_deref() {
            Some(arn) if !arn.is_empty() => arn,
            _ => return Err(G8Error::MissingMethodArn.into()),
        };
        let method_arn = MethodArn::parse(raw_arn)?;

        let correlation_id = correlation_id_from_headers(&payload.headers);
        let route = payload
            .request_context
            .resource_path
            .clone()
            .unwrap_or_default();
        let span = invocation_span!(self.config, correlation_id, route = route);
        let transaction = start_transaction(&self.config, &context);

        let c = ApiGatewayCustomAuthorizerContext {
            lambda: context,
            request: payload,
            correlation_id: correlation_id.clone(),
            method_arn,
            span: span.clone(),
            transaction: transaction.clone(),
        };

        let mut response = match (self.handler)(c).instrument(span.clone()).await {
            Ok(response) => response,
            Err(err) => {
                span.in_scope(|| error!(error = %err, "Error while calling user-defined function"));
                return Err(err);
            }
        };

        span.in_scope(|| {
            if !response.has_allowing_method() {
                warn!("No method is allowed, no request will pass this authorizer. Check the policy.");
            }
            if response.principal_id.is_empty() {
                warn!("The principal id is not set. Set it with AuthorizerResponse::set_principal_id.");
            }
        });

        response.context = json!({ "customer-id": response.principal_id });

        let tx = transaction.as_ref();
        record_attribute(tx, &span, "functionName", (&self.config.function_name).into());
        record_attribute(tx, &span, "route", route.into());
        record_attribute(tx, &span, "correlationID", correlation_id.into());
        record_attribute(tx, &span, "buildVersion", (&self.config.build_version).into());

        span.in_scope(|| {
            debug!(
                principal_id = %response.principal_id,
                account_aws = %response.method_arn().account_id,
                "G8 Custom Authorizer successful"
            )
        });

        Ok(response)
    }

    /// Run the handler on the Lambda runtime until it shuts down.
    pub async fn run<Fut>(self) -> Result<(), Error>
    where
        F: Fn(ApiGatewayCustomAuthorizerContext) -> Fut,
        Fut: Future<Output = Result<AuthorizerResponse, Error>>,
    {
        lambda_runtime::run(service_fn(|event| self.handle(event))).await
    }
}
