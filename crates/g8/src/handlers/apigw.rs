//! API Gateway proxy integration handler.

use std::future::Future;
use std::sync::Arc;

use aws_lambda_events::encodings::Body;
use aws_lambda_events::event::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{Instrument, Span};

use crate::config::HandlerConfig;
use crate::correlation::{correlation_id_from_headers, HEADER_BUILD_VERSION, HEADER_CORRELATION_ID};
use crate::error::{normalize_error, ApiError};
use crate::handlers::{impl_invocation, invocation_span, report_unhandled};
use crate::telemetry::{start_transaction, Invocation, Transaction};
use crate::validate::Validate;
use crate::Error;

const APPLICATION_JSON: &str = "application/json";

/// A cookie sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Context for one API Gateway proxy request.
pub struct ApiGatewayProxyContext {
    /// Lambda invocation context.
    pub lambda: Context,
    /// The proxy request as delivered by API Gateway.
    pub request: ApiGatewayProxyRequest,
    /// Correlation id taken from the `Correlation-Id` header or generated.
    pub correlation_id: String,
    build_version: String,
    span: Span,
    transaction: Option<Arc<dyn Transaction>>,
}

impl_invocation!(ApiGatewayProxyContext);

impl ApiGatewayProxyContext {
    /// Deserialize the JSON request body.
    ///
    /// Any failure, including a missing body, is reported as
    /// [`ApiError::invalid_body`].
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self.request.body.as_deref().unwrap_or_default();
        serde_json::from_str(body).map_err(|e| {
            self.span.in_scope(|| tracing::debug!(error = %e, "failed to bind request body"));
            ApiError::invalid_body().into()
        })
    }

    /// Deserialize the JSON request body and validate it.
    ///
    /// Validation errors are returned unchanged.
    pub fn bind_valid<T: DeserializeOwned + Validate>(&self) -> Result<T, Error> {
        let value: T = self.bind()?;
        value.validate()?;
        Ok(value)
    }

    /// Build a JSON response with the given status.
    pub fn json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        body: &T,
    ) -> Result<ApiGatewayProxyResponse, Error> {
        let body = serde_json::to_string(body)?;
        let mut response = self.empty(status);
        response.body = Some(Body::Text(body));
        Ok(response)
    }

    /// Build a response with no body.
    pub fn empty(&self, status: StatusCode) -> ApiGatewayProxyResponse {
        let mut response = ApiGatewayProxyResponse::default();
        response.status_code = i64::from(status.as_u16());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        insert_correlation_headers(
            &mut response.headers,
            &self.correlation_id,
            &self.build_version,
        );
        response
    }

    /// Retrieve a request header by name (case-insensitive).
    ///
    /// Multi-value headers are searched first; the first value is returned.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .multi_value_headers
            .get_all(name)
            .iter()
            .chain(self.request.headers.get_all(name).iter())
            .find_map(|v| v.to_str().ok())
    }

    /// Retrieve the cookie with the given name.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        parse_cookies(self.header("cookie")?)
            .into_iter()
            .find(|c| c.name == name)
    }
}

fn parse_cookies(raw: &str) -> Vec<Cookie> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.trim().trim_matches('"').to_string(),
            })
        })
        .collect()
}

/// Set `Correlation-Id` and `Build-Version` unless the handler already did.
fn insert_correlation_headers(headers: &mut HeaderMap, correlation_id: &str, build_version: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        headers.entry(HEADER_CORRELATION_ID).or_insert(value);
    }
    if let Ok(value) = HeaderValue::from_str(build_version) {
        headers.entry(HEADER_BUILD_VERSION).or_insert(value);
    }
}

/// JSON response for an error returned by a handler.
pub(crate) fn error_response(error: &ApiError) -> ApiGatewayProxyResponse {
    let mut response = ApiGatewayProxyResponse::default();
    response.status_code = i64::from(error.status_code().as_u16());
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response.body = Some(Body::Text(error.to_json()));
    response
}

/// Wraps a handler for API Gateway proxy events.
///
/// Handler errors never fail the invocation: an [`ApiError`] is returned to
/// the caller as JSON with its status, anything else is logged and answered
/// with `500 INTERNAL_SERVER_ERROR`. Every response carries the
/// `Correlation-Id` and `Build-Version` headers.
pub struct ApiGatewayProxyHandler<F> {
    handler: F,
    config: HandlerConfig,
}

impl<F> ApiGatewayProxyHandler<F> {
    pub fn new(handler: F, config: HandlerConfig) -> Self {
        Self { handler, config }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Handle one proxy request.
    pub async fn handle<Fut>(
        &self,
        event: LambdaEvent<ApiGatewayProxyRequest>,
    ) -> Result<ApiGatewayProxyResponse, Error>
    where
        F: Fn(ApiGatewayProxyContext) -> Fut,
        Fut: Future<Output = Result<ApiGatewayProxyResponse, Error>>,
    {
        let LambdaEvent { payload, context } = event;

        let correlation_id = correlation_id_from_headers(&payload.headers);
        let route = payload
            .request_context
            .resource_path
            .clone()
            .unwrap_or_default();
        let span = invocation_span!(self.config, correlation_id, route = route);
        let transaction = start_transaction(&self.config, &context);

        let c = ApiGatewayProxyContext {
            lambda: context,
            request: payload,
            correlation_id: correlation_id.clone(),
            build_version: self.config.build_version.clone(),
            span: span.clone(),
            transaction: transaction.clone(),
        };

        c.add_attribute("functionName", &self.config.function_name);
        c.add_attribute("route", &route);
        c.add_attribute("correlationID", &correlation_id);
        c.add_attribute("buildVersion", &self.config.build_version);

        let mut response = match (self.handler)(c).instrument(span.clone()).await {
            Ok(response) => response,
            Err(err) => {
                let (api_error, handled) = normalize_error(&err);
                if !handled {
                    report_unhandled(&span, transaction.as_ref(), &err);
                }
                error_response(&api_error)
            }
        };

        insert_correlation_headers(
            &mut response.headers,
            &correlation_id,
            &self.config.build_version,
        );
        Ok(response)
    }

    /// Run the handler on the Lambda runtime until it shuts down.
    pub async fn run<Fut>(self) -> Result<(), Error>
    where
        F: Fn(ApiGatewayProxyContext) -> Fut,
        Fut: Future<Output = Result<ApiGatewayProxyResponse, Error>>,
    {
        lambda_runtime::run(service_fn(|event| self.handle(event))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_logs, proxy_event, RecordingTransactions};
    use crate::AttributeValue;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Order {
        quantity: u32,
    }

    impl Validate for Order {
        fn validate(&self) -> Result<(), Error> {
            if self.quantity == 0 {
                return Err(ApiError::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INVALID_QUANTITY",
                    "Quantity must be positive",
                )
                .into());
            }
            Ok(())
        }
    }

    fn body_text(response: &ApiGatewayProxyResponse) -> &str {
        match &response.body {
            Some(Body::Text(text)) => text,
            _ => "",
        }
    }

    fn header<'a>(response: &'a ApiGatewayProxyResponse, name: &str) -> Option<&'a str> {
        response.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_json_response_with_correlation_headers() {
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                c.json(StatusCode::OK, &json!({ "message": "hello" }))
            },
            HandlerConfig::new("app").with_build_version("1.0.0"),
        );

        let mut event = proxy_event("GET", "/hello", None);
        event
            .payload
            .headers
            .insert("correlation-id", HeaderValue::from_static("abc-123"));

        let response = handler.handle(event).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(body_text(&response), r#"{"message":"hello"}"#);
        assert_eq!(header(&response, "Correlation-Id"), Some("abc-123"));
        assert_eq!(header(&response, "Build-Version"), Some("1.0.0"));
        assert_eq!(header(&response, "Content-Type"), Some(APPLICATION_JSON));
    }

    #[tokio::test]
    async fn test_generated_correlation_id() {
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                assert_eq!(c.correlation_id.len(), 36);
                Ok(c.empty(StatusCode::NO_CONTENT))
            },
            HandlerConfig::default(),
        );

        let response = handler.handle(proxy_event("GET", "/", None)).await.unwrap();

        assert_eq!(response.status_code, 204);
        assert_eq!(header(&response, "Correlation-Id").map(str::len), Some(36));
    }

    #[tokio::test]
    async fn test_handled_error_response() {
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                let order: Order = c.bind_valid()?;
                c.json(StatusCode::CREATED, &json!({ "quantity": order.quantity }))
            },
            HandlerConfig::default(),
        );

        let response = handler
            .handle(proxy_event("POST", "/orders", Some(r#"{"quantity":0}"#)))
            .await
            .unwrap();

        assert_eq!(response.status_code, 422);
        assert_eq!(
            body_text(&response),
            r#"{"code":"INVALID_QUANTITY","detail":"Quantity must be positive"}"#
        );
        assert!(header(&response, "Correlation-Id").is_some());
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                let order: Order = c.bind()?;
                c.json(StatusCode::CREATED, &json!({ "quantity": order.quantity }))
            },
            HandlerConfig::default(),
        );

        let response = handler
            .handle(proxy_event("POST", "/orders", Some("not json")))
            .await
            .unwrap();

        assert_eq!(response.status_code, 400);
        assert_eq!(
            body_text(&response),
            r#"{"code":"INVALID_REQUEST_BODY","detail":"Invalid request body"}"#
        );
    }

    #[tokio::test]
    async fn test_unhandled_error_is_logged_and_hidden() {
        let logs = capture_logs();
        let handler = ApiGatewayProxyHandler::new(
            |_c: ApiGatewayProxyContext| async move {
                Err::<ApiGatewayProxyResponse, Error>("external error".into())
            },
            HandlerConfig::new("app"),
        );

        let response = handler.handle(proxy_event("GET", "/", None)).await.unwrap();

        assert_eq!(response.status_code, 500);
        assert_eq!(
            body_text(&response),
            r#"{"code":"INTERNAL_SERVER_ERROR","detail":"Internal server error"}"#
        );
        assert!(header(&response, "Correlation-Id").is_some());

        let entry = logs.find("Unhandled error").expect("unhandled error logged");
        assert_eq!(entry["error.root"], "external error");
        assert_eq!(entry["span"]["application"], "app");
    }

    #[tokio::test]
    async fn test_records_transaction_attributes() {
        let transactions = RecordingTransactions::default();
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                c.add_attribute("orderCount", 3);
                Ok(c.empty(StatusCode::OK))
            },
            HandlerConfig::new("app")
                .with_function_name("orders")
                .with_build_version("9")
                .with_transactions(transactions.clone()),
        );

        let mut event = proxy_event("GET", "/orders", None);
        event.payload.request_context.resource_path = Some("/orders".to_string());
        handler.handle(event).await.unwrap();

        let tx = transactions.last().expect("transaction started");
        assert_eq!(
            tx.keys(),
            vec![
                "functionName",
                "route",
                "correlationID",
                "buildVersion",
                "orderCount"
            ]
        );
        assert_eq!(
            tx.get("route"),
            Some(AttributeValue::String("/orders".to_string()))
        );
        assert_eq!(tx.get("orderCount"), Some(AttributeValue::Int(3)));
    }

    #[tokio::test]
    async fn test_handler_headers_take_precedence() {
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                let mut response = c.empty(StatusCode::OK);
                response
                    .headers
                    .insert(HEADER_BUILD_VERSION, HeaderValue::from_static("override"));
                Ok(response)
            },
            HandlerConfig::default().with_build_version("1.0.0"),
        );

        let response = handler.handle(proxy_event("GET", "/", None)).await.unwrap();
        assert_eq!(header(&response, "Build-Version"), Some("override"));
    }

    #[tokio::test]
    async fn test_header_and_cookie_lookup() {
        let handler = ApiGatewayProxyHandler::new(
            |c: ApiGatewayProxyContext| async move {
                assert_eq!(c.header("x-tenant"), Some("acme"));
                assert_eq!(c.header("X-TENANT"), Some("acme"));
                assert!(c.header("x-missing").is_none());

                let session = c.cookie("session").expect("session cookie");
                assert_eq!(session.value, "s3cr3t");
                assert!(c.cookie("missing").is_none());
                Ok(c.empty(StatusCode::OK))
            },
            HandlerConfig::default(),
        );

        let mut event = proxy_event("GET", "/", None);
        event
            .payload
            .multi_value_headers
            .append("X-Tenant", HeaderValue::from_static("acme"));
        event.payload.headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; session=\"s3cr3t\""),
        );

        let response = handler.handle(event).await.unwrap();
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_parse_cookies_skips_malformed_pairs() {
        let cookies = parse_cookies("a=1; broken; =2; b = 3 ");
        assert_eq!(
            cookies,
            vec![
                Cookie {
                    name: "a".to_string(),
                    value: "1".to_string()
                },
                Cookie {
                    name: "b".to_string(),
                    value: "3".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_insert_correlation_headers_keeps_existing_values() {
        let mut headers = HeaderMap::new();
        headers.insert("build-version", HeaderValue::from_static("handler"));

        insert_correlation_headers(&mut headers, "corr-1", "1.0.0");

        assert_eq!(headers.get("correlation-id").unwrap(), "corr-1");
        assert_eq!(headers.get(HEADER_BUILD_VERSION).unwrap(), "handler");
        assert_eq!(headers.len(), 2);
    }
}
