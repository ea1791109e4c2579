//! Serve API Gateway Lambda handlers over plain HTTP.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use aws_lambda_events::encodings::Body as LambdaBody;
use aws_lambda_events::event::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use axum::body::{to_bytes, Body};
use axum::extract::{RawPathParams, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use g8::{
    generate_correlation_id, normalize_error, ApiError, ApiGatewayProxyContext,
    ApiGatewayProxyHandler,
};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use lambda_runtime::{Context, LambdaEvent};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::request::{join_values, ApiGatewayRequestBuilder};

/// Logged once the server is listening.
pub const WELCOME_MESSAGE: &str = "G8 HTTP server is running on port";

const APPLICATION_JSON: &str = "application/json";

/// Largest request body read into a proxy request, same as axum's default limit.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type ProxyFn = dyn Fn(LambdaEvent<ApiGatewayProxyRequest>) -> BoxFuture<Result<ApiGatewayProxyResponse, g8::Error>>
    + Send
    + Sync;

/// Errors raised while building or running the server.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("method {method} of route {path} cannot be served")]
    UnsupportedMethod { method: Method, path: String },

    #[error("route {path} must start with '/'")]
    InvalidPath { path: String },

    #[error("method {method} of route {path} is registered twice")]
    DuplicateRoute { method: Method, path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A Lambda proxy handler bound to an HTTP method and route template.
///
/// Route templates use `{name}` segments, e.g. `/orders/{id}`.
#[derive(Clone)]
pub struct LambdaHandler {
    pub method: Method,
    pub path: String,
    /// Names of the `{name}` segments passed as path parameters.
    pub path_params: Vec<String>,
    handler: Arc<ProxyFn>,
}

impl LambdaHandler {
    /// Bind a raw `LambdaEvent<ApiGatewayProxyRequest>` handler.
    pub fn new<H, Fut>(method: Method, path: impl Into<String>, handler: H) -> Self
    where
        H: Fn(LambdaEvent<ApiGatewayProxyRequest>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiGatewayProxyResponse, g8::Error>> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            handler: Arc::new(move |event: LambdaEvent<ApiGatewayProxyRequest>| {
                Box::pin(handler(event)) as BoxFuture<Result<ApiGatewayProxyResponse, g8::Error>>
            }),
        }
    }

    /// Bind a g8 [`ApiGatewayProxyHandler`].
    pub fn proxy<F, Fut>(
        method: Method,
        path: impl Into<String>,
        handler: ApiGatewayProxyHandler<F>,
    ) -> Self
    where
        F: Fn(ApiGatewayProxyContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiGatewayProxyResponse, g8::Error>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(method, path, move |event| {
            let handler = Arc::clone(&handler);
            async move { handler.handle(event).await }
        })
    }

    pub fn with_path_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Invoke the handler directly.
    pub async fn call(
        &self,
        event: LambdaEvent<ApiGatewayProxyRequest>,
    ) -> Result<ApiGatewayProxyResponse, g8::Error> {
        (self.handler)(event).await
    }
}

fn lambda_context() -> Context {
    let mut context = Context::default();
    context.request_id = generate_correlation_id();
    context
}

/// Run one HTTP request through a Lambda handler.
///
/// `path_params` holds the decoded values captured by the router. Bodies
/// larger than [`MAX_BODY_BYTES`] are rejected as invalid.
///
/// The proxy response is written back as-is, with multi-value headers joined
/// by `,` and `Content-Type` defaulting to `application/json`. Handler errors
/// are logged and answered with their JSON error body.
pub async fn lambda_adapter(
    handler: &LambdaHandler,
    path_params: HashMap<String, String>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, limit = MAX_BODY_BYTES, "failed to read request body");
            return error_response(&ApiError::invalid_body());
        }
    };

    info!(
        method = %parts.method,
        path = %parts.uri.path(),
        path_params = ?handler.path_params,
        "handling request"
    );

    let request = http::Request::from_parts(parts, bytes);
    let proxy_request =
        ApiGatewayRequestBuilder::new(request, &handler.path, &handler.path_params, path_params)
            .request();

    match handler
        .call(LambdaEvent::new(proxy_request, lambda_context()))
        .await
    {
        Ok(response) => into_http_response(response),
        Err(err) => {
            error!(error = %err, "unhandled error");
            let (api_error, _) = normalize_error(&err);
            error_response(&api_error)
        }
    }
}

/// Convert a proxy response into an HTTP response.
fn into_http_response(response: ApiGatewayProxyResponse) -> Response {
    let status = u16::try_from(response.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match response.body {
        Some(LambdaBody::Text(text)) => Body::from(text),
        Some(LambdaBody::Binary(bytes)) => Body::from(bytes),
        _ => Body::empty(),
    };

    let mut http_response = Response::new(body);
    *http_response.status_mut() = status;

    let headers = http_response.headers_mut();
    for (name, value) in &response.headers {
        headers.insert(name.clone(), value.clone());
    }
    for name in response.multi_value_headers.keys() {
        if let Some(value) = join_values(response.multi_value_headers.get_all(name)) {
            headers.insert(name.clone(), value);
        }
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    http_response
}

/// JSON error response for a handler error.
fn error_response(error: &ApiError) -> Response {
    (
        error.status_code(),
        [(CONTENT_TYPE, APPLICATION_JSON)],
        error.to_json(),
    )
        .into_response()
}

/// Build a router serving every endpoint.
///
/// Endpoints sharing a path are merged into one route. Paths must start with
/// `/` and each method may be registered once per path.
pub fn router(endpoints: Vec<LambdaHandler>) -> Result<Router, HttpError> {
    let mut routes: HashMap<String, MethodRouter> = HashMap::new();
    let mut registered: HashSet<(String, Method)> = HashSet::new();

    for endpoint in endpoints {
        if !endpoint.path.starts_with('/') {
            return Err(HttpError::InvalidPath {
                path: endpoint.path.clone(),
            });
        }
        if !registered.insert((endpoint.path.clone(), endpoint.method.clone())) {
            return Err(HttpError::DuplicateRoute {
                method: endpoint.method.clone(),
                path: endpoint.path.clone(),
            });
        }

        let filter = MethodFilter::try_from(endpoint.method.clone()).map_err(|_| {
            HttpError::UnsupportedMethod {
                method: endpoint.method.clone(),
                path: endpoint.path.clone(),
            }
        })?;

        let path = endpoint.path.clone();
        let handler = move |params: RawPathParams, request: Request| {
            let endpoint = endpoint.clone();
            let params: HashMap<String, String> = params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            async move { lambda_adapter(&endpoint, params, request).await }
        };

        let method_router = match routes.remove(&path) {
            Some(existing) => existing.on(filter, handler),
            None => axum::routing::on(filter, handler),
        };
        routes.insert(path, method_router);
    }

    let router = routes
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(&path, method_router)
        });

    Ok(router.layer(TraceLayer::new_for_http()))
}

/// Serve the endpoints on `0.0.0.0:<port>` until the server fails.
pub async fn serve(endpoints: Vec<LambdaHandler>, port: u16) -> Result<(), HttpError> {
    let app = router(endpoints)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = port, "{} {}", WELCOME_MESSAGE, port);

    axum::serve(listener, app).await?;
    Ok(())
}
