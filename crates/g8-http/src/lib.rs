//! Local HTTP server for g8 API Gateway handlers.
//!
//! Runs the same handlers that are deployed behind API Gateway on a plain
//! axum server, converting each HTTP request into an
//! `ApiGatewayProxyRequest` and the proxy response back into HTTP. Useful for
//! local development and end-to-end tests.
//!
//! # Example
//!
//! ```no_run
//! use g8::{ApiGatewayProxyContext, ApiGatewayProxyHandler, HandlerConfig};
//! use g8_http::{serve, LambdaHandler};
//! use http::{Method, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = ApiGatewayProxyHandler::new(
//!         |c: ApiGatewayProxyContext| async move {
//!             let id = c.request.path_parameters.get("id").cloned().unwrap_or_default();
//!             c.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//!         },
//!         HandlerConfig::new("orders"),
//!     );
//!
//!     let endpoints = vec![
//!         LambdaHandler::proxy(Method::GET, "/orders/{id}", handler).with_path_params(["id"]),
//!     ];
//!     serve(endpoints, 8080).await?;
//!     Ok(())
//! }
//! ```

mod adapter;
mod request;

pub use adapter::{
    lambda_adapter, router, serve, HttpError, LambdaHandler, MAX_BODY_BYTES, WELCOME_MESSAGE,
};
pub use request::ApiGatewayRequestBuilder;
