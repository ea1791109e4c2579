//! Sample greeting API built with g8.
//!
//! The same handlers run on AWS Lambda behind API Gateway and locally through
//! `g8-http`:
//!
//! - `POST /greetings` with `{"name": "..."}` replies `201` with a greeting
//! - `GET /greetings/{name}` replies `200` with a greeting
//! - a `REQUEST` authorizer accepting a single bearer token

use std::env;

use aws_lambda_events::event::apigw::ApiGatewayProxyResponse;
use g8::{
    ApiError, ApiGatewayCustomAuthorizerContext, ApiGatewayProxyContext, ApiGatewayProxyHandler,
    AuthorizerResponse, Error, HandlerConfig, Invocation, Validate,
};
use g8_http::LambdaHandler;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const GREETINGS_PATH: &str = "/greetings";
pub const GREETING_PATH: &str = "/greetings/{name}";

/// Error code for a missing or blank name.
pub const CODE_INVALID_NAME: &str = "INVALID_NAME";

/// Error code for requests no route matches.
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";

/// How the binary runs its handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Lambda,
    Local,
}

/// Which handler a Lambda deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Api,
    Authorizer,
}

/// Demo settings read from the environment.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub mode: Mode,
    pub function: Function,
    pub port: u16,
    /// Bearer token accepted by the authorizer. Empty denies every request.
    pub auth_token: String,
}

impl DemoConfig {
    /// Read settings from the environment.
    ///
    /// - `G8_MODE`: `lambda` or `local`; defaults to `lambda` inside Lambda
    ///   (when `AWS_LAMBDA_RUNTIME_API` is set), `local` otherwise
    /// - `G8_FUNCTION`: `api` (default) or `authorizer`
    /// - `SERVICE_PORT`: local port (default: 8080)
    /// - `G8_AUTH_TOKEN`: bearer token accepted by the authorizer
    pub fn from_env() -> Self {
        let in_lambda = env::var("AWS_LAMBDA_RUNTIME_API").is_ok();
        Self::from_vars(|name| env::var(name).ok(), in_lambda)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>, in_lambda: bool) -> Self {
        let mode = match var("G8_MODE").as_deref() {
            Some("lambda") => Mode::Lambda,
            Some("local") => Mode::Local,
            _ if in_lambda => Mode::Lambda,
            _ => Mode::Local,
        };

        let function = match var("G8_FUNCTION").as_deref() {
            Some("authorizer") => Function::Authorizer,
            _ => Function::Api,
        };

        let port = var("SERVICE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Self {
            mode,
            function,
            port,
            auth_token: var("G8_AUTH_TOKEN").unwrap_or_default(),
        }
    }
}

/// Body of `POST /greetings`.
#[derive(Debug, Deserialize)]
pub struct CreateGreeting {
    #[serde(default)]
    pub name: String,
}

impl Validate for CreateGreeting {
    fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(invalid_name().into());
        }
        Ok(())
    }
}

fn invalid_name() -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        CODE_INVALID_NAME,
        "The 'name' field must not be empty",
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub message: String,
}

impl Greeting {
    pub fn for_name(name: &str) -> Self {
        Self {
            message: format!("Hello, {}!", name.trim()),
        }
    }
}

/// `POST /greetings`
pub async fn create_greeting(c: ApiGatewayProxyContext) -> Result<ApiGatewayProxyResponse, Error> {
    let request: CreateGreeting = c.bind_valid()?;
    c.add_attribute("greetingName", request.name.as_str());

    c.span().in_scope(|| info!(name = %request.name, "greeting created"));
    c.json(StatusCode::CREATED, &Greeting::for_name(&request.name))
}

/// `GET /greetings/{name}`
pub async fn get_greeting(c: ApiGatewayProxyContext) -> Result<ApiGatewayProxyResponse, Error> {
    let name = c
        .request
        .path_parameters
        .get("name")
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(invalid_name)?;

    c.json(StatusCode::OK, &Greeting::for_name(name))
}

/// Dispatch on the matched API Gateway resource.
pub async fn api(c: ApiGatewayProxyContext) -> Result<ApiGatewayProxyResponse, Error> {
    let method = c.request.http_method.clone();
    let resource = c.request.request_context.resource_path.clone();

    match resource.as_deref() {
        Some(GREETINGS_PATH) if method == Method::POST => create_greeting(c).await,
        Some(GREETING_PATH) if method == Method::GET => get_greeting(c).await,
        _ => Err(ApiError::new(StatusCode::NOT_FOUND, CODE_NOT_FOUND, "Route not found").into()),
    }
}

/// Allow every method for `Authorization: Bearer <token>`, deny otherwise.
pub async fn authorize(
    c: ApiGatewayCustomAuthorizerContext,
    token: &str,
) -> Result<AuthorizerResponse, Error> {
    let mut response = c.new_response();

    let presented = c
        .header("authorization")
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(presented) if !token.is_empty() && presented == token => {
            response.set_principal_id("demo-customer");
            response.allow_all_methods();
        }
        _ => {
            response.set_principal_id("anonymous");
            response.deny_all_methods();
        }
    }

    Ok(response)
}

/// Local endpoints serving [`api`].
pub fn endpoints(config: HandlerConfig) -> Vec<LambdaHandler> {
    vec![
        LambdaHandler::proxy(
            Method::POST,
            GREETINGS_PATH,
            ApiGatewayProxyHandler::new(api, config.clone()),
        ),
        LambdaHandler::proxy(
            Method::GET,
            GREETING_PATH,
            ApiGatewayProxyHandler::new(api, config),
        )
        .with_path_params(["name"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lambda_events::event::apigw::ApiGatewayCustomAuthorizerRequestTypeRequest;
    use g8::test_utils::lambda_event;
    use g8::ApiGatewayCustomAuthorizerHandler;
    use http::HeaderValue;
    use std::collections::HashMap;

    const ARN: &str = "arn:aws:execute-api:eu-west-1:123456789012:abc123/prod/GET/greetings";

    // ==================== Config Tests ====================

    fn config_from(vars: &[(&str, &str)], in_lambda: bool) -> DemoConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DemoConfig::from_vars(|name| vars.get(name).cloned(), in_lambda)
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[], false);
        assert_eq!(config.mode, Mode::Local);
        assert_eq!(config.function, Function::Api);
        assert_eq!(config.port, 8080);
        assert!(config.auth_token.is_empty());
    }

    #[test]
    fn test_config_detects_lambda() {
        assert_eq!(config_from(&[], true).mode, Mode::Lambda);
        assert_eq!(config_from(&[("G8_MODE", "local")], true).mode, Mode::Local);
        assert_eq!(config_from(&[("G8_MODE", "lambda")], false).mode, Mode::Lambda);
    }

    #[test]
    fn test_config_overrides() {
        let config = config_from(
            &[
                ("G8_FUNCTION", "authorizer"),
                ("SERVICE_PORT", "9090"),
                ("G8_AUTH_TOKEN", "s3cr3t"),
            ],
            false,
        );
        assert_eq!(config.function, Function::Authorizer);
        assert_eq!(config.port, 9090);
        assert_eq!(config.auth_token, "s3cr3t");

        assert_eq!(config_from(&[("SERVICE_PORT", "nope")], false).port, 8080);
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_rejects_blank_name() {
        let err = CreateGreeting {
            name: "  ".to_string(),
        }
        .validate()
        .unwrap_err();

        let api_error = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_error.code, CODE_INVALID_NAME);
        assert_eq!(api_error.status, 400);
    }

    #[test]
    fn test_greeting_message() {
        assert_eq!(Greeting::for_name(" Ada ").message, "Hello, Ada!");
    }

    // ==================== Authorizer Tests ====================

    fn authorizer_request(authorization: Option<&'static str>) -> ApiGatewayCustomAuthorizerRequestTypeRequest {
        let mut request = ApiGatewayCustomAuthorizerRequestTypeRequest::default();
        request.method_arn = Some(ARN.to_string());
        if let Some(value) = authorization {
            request
                .headers
                .insert("authorization", HeaderValue::from_static(value));
        }
        request
    }

    async fn run_authorizer(token: &str, authorization: Option<&'static str>) -> AuthorizerResponse {
        let token = token.to_string();
        let handler = ApiGatewayCustomAuthorizerHandler::new(
            move |c: ApiGatewayCustomAuthorizerContext| {
                let token = token.clone();
                async move { authorize(c, &token).await }
            },
            HandlerConfig::new("greetings"),
        );

        handler
            .handle(lambda_event(authorizer_request(authorization)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_authorizer_allows_matching_token() {
        let response = run_authorizer("s3cr3t", Some("Bearer s3cr3t")).await;

        assert!(response.has_allowing_method());
        assert_eq!(response.principal_id, "demo-customer");
        assert_eq!(
            response.policy_document.statement[0].resource,
            vec!["arn:aws:execute-api:eu-west-1:123456789012:abc123/prod/*/*"]
        );
    }

    #[tokio::test]
    async fn test_authorizer_denies_wrong_or_missing_token() {
        assert!(!run_authorizer("s3cr3t", Some("Bearer nope")).await.has_allowing_method());
        assert!(!run_authorizer("s3cr3t", None).await.has_allowing_method());
        assert!(!run_authorizer("s3cr3t", Some("s3cr3t")).await.has_allowing_method());
    }

    #[tokio::test]
    async fn test_authorizer_denies_when_token_unset() {
        let response = run_authorizer("", Some("Bearer ")).await;
        assert!(!response.has_allowing_method());
        assert_eq!(response.principal_id, "anonymous");
    }
}
