//! Greeting API on AWS Lambda or a local HTTP server.
//!
//! # Configuration
//!
//! - `G8_MODE` - `lambda` or `local` (default: `lambda` inside Lambda, `local` otherwise)
//! - `G8_FUNCTION` - handler run on Lambda: `api` (default) or `authorizer`
//! - `G8_AUTH_TOKEN` - bearer token accepted by the authorizer
//! - `SERVICE_PORT` - local HTTP port (default: 8080)
//! - `RUST_LOG` - log level (default: info)
//! - `LOG_FORMAT` - local log format: json (default) or text

use std::sync::Arc;

use g8::{
    init_logging, init_tracing, ApiGatewayCustomAuthorizerContext,
    ApiGatewayCustomAuthorizerHandler, ApiGatewayProxyHandler, Error, HandlerConfig,
    LoggingConfig, TracingTransactions,
};
use g8_demo::{api, authorize, endpoints, DemoConfig, Function, Mode};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let demo = DemoConfig::from_env();
    let config = HandlerConfig::from_env().with_transactions(TracingTransactions);

    match demo.mode {
        Mode::Lambda => {
            init_tracing()?;
            run_lambda(demo, config).await
        }
        Mode::Local => {
            init_logging(&LoggingConfig::from_env().with_service("g8-demo"))?;
            info!(port = demo.port, "starting local server");
            g8_http::serve(endpoints(config), demo.port).await?;
            Ok(())
        }
    }
}

async fn run_lambda(demo: DemoConfig, config: HandlerConfig) -> Result<(), Error> {
    match demo.function {
        Function::Api => ApiGatewayProxyHandler::new(api, config).run().await,
        Function::Authorizer => {
            let token: Arc<str> = demo.auth_token.into();
            ApiGatewayCustomAuthorizerHandler::new(
                move |c: ApiGatewayCustomAuthorizerContext| {
                    let token = Arc::clone(&token);
                    async move { authorize(c, &token).await }
                },
                config,
            )
            .run()
            .await
        }
    }
}
