//! Handler configuration shared by every event wrapper.

use std::fmt;
use std::sync::Arc;

use crate::telemetry::TransactionFactory;

/// Metadata and integrations shared by all invocations of a handler.
///
/// The string fields are attached to every log line emitted inside an
/// invocation span and to every APM transaction.
#[derive(Clone, Default)]
pub struct HandlerConfig {
    /// Application the function belongs to.
    pub app_name: String,
    /// Lambda function name.
    pub function_name: String,
    /// Deployment environment (e.g. "dev", "prod").
    pub env_name: String,
    /// Build identifier returned in the `Build-Version` header.
    pub build_version: String,
    /// Starts an APM transaction per invocation. `None` disables attributes.
    pub transactions: Option<Arc<dyn TransactionFactory>>,
}

impl HandlerConfig {
    /// Create a configuration for the given application.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `G8_APP_NAME`: application name
    /// - `AWS_LAMBDA_FUNCTION_NAME`: function name (set by the Lambda service)
    /// - `G8_ENV_NAME`: environment name
    /// - `G8_BUILD_VERSION`: build version
    ///
    /// Missing variables become empty strings.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();

        Self {
            app_name: var("G8_APP_NAME"),
            function_name: var("AWS_LAMBDA_FUNCTION_NAME"),
            env_name: var("G8_ENV_NAME"),
            build_version: var("G8_BUILD_VERSION"),
            transactions: None,
        }
    }

    pub fn with_function_name(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = function_name.into();
        self
    }

    pub fn with_env_name(mut self, env_name: impl Into<String>) -> Self {
        self.env_name = env_name.into();
        self
    }

    pub fn with_build_version(mut self, build_version: impl Into<String>) -> Self {
        self.build_version = build_version.into();
        self
    }

    /// Attach an APM transaction factory.
    ///
    /// Every invocation starts one transaction and records the standard
    /// attributes of its event source on it.
    pub fn with_transactions(mut self, factory: impl TransactionFactory + 'static) -> Self {
        self.transactions = Some(Arc::new(factory));
        self
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("app_name", &self.app_name)
            .field("function_name", &self.function_name)
            .field("env_name", &self.env_name)
            .field("build_version", &self.build_version)
            .field("transactions", &self.transactions.is_some())
            .finish()
    }
}
