//! APM transactions and the attributes recorded on them.
//!
//! A [`TransactionFactory`] configured on [`crate::HandlerConfig`] starts one
//! [`Transaction`] per invocation. Handler wrappers record the standard
//! attributes of their event source, and user code can add its own through
//! [`Invocation::add_attribute`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use lambda_runtime::Context;
use serde::Serialize;
use tracing::{error, info, Span};

use crate::error::G8Error;

/// Value of a transaction attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(v) => f.write_str(v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<&String> for AttributeValue {
    fn from(v: &String) -> Self {
        AttributeValue::String(v.clone())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

/// A single APM transaction covering one invocation.
pub trait Transaction: Send + Sync {
    /// Attach a custom attribute to the transaction.
    fn add_attribute(&self, key: &str, value: AttributeValue) -> Result<(), G8Error>;

    /// Report an error that ended the invocation.
    fn notice_error(&self, _err: &(dyn StdError + 'static)) {}
}

/// Starts a [`Transaction`] for each invocation.
pub trait TransactionFactory: Send + Sync {
    fn start(&self, context: &Context) -> Arc<dyn Transaction>;
}

/// Transaction that reports attributes as `tracing` events.
///
/// Events use the `g8::apm` target so they can be routed or filtered
/// separately, e.g. `RUST_LOG=info,g8::apm=debug`.
#[derive(Debug, Clone)]
pub struct TracingTransaction {
    request_id: String,
}

impl TracingTransaction {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

impl Transaction for TracingTransaction {
    fn add_attribute(&self, key: &str, value: AttributeValue) -> Result<(), G8Error> {
        if key.is_empty() {
            return Err(G8Error::AttributeRejected {
                key: key.to_string(),
                reason: "attribute key is empty".to_string(),
            });
        }

        info!(
            target: "g8::apm",
            request_id = %self.request_id,
            attribute = key,
            value = %value,
            "transaction attribute"
        );
        Ok(())
    }

    fn notice_error(&self, err: &(dyn StdError + 'static)) {
        error!(
            target: "g8::apm",
            request_id = %self.request_id,
            error = %err,
            "transaction error"
        );
    }
}

/// Factory for [`TracingTransaction`]s keyed by the Lambda request id.
#[derive(Debug, Clone, Default)]
pub struct TracingTransactions;

impl TransactionFactory for TracingTransactions {
    fn start(&self, context: &Context) -> Arc<dyn Transaction> {
        Arc::new(TracingTransaction::new(context.request_id.clone()))
    }
}

/// Behaviour shared by every per-invocation context.
pub trait Invocation {
    /// Correlation identifier of this invocation (or record).
    fn correlation_id(&self) -> &str;

    /// Span carrying the invocation's logging fields.
    fn span(&self) -> &Span;

    /// APM transaction, when one is configured.
    fn transaction(&self) -> Option<&Arc<dyn Transaction>>;

    /// Add an attribute to the APM transaction.
    ///
    /// Does nothing without a transaction. Rejected attributes are logged and
    /// otherwise ignored.
    fn add_attribute(&self, key: &str, value: impl Into<AttributeValue>)
    where
        Self: Sized,
    {
        record_attribute(self.transaction(), self.span(), key, value.into());
    }
}

pub(crate) fn record_attribute(
    transaction: Option<&Arc<dyn Transaction>>,
    span: &Span,
    key: &str,
    value: AttributeValue,
) {
    let Some(transaction) = transaction else {
        return;
    };

    if let Err(e) = transaction.add_attribute(key, value) {
        span.in_scope(|| {
            error!(error = %e, "failed to add attr '{}' to transaction", key);
        });
    }
}

/// Start the invocation's transaction from the configured factory.
pub(crate) fn start_transaction(
    config: &crate::HandlerConfig,
    context: &Context,
) -> Option<Arc<dyn Transaction>> {
    config
        .transactions
        .as_ref()
        .map(|factory| factory.start(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingTransaction;

    #[test]
    fn test_attribute_value_conversions() {
        assert_eq!(AttributeValue::from("a"), AttributeValue::String("a".into()));
        assert_eq!(AttributeValue::from(3_i32), AttributeValue::Int(3));
        assert_eq!(AttributeValue::from(1.5), AttributeValue::Float(1.5));
        assert_eq!(AttributeValue::from(true), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::from(7_i64).to_string(), "7");
    }

    #[test]
    fn test_attribute_value_serializes_untagged() {
        let json = serde_json::to_string(&AttributeValue::from("route")).unwrap();
        assert_eq!(json, "\"route\"");
    }

    #[test]
    fn test_tracing_transaction_rejects_empty_key() {
        let tx = TracingTransaction::new("req-1");
        assert!(tx.add_attribute("", "x".into()).is_err());
        assert!(tx.add_attribute("route", "/orders".into()).is_ok());
    }

    #[test]
    fn test_record_attribute_without_transaction_is_noop() {
        record_attribute(None, &Span::none(), "route", "/orders".into());
    }

    #[test]
    fn test_record_attribute_swallows_rejection() {
        let recording = Arc::new(RecordingTransaction::rejecting("route"));
        let tx: Arc<dyn Transaction> = recording.clone();

        record_attribute(Some(&tx), &Span::none(), "route", "/orders".into());
        record_attribute(Some(&tx), &Span::none(), "functionName", "orders".into());

        assert_eq!(recording.keys(), vec!["functionName"]);
    }
}
