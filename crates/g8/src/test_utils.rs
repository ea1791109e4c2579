//! Test utilities for g8 handlers.
//!
//! Available in unit tests and, with the `test-utils` feature, to dependent
//! crates' tests.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use aws_lambda_events::event::apigw::ApiGatewayProxyRequest;
use http::Method;
use lambda_runtime::{Context, LambdaEvent};
use serde_json::Value;
use tracing::subscriber::DefaultGuard;

use crate::error::G8Error;
use crate::telemetry::{AttributeValue, Transaction, TransactionFactory};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Transaction that records every attribute it accepts.
#[derive(Debug, Default)]
pub struct RecordingTransaction {
    attributes: Mutex<Vec<(String, AttributeValue)>>,
    errors: Mutex<Vec<String>>,
    reject: Option<String>,
}

impl RecordingTransaction {
    /// Transaction that refuses attributes named `key`.
    pub fn rejecting(key: impl Into<String>) -> Self {
        Self {
            reject: Some(key.into()),
            ..Self::default()
        }
    }

    /// Recorded attributes, in insertion order.
    pub fn attributes(&self) -> Vec<(String, AttributeValue)> {
        lock(&self.attributes).clone()
    }

    /// Recorded attribute keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.attributes)
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Last value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        lock(&self.attributes)
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Messages of errors reported with `notice_error`.
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }
}

impl Transaction for RecordingTransaction {
    fn add_attribute(&self, key: &str, value: AttributeValue) -> Result<(), G8Error> {
        if self.reject.as_deref() == Some(key) {
            return Err(G8Error::AttributeRejected {
                key: key.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        lock(&self.attributes).push((key.to_string(), value));
        Ok(())
    }

    fn notice_error(&self, err: &(dyn std::error::Error + 'static)) {
        lock(&self.errors).push(err.to_string());
    }
}

/// Factory keeping every transaction it starts.
///
/// Clones share the same list, so a clone can be handed to
/// [`crate::HandlerConfig::with_transactions`] and inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransactions {
    started: Arc<Mutex<Vec<Arc<RecordingTransaction>>>>,
}

impl RecordingTransactions {
    pub fn transactions(&self) -> Vec<Arc<RecordingTransaction>> {
        lock(&self.started).clone()
    }

    /// Most recently started transaction.
    pub fn last(&self) -> Option<Arc<RecordingTransaction>> {
        lock(&self.started).last().cloned()
    }
}

impl TransactionFactory for RecordingTransactions {
    fn start(&self, _context: &Context) -> Arc<dyn Transaction> {
        let transaction = Arc::new(RecordingTransaction::default());
        lock(&self.started).push(transaction.clone());
        transaction
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// JSON log lines captured for the current thread.
///
/// Capturing stops when the value is dropped.
pub struct LogCapture {
    buffer: SharedBuffer,
    _guard: DefaultGuard,
}

impl LogCapture {
    /// Every captured line parsed as JSON.
    pub fn entries(&self) -> Vec<Value> {
        let bytes = lock(&self.buffer.0).clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// First entry with the given message.
    pub fn find(&self, message: &str) -> Option<Value> {
        self.entries()
            .into_iter()
            .find(|entry| entry["message"] == message)
    }

    /// Whether any entry's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|entry| {
            entry["message"]
                .as_str()
                .is_some_and(|message| message.contains(needle))
        })
    }
}

/// Capture logs at every level as flattened JSON with the current span.
///
/// Uses a thread-local default subscriber, so it works with the
/// single-threaded `#[tokio::test]` runtime.
pub fn capture_logs() -> LogCapture {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();

    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();

    LogCapture {
        buffer,
        _guard: tracing::subscriber::set_default(subscriber),
    }
}

/// Lambda context with a fixed request id.
pub fn lambda_context() -> Context {
    let mut context = Context::default();
    context.request_id = "test-request-id".to_string();
    context
}

/// Wrap a payload in a [`LambdaEvent`] with [`lambda_context`].
pub fn lambda_event<T>(payload: T) -> LambdaEvent<T> {
    LambdaEvent::new(payload, lambda_context())
}

/// API Gateway proxy request for `method` and `path`.
pub fn proxy_request(method: &str, path: &str, body: Option<&str>) -> ApiGatewayProxyRequest {
    let mut request = ApiGatewayProxyRequest::default();
    request.http_method = Method::from_bytes(method.as_bytes()).unwrap_or_default();
    request.path = Some(path.to_string());
    request.body = body.map(str::to_string);
    request
}

/// [`proxy_request`] wrapped in a [`LambdaEvent`].
pub fn proxy_event(
    method: &str,
    path: &str,
    body: Option<&str>,
) -> LambdaEvent<ApiGatewayProxyRequest> {
    lambda_event(proxy_request(method, path, body))
}
