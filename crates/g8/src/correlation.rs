//! Correlation identifiers propagated through logs, APM and response headers.

use http::HeaderMap;
use uuid::Uuid;

/// Request/response header carrying the correlation identifier.
pub const HEADER_CORRELATION_ID: &str = "Correlation-Id";

/// Response header carrying the handler's build version.
pub const HEADER_BUILD_VERSION: &str = "Build-Version";

/// Generate a new correlation identifier.
///
/// Identifiers are hyphenated UUID v7 strings (36 characters, time-sortable).
pub fn generate_correlation_id() -> String {
    Uuid::now_v7().to_string()
}

/// Extract the correlation ID from headers or generate a new one.
///
/// Looks for the `Correlation-Id` header (case-insensitive). If not present,
/// empty or invalid UTF-8, generates a new identifier.
pub fn correlation_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(generate_correlation_id)
}

/// Return `id` when non-empty, otherwise a generated identifier.
pub(crate) fn or_generate(id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => generate_correlation_id(),
    }
}
