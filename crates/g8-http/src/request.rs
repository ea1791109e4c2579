//! Conversion of native HTTP requests into API Gateway proxy requests.

use std::collections::HashMap;

use aws_lambda_events::event::apigw::ApiGatewayProxyRequest;
use aws_lambda_events::query_map::QueryMap;
use axum::body::Bytes;
use http::header::GetAll;
use http::{HeaderMap, HeaderValue, Request};

/// Join every value of a header with `,`.
///
/// Returns `None` when the header has no value.
pub(crate) fn join_values(values: GetAll<'_, HeaderValue>) -> Option<HeaderValue> {
    let mut joined: Vec<u8> = Vec::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            joined.push(b',');
        }
        joined.extend_from_slice(value.as_bytes());
    }

    if joined.is_empty() {
        return None;
    }
    HeaderValue::from_bytes(&joined).ok()
}

/// Builds an [`ApiGatewayProxyRequest`] the way API Gateway would for a
/// request matched against a route template such as `/orders/{id}`.
///
/// Path parameter values come from the router, already percent-decoded.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// use axum::body::Bytes;
/// use g8_http::ApiGatewayRequestBuilder;
///
/// let request = http::Request::builder()
///     .uri("/orders/42?expand=items")
///     .body(Bytes::new())
///     .unwrap();
///
/// let names = vec!["id".to_string()];
/// let matched = HashMap::from([("id".to_string(), "42".to_string())]);
/// let builder = ApiGatewayRequestBuilder::new(request, "/orders/{id}", &names, matched);
/// assert_eq!(builder.path_params()["id"], "42");
/// ```
pub struct ApiGatewayRequestBuilder<'a> {
    request: Request<Bytes>,
    template: &'a str,
    path_params: &'a [String],
    matched: HashMap<String, String>,
}

impl<'a> ApiGatewayRequestBuilder<'a> {
    pub fn new(
        request: Request<Bytes>,
        template: &'a str,
        path_params: &'a [String],
        matched: HashMap<String, String>,
    ) -> Self {
        Self {
            request,
            template,
            path_params,
            matched,
        }
    }

    /// Single-value headers; repeated headers are joined with `,`.
    pub fn headers(&self) -> HeaderMap {
        let source = self.request.headers();
        let mut headers = HeaderMap::with_capacity(source.keys_len());
        for name in source.keys() {
            if let Some(value) = join_values(source.get_all(name)) {
                headers.insert(name.clone(), value);
            }
        }
        headers
    }

    /// Query string as `(single-value, multi-value)` maps.
    ///
    /// In the single-value map, repeated parameters are joined with `,`.
    /// A malformed query string yields empty maps.
    pub fn query_strings(&self) -> (QueryMap, QueryMap) {
        let pairs: Vec<(String, String)> = self
            .request
            .uri()
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();

        let mut multi: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            multi.entry(key).or_default().push(value);
        }

        let single: HashMap<String, Vec<String>> = multi
            .iter()
            .map(|(key, values)| (key.clone(), vec![values.join(",")]))
            .collect();

        (QueryMap::from(single), QueryMap::from(multi))
    }

    /// Values of the declared path parameters.
    ///
    /// Declared names the router did not capture map to an empty string.
    pub fn path_params(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|name| {
                let value = self.matched.get(name).cloned().unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }

    /// Percent-decoded request path.
    ///
    /// A path that does not decode to UTF-8 is kept as received.
    pub fn path(&self) -> String {
        let raw = self.request.uri().path();
        urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    }

    /// Request body as text, empty when it is not valid UTF-8.
    pub fn body(&self) -> String {
        String::from_utf8(self.request.body().to_vec()).unwrap_or_default()
    }

    /// Assemble the proxy request.
    pub fn request(&self) -> ApiGatewayProxyRequest {
        let (query, multi_query) = self.query_strings();

        let mut request = ApiGatewayProxyRequest::default();
        request.resource = Some(self.template.to_string());
        request.path = Some(self.path());
        request.http_method = self.request.method().clone();
        request.headers = self.headers();
        request.multi_value_headers = self.request.headers().clone();
        request.query_string_parameters = query;
        request.multi_value_query_string_parameters = multi_query;
        request.path_parameters = self.path_params();
        request.body = Some(self.body());
        request.request_context.resource_path = Some(self.template.to_string());
        request
    }
}
