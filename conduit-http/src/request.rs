//! Request descriptors.

use crate::engine::WireRequest;
use crate::params::{self, ParamSet};
use crate::registry::Fingerprint;
use crate::Result;
use bytes::Bytes;
use http::header::{ACCEPT_LANGUAGE, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::warn;

/// Number of engine submissions a single [`Request`] may make.
pub const MAX_REQUEST_ATTEMPTS: u32 = 3;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// HTTP methods a request can use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }

    /// Whether query parameters go on the URL for this method.
    pub fn params_on_url(&self) -> bool {
        matches!(self, Method::Get | Method::Delete | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
            Method::Head => http::Method::HEAD,
        }
    }
}

type ParseFn<T> = Arc<dyn Fn(&str) -> Result<T> + Send + Sync>;

/// Declarative description of one logical request.
///
/// A request carries three parameter sets:
///
/// - `params`: the query string for GET, DELETE and PUT; the upload body for POST.
/// - `body_params`: the upload body for GET, DELETE and PUT.
/// - `headers`: explicit headers, applied after the defaults.
///
/// HEAD sends neither set. The response body is turned into `T` by the parse
/// function given at construction.
///
/// ```
/// use conduit_http::{Method, Request};
///
/// let request = Request::<serde_json::Value>::json(Method::Get, "https://api.example.com/items")
///     .with_param("page", 2)
///     .with_header("Authorization", "Bearer token");
///
/// assert_eq!(request.final_url(), "https://api.example.com/items?page=2");
/// ```
pub struct Request<T> {
    id: u64,
    url: String,
    method: Method,
    params: ParamSet,
    body_params: ParamSet,
    headers: ParamSet,
    parse: ParseFn<T>,
    attempts: AtomicU32,
}

impl<T> Request<T> {
    /// Create a request with a custom parse function.
    pub fn new<F>(method: Method, url: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            url: url.into(),
            method,
            params: ParamSet::new(),
            body_params: ParamSet::new(),
            headers: ParamSet::new(),
            parse: Arc::new(parse),
            attempts: AtomicU32::new(0),
        }
    }

    /// Create a GET request.
    pub fn get<F>(url: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Method::Get, url, parse)
    }

    /// Create a POST request.
    pub fn post<F>(url: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Method::Post, url, parse)
    }

    /// Create a PUT request.
    pub fn put<F>(url: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Method::Put, url, parse)
    }

    /// Create a DELETE request.
    pub fn delete<F>(url: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Method::Delete, url, parse)
    }

    /// Create a HEAD request.
    pub fn head<F>(url: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Method::Head, url, parse)
    }

    /// Change the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a query (or POST body) parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.put(key, value);
        self
    }

    /// Add a body parameter.
    pub fn with_body_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body_params.put(key, value);
        self
    }

    /// Add an explicit header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.put(name, value);
        self
    }

    /// Process-unique request id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Target URL without query parameters.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Query (or POST body) parameters.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Mutable query parameters.
    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Body parameters.
    pub fn body_params(&self) -> &ParamSet {
        &self.body_params
    }

    /// Mutable body parameters.
    pub fn body_params_mut(&mut self) -> &mut ParamSet {
        &mut self.body_params
    }

    /// Explicit headers.
    pub fn headers(&self) -> &ParamSet {
        &self.headers
    }

    /// Mutable explicit headers.
    pub fn headers_mut(&mut self) -> &mut ParamSet {
        &mut self.headers
    }

    /// Engine submissions made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether all [`MAX_REQUEST_ATTEMPTS`] have been used.
    pub fn is_exhausted(&self) -> bool {
        self.attempts() >= MAX_REQUEST_ATTEMPTS
    }

    /// Record one engine submission and return the attempt number.
    pub(crate) fn begin_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Identity used for deduplication.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(
            &self.url,
            &self.params.serialize(),
            &self.body_params.serialize(),
        )
    }

    /// Run the parse function on a response body.
    pub fn parse(&self, body: &str) -> Result<T> {
        (self.parse)(body)
    }

    /// URL with the query string appended when the method carries one.
    pub fn final_url(&self) -> String {
        if self.method.params_on_url() && !self.params.is_empty() {
            format!("{}?{}", self.url, self.params)
        } else {
            self.url.clone()
        }
    }

    /// The payload-bearing parameter set for this method.
    fn payload(&self) -> Option<&ParamSet> {
        match self.method {
            Method::Post => Some(&self.params),
            Method::Get | Method::Delete | Method::Put => Some(&self.body_params),
            Method::Head => None,
        }
    }

    /// Build the wire form of this request.
    ///
    /// Explicit headers override the `Content-Type` and `Accept-Language`
    /// defaults. Headers with invalid names or values are skipped.
    pub fn to_wire(&self, accept_language: &str) -> WireRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match HeaderValue::from_str(accept_language) {
            Ok(value) => {
                headers.insert(ACCEPT_LANGUAGE, value);
            }
            Err(_) => warn!(
                request_id = self.id,
                accept_language, "Skipping invalid Accept-Language"
            ),
        }

        for (name, value) in self.headers.iter() {
            let text = params::scalar_text(value);
            match (
                HeaderName::try_from(name),
                HeaderValue::try_from(text.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(request_id = self.id, header = name, "Skipping invalid header"),
            }
        }

        let body = self
            .payload()
            .filter(|payload| !payload.is_empty())
            .map(|payload| Bytes::from(payload.to_bytes()));

        WireRequest {
            method: self.method.into(),
            url: self.final_url(),
            headers,
            body,
        }
    }
}

impl<T: DeserializeOwned> Request<T> {
    /// Create a request whose body is deserialized from JSON.
    pub fn json(method: Method, url: impl Into<String>) -> Self {
        Self::new(method, url, |body| Ok(serde_json::from_str(body)?))
    }
}

impl Request<String> {
    /// Create a request that returns the body text unchanged.
    pub fn text(method: Method, url: impl Into<String>) -> Self {
        Self::new(method, url, |body| Ok(body.to_string()))
    }
}

impl<T> fmt::Display for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.url, self.params)
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("body_params", &self.body_params)
            .field("headers", &self.headers)
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(method: Method) -> Request<String> {
        Request::text(method, "https://api.example.com/items")
    }

    #[test]
    fn test_get_puts_params_on_url_and_body_params_in_payload() {
        let request = text(Method::Get)
            .with_param("page", 2)
            .with_param("q", "a b")
            .with_body_param("filter", "new");

        let wire = request.to_wire("en-US");
        assert_eq!(wire.method, http::Method::GET);
        assert_eq!(wire.url, "https://api.example.com/items?page=2&q=a+b");
        assert_eq!(wire.body.as_deref(), Some(&b"filter=new"[..]));
    }

    #[test]
    fn test_post_sends_params_as_payload() {
        let mut request = text(Method::Post).with_body_param("ignored", 1);
        request.params_mut().set_json(true);
        request.params_mut().put("name", "widget");

        let wire = request.to_wire("en-US");
        assert_eq!(wire.url, "https://api.example.com/items");
        assert_eq!(wire.body.as_deref(), Some(&br#"{"name":"widget"}"#[..]));
    }

    #[test]
    fn test_empty_payload_is_not_attached() {
        let wire = text(Method::Put).with_param("id", 7).to_wire("en-US");
        assert_eq!(wire.url, "https://api.example.com/items?id=7");
        assert!(wire.body.is_none());
    }

    #[test]
    fn test_head_sends_neither_set() {
        let wire = text(Method::Head)
            .with_param("a", 1)
            .with_body_param("b", 2)
            .to_wire("en-US");
        assert_eq!(wire.url, "https://api.example.com/items");
        assert!(wire.body.is_none());
    }

    #[test]
    fn test_default_headers_and_overrides() {
        let wire = text(Method::Get).to_wire("ru-RU");
        assert_eq!(wire.header("content-type"), Some("application/json"));
        assert_eq!(wire.header("accept-language"), Some("ru-RU"));

        let wire = text(Method::Get)
            .with_header("Content-Type", "text/plain")
            .with_header("X-Retry", 1)
            .with_header("bad header", "x")
            .to_wire("ru-RU");
        assert_eq!(wire.header("content-type"), Some("text/plain"));
        assert_eq!(wire.header("x-retry"), Some("1"));
        assert_eq!(wire.headers.len(), 3);
    }

    #[test]
    fn test_fingerprint_excludes_headers() {
        let a = text(Method::Get).with_param("q", "x").with_header("X-A", "1");
        let b = text(Method::Get).with_param("q", "x").with_header("X-B", "2");
        let c = text(Method::Get).with_param("q", "y");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let first = text(Method::Get);
        let second = text(Method::Get);
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_attempts() {
        let request = text(Method::Get);
        assert_eq!(request.attempts(), 0);
        for expected in 1..=MAX_REQUEST_ATTEMPTS {
            assert!(!request.is_exhausted());
            assert_eq!(request.begin_attempt(), expected);
        }
        assert!(request.is_exhausted());
    }

    #[test]
    fn test_json_parse() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Item {
            id: u32,
        }

        let request = Request::<Item>::json(Method::Get, "https://api.example.com/items/1");
        assert_eq!(request.parse(r#"{"id":1}"#).unwrap(), Item { id: 1 });
        assert!(request.parse("oops").unwrap_err().is_parse());
    }

    #[test]
    fn test_display() {
        let request = text(Method::Get).with_param("a", 1);
        assert_eq!(request.to_string(), "https://api.example.com/items a=1");
    }
}
