//! HTTP handler contracts shared by the environment and the server.
//!
//! Applications register [`HttpHandler`]s on the environment's
//! [`RouteRegistry`] while they run; the server crate serves them from the
//! application connector once the lifecycle container starts.
//!
//! # Example
//!
//! ```rust
//! use http::{Method, StatusCode};
//! use monkey_core::http::{HttpRequest, HttpResponse, RouteRegistry};
//!
//! let routes = RouteRegistry::new();
//! routes.add(Method::GET, "/hello", |_req: HttpRequest| async {
//!     HttpResponse::text(StatusCode::OK, "hello")
//! });
//!
//! assert!(routes.route(&Method::GET, "/hello").is_some());
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use ::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use ::http::{HeaderMap, Method, StatusCode};
use serde::Serialize;

/// Future returned by an [`HttpHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = HttpResponse> + Send>>;

/// A fully buffered HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the raw query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Replaces the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `text/plain` response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .with_body(body.into())
    }

    /// Creates an `application/json` response.
    ///
    /// Falls back to a plain 500 if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .with_body(body),
            Err(error) => {
                tracing::error!(error = %error, "Failed to serialize response body");
                Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    /// Creates a JSON error body of the form `{"error": {"code", "message"}}`.
    pub fn error(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self::json(
            status,
            &serde_json::json!({
                "error": {
                    "code": code,
                    "message": message.into(),
                }
            }),
        )
    }

    /// A JSON 404 response.
    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "NOT_FOUND", "Not Found")
    }

    /// A JSON 405 response.
    pub fn method_not_allowed() -> Self {
        Self::error(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "Method Not Allowed",
        )
    }

    /// Creates the response for a set of constraint violations.
    ///
    /// The status is chosen by [`violation_status`].
    pub fn from_violations(violations: &[ConstraintViolation]) -> Self {
        Self::json(
            violation_status(violations),
            &serde_json::json!({ "errors": violations }),
        )
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Splits into status, headers and body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}

/// Handles one HTTP request.
///
/// Any `Fn(HttpRequest) -> impl Future<Output = HttpResponse>` closure is a
/// handler.
pub trait HttpHandler: Send + Sync {
    /// Handles the request.
    fn call(&self, request: HttpRequest) -> HandlerFuture;
}

impl<F, Fut> HttpHandler for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, request: HttpRequest) -> HandlerFuture {
        Box::pin(self(request))
    }
}

/// Exact-match routing table of application handlers.
#[derive(Default)]
pub struct RouteRegistry {
    routes: DashMap<(Method, String), Arc<dyn HttpHandler>>,
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.routes())
            .finish()
    }
}

impl RouteRegistry {
    /// Creates an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler, replacing any handler for the same method and path.
    pub fn add<H: HttpHandler + 'static>(
        &self,
        method: Method,
        path: impl Into<String>,
        handler: H,
    ) -> &Self {
        let path = path.into();
        tracing::debug!(method = %method, path = %path, "Registered route");
        if self
            .routes
            .insert((method.clone(), path.clone()), Arc::new(handler))
            .is_some()
        {
            tracing::warn!(method = %method, path = %path, "Replaced existing route");
        }
        self
    }

    /// Looks up the handler for a method and path.
    pub fn route(&self, method: &Method, path: &str) -> Option<Arc<dyn HttpHandler>> {
        self.routes
            .get(&(method.clone(), path.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if any method is registered for `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.routes.iter().any(|entry| entry.key().1 == path)
    }

    /// Sorted `"METHOD /path"` descriptions of every route.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self
            .routes
            .iter()
            .map(|entry| format!("{} {}", entry.key().0, entry.key().1))
            .collect();
        routes.sort_unstable();
        routes
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches a request: the matching handler, else 405 when the path
    /// exists under another method, else 404.
    pub fn dispatch(&self, request: HttpRequest) -> HandlerFuture {
        match self.route(request.method(), request.path()) {
            Some(handler) => handler.call(request),
            None if self.has_path(request.path()) => {
                Box::pin(async { HttpResponse::method_not_allowed() })
            }
            None => Box::pin(async { HttpResponse::not_found() }),
        }
    }
}

/// Where a constraint violation was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSource {
    /// A path, query or header parameter.
    Parameter,
    /// The request body.
    Body,
    /// The value a handler returned.
    ReturnValue,
}

/// Status for each source, highest precedence first.
const VIOLATION_STATUS: [(ViolationSource, StatusCode); 3] = [
    (ViolationSource::ReturnValue, StatusCode::INTERNAL_SERVER_ERROR),
    (ViolationSource::Parameter, StatusCode::BAD_REQUEST),
    (ViolationSource::Body, StatusCode::UNPROCESSABLE_ENTITY),
];

impl ViolationSource {
    /// The status for a violation from this source alone.
    pub fn status(self) -> StatusCode {
        VIOLATION_STATUS
            .iter()
            .find(|(source, _)| *source == self)
            .map_or(StatusCode::UNPROCESSABLE_ENTITY, |(_, status)| *status)
    }
}

/// A single failed validation constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintViolation {
    /// Where the violation was found.
    pub source: ViolationSource,
    /// Path to the offending value, e.g. `query.limit` or `body.email`.
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl ConstraintViolation {
    /// Creates a violation.
    pub fn new(
        source: ViolationSource,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            path: path.into(),
            message: message.into(),
        }
    }

    /// A parameter violation.
    pub fn parameter(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ViolationSource::Parameter, path, message)
    }

    /// A request-body violation.
    pub fn body(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ViolationSource::Body, path, message)
    }

    /// A return-value violation.
    pub fn return_value(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ViolationSource::ReturnValue, path, message)
    }
}

/// The response status for a set of violations.
///
/// A return-value violation is a server bug and wins (500); otherwise any
/// parameter violation gives 400; otherwise 422.
pub fn violation_status(violations: &[ConstraintViolation]) -> StatusCode {
    VIOLATION_STATUS
        .iter()
        .find(|(source, _)| violations.iter().any(|v| v.source == *source))
        .map_or(StatusCode::UNPROCESSABLE_ENTITY, |(_, status)| *status)
}
