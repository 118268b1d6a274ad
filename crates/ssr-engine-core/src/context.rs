//! Request-scoped values handed to each application instance.
//!
//! - [`RenderRequest`]: the incoming request, bound under [`REQUEST`](crate::injector::REQUEST)
//! - [`ResponseHandle`]: shared response state, bound under [`RESPONSE`](crate::injector::RESPONSE)
//! - [`InitialConfig`]: shell document and URL, bound under [`INITIAL_CONFIG`](crate::injector::INITIAL_CONFIG)
//! - [`RenderContext`]: what a caller passes to a render invocation

use std::sync::Arc;

use parking_lot::Mutex;

/// The request being rendered.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request URL (path and query)
    pub url: String,
    /// Request headers as key-value pairs
    pub headers: Vec<(String, String)>,
}

impl RenderRequest {
    /// Create a `GET` request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Create a request with no headers.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header to the request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response status and headers an application may adjust while rendering.
#[derive(Debug, Clone)]
pub struct ResponseState {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as key-value pairs.
    pub headers: Vec<(String, String)>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
        }
    }
}

/// Shared handle to the response of a render.
///
/// The caller keeps one clone and passes another in the [`RenderContext`];
/// whatever the application sets is visible to the caller once the render
/// completes.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseHandle {
    /// Create a handle with status 200 and no headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status code.
    pub fn status(&self) -> u16 {
        self.state.lock().status
    }

    /// Set the status code.
    pub fn set_status(&self, status: u16) {
        self.state.lock().status = status;
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut state = self.state.lock();
        match state
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => state.headers.push((name, value)),
        }
    }

    /// Snapshot of the current response state.
    pub fn snapshot(&self) -> ResponseState {
        self.state.lock().clone()
    }
}

/// Initial document state for an application instance.
#[derive(Debug, Clone)]
pub struct InitialConfig {
    /// The shell template the application renders into.
    pub document: Arc<str>,
    /// URL of the request being rendered.
    pub url: String,
}

/// Per-invocation context supplied by the caller.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// The request being rendered.
    pub request: RenderRequest,
    /// Optional response the application may adjust.
    pub response: Option<ResponseHandle>,
}

impl RenderContext {
    /// Context without a response handle.
    pub fn new(request: RenderRequest) -> Self {
        Self {
            request,
            response: None,
        }
    }

    /// Context with a response handle.
    pub fn with_response(request: RenderRequest, response: ResponseHandle) -> Self {
        Self {
            request,
            response: Some(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_headers() {
        let req = RenderRequest::get("/home").with_header("Accept-Language", "de");

        assert_eq!(req.method, "GET");
        assert_eq!(req.header("accept-language"), Some("de"));
        assert!(req.header("cookie").is_none());
    }

    #[test]
    fn test_response_handle_shared() {
        let handle = ResponseHandle::new();
        let clone = handle.clone();

        clone.set_status(404);
        clone.set_header("Cache-Control", "no-store");
        clone.set_header("cache-control", "max-age=60");

        let state = handle.snapshot();
        assert_eq!(state.status, 404);
        assert_eq!(state.headers.len(), 1);
        assert_eq!(state.headers[0].1, "max-age=60");
    }

    #[test]
    fn test_render_context() {
        let ctx = RenderContext::new(RenderRequest::get("/"));
        assert!(ctx.response.is_none());

        let ctx = RenderContext::with_response(RenderRequest::get("/"), ResponseHandle::new());
        assert_eq!(ctx.response.unwrap().status(), 200);
    }
}
