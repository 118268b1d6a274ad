//! HTTP responses built from render results.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};

use ssr_engine_core::ResponseState;

/// HTTP response assembled from a render.
#[derive(Debug, Clone)]
pub struct PageResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers as key-value pairs
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl PageResponse {
    /// Create an HTML response.
    pub fn html(status: u16, body: String) -> Self {
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: body.into_bytes(),
        }
    }

    /// Create an HTML response carrying the status and headers the
    /// application set while rendering.
    ///
    /// A `content-type` set by the application replaces the default.
    pub fn rendered(html: String, state: ResponseState) -> Self {
        let mut response = Self::html(state.status, html);
        if state
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            response.headers.clear();
        }
        response.headers.extend(state.headers);
        response
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    /// Create an error response with JSON body.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({
            "error": message
        })
        .to_string();
        Self::json(status, &body)
    }

    /// Add a header to the response.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Convert to Axum response.
    ///
    /// Invalid status codes become 500; headers that are not valid HTTP are
    /// dropped.
    pub fn into_axum_response(self) -> Response<Body> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.append(name, value);
            }
        }

        response
    }
}
