//! HTTP request conversion for rendering.
//!
//! Converts incoming axum requests into the [`RenderRequest`] handed to the
//! application instance.

use axum::http::Request;

use ssr_engine_core::RenderRequest;

/// Convert an HTTP request into a render request.
///
/// The URL is the path and query of the request target; the scheme and
/// authority are dropped. Headers whose value is not visible ASCII are
/// skipped.
pub fn render_request<B>(req: &Request<B>) -> RenderRequest {
    let url = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), ToString::to_string);

    req.headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(
            RenderRequest::new(req.method().as_str(), url),
            |request, (name, value)| request.with_header(name, value),
        )
}
