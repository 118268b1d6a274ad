//! Request handlers for page rendering.
//!
//! This module provides the HTTP handler that renders a page for every
//! request, plus health and readiness checks.

use std::io;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio::sync::oneshot;
use tracing::{error, info, instrument};

use ssr_engine_common::RenderError;
use ssr_engine_core::{RenderContext, ResponseHandle};

use crate::request::render_request;
use crate::response::PageResponse;
use crate::state::AppState;

/// Render the application for an HTTP request.
///
/// This handler:
/// 1. Converts the request into a render request with a fresh response handle
/// 2. Renders the shell template through the render engine
/// 3. Returns the document with the status and headers the application set
#[instrument(skip_all, fields(method = %req.method(), uri = %req.uri()))]
pub async fn render_page(State(state): State<AppState>, req: Request<Body>) -> impl IntoResponse {
    let start = Instant::now();
    let request = render_request(&req);
    let response = ResponseHandle::new();
    let ctx = RenderContext::with_response(request, response.clone());

    let (tx, rx) = oneshot::channel();
    state
        .render()
        .render(state.template().to_path_buf(), ctx, move |result| {
            let _ = tx.send(result);
        });

    let result = rx
        .await
        .unwrap_or_else(|_| Err(RenderError::invalid_config("Render task ended without a result")));
    let duration = start.elapsed();

    match result {
        Ok(html) => {
            let page = PageResponse::rendered(html, response.snapshot());
            info!(
                status = page.status,
                bytes = page.body.len(),
                duration_ms = duration.as_millis(),
                "Page rendered"
            );
            page.into_axum_response()
        }
        Err(e) => {
            error!(
                error = %e,
                duration_ms = duration.as_millis(),
                "Render failed"
            );
            error_to_response(&e).into_axum_response()
        }
    }
}

/// Convert a `RenderError` to an HTTP response.
fn error_to_response(error: &RenderError) -> PageResponse {
    match error {
        RenderError::RenderTimeout { duration_ms } => {
            PageResponse::error(504, &format!("Render timeout after {duration_ms}ms"))
        }
        RenderError::FuelExhausted => {
            PageResponse::error(429, "Execution limit exceeded: fuel exhausted")
        }
        RenderError::TemplateRead { path, source } if source.kind() == io::ErrorKind::NotFound => {
            PageResponse::error(404, &format!("Template not found: {path}"))
        }
        _ => PageResponse::error(500, "Internal server error"),
    }
}

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// Returns 200 OK with the configured application and the number of cached
/// templates.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let options = state.render().options();
    let body = serde_json::json!({
        "status": "ready",
        "module": options.bootstrap.as_ref().map(|target| target.name()),
        "aot": options.aot,
        "templates_cached": state.render().templates().len(),
    });

    (StatusCode::OK, axum::Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_response_timeout() {
        let err = RenderError::RenderTimeout { duration_ms: 5000 };
        let resp = error_to_response(&err);
        assert_eq!(resp.status, 504);
    }

    #[test]
    fn test_error_to_response_fuel_exhausted() {
        let resp = error_to_response(&RenderError::FuelExhausted);
        assert_eq!(resp.status, 429);
    }

    #[test]
    fn test_error_to_response_template_missing() {
        let err = RenderError::template_read(
            "./index.html",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        let resp = error_to_response(&err);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_error_to_response_unreadable_template() {
        let err = RenderError::template_read(
            "./index.html",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error_to_response(&err).status, 500);
    }

    #[test]
    fn test_error_to_response_hides_details() {
        let err = RenderError::trap("unreachable executed");
        let resp = error_to_response(&err);

        assert_eq!(resp.status, 500);
        assert!(!String::from_utf8_lossy(&resp.body).contains("unreachable"));
    }

    #[tokio::test]
    async fn test_readiness_leaves_guest_deadlines_alone() {
        use std::sync::Arc;

        use ssr_engine_common::{EngineConfig, ExecutionConfig};
        use ssr_engine_core::store::{GuestContext, create_store};
        use ssr_engine_core::{
            CompiledModule, InstanceRunner, PlatformState, RenderRequest, SetupOptions,
            WasmEngine, create_engine,
        };

        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            epoch_interruption: true,
            ..Default::default()
        })
        .unwrap();
        let state = AppState::from_engine(
            create_engine(SetupOptions::default()),
            "index.html",
            Some(engine.clone()),
        );

        let runner = InstanceRunner::new(&engine);
        let module =
            CompiledModule::from_wat(engine.inner(), r#"(module (func (export "render")))"#).unwrap();
        let ctx = GuestContext::new(
            "ready".into(),
            Arc::new(RenderRequest::get("/")),
            Arc::new(PlatformState::default()),
            None,
        );
        let execution = ExecutionConfig {
            timeout_ms: 2,
            ..Default::default()
        };
        let mut store = create_store(&engine, &execution, ctx).unwrap();
        let instance = runner.instantiate("App", &module, &mut store).await.unwrap();

        for _ in 0..5 {
            let response = readiness_check(State(state.clone())).await.into_response();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let result = runner
            .call_entry(instance, &mut store, "render", execution.timeout_ms)
            .await
            .unwrap();
        assert!(result.is_success());
    }
}
