//! HTTP router configuration.
//!
//! This module provides functions to build the Axum router with all
//! necessary routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{health_check, readiness_check, render_page};
use crate::state::AppState;

/// Build the main application router.
///
/// Routes:
/// - `GET /health` - Health check
/// - `GET /ready` - Readiness check
/// - anything else - Render the application for the request URL
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .fallback(render_page)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use ssr_engine_common::{EngineConfig, ExecutionConfig};
    use ssr_engine_core::{
        BootstrapTarget, ModuleSource, SetupOptions, WasmEngine, WasmSourceModule, create_engine,
    };
    use ssr_engine_host::create_instance_runner;
    use tempfile::NamedTempFile;
    use tower::util::ServiceExt;

    /// Writes `<p>{url}</p>` over the document; 404 for `/missing`.
    const PAGE_GUEST: &str = r#"
        (module
            (import "env" "url_len" (func $url_len (result i32)))
            (import "env" "url_read" (func $url_read (param i32 i32) (result i32)))
            (import "env" "document_write" (func $document_write (param i32 i32) (result i32)))
            (import "env" "set_status" (func $set_status (param i32) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "<p>")
            (data (i32.const 512) "/missing")
            (func (export "render")
                (local $len i32)
                (local.set $len (call $url_len))
                (drop (call $url_read (i32.const 3) (i32.const 256)))
                (i32.store8 (i32.add (i32.const 3) (local.get $len)) (i32.const 60))
                (i32.store8 (i32.add (i32.const 4) (local.get $len)) (i32.const 47))
                (i32.store8 (i32.add (i32.const 5) (local.get $len)) (i32.const 112))
                (i32.store8 (i32.add (i32.const 6) (local.get $len)) (i32.const 62))
                (drop (call $document_write (i32.const 0) (i32.add (local.get $len) (i32.const 7))))
                (if (i32.and
                        (i32.eq (local.get $len) (i32.const 8))
                        (i64.eq (i64.load (i32.const 3)) (i64.load (i32.const 512))))
                    (then (drop (call $set_status (i32.const 404)))))))
    "#;

    fn template() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<html><body><app-root></app-root></body></html>").unwrap();
        file
    }

    fn setup_router(template: &NamedTempFile) -> Router {
        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        })
        .unwrap();
        let runner = Arc::new(create_instance_runner(&engine).unwrap());
        let module = WasmSourceModule::new(
            "PageApp",
            ModuleSource::Wat(PAGE_GUEST.to_string()),
            runner,
            ExecutionConfig::default(),
        );
        let render = create_engine(SetupOptions::new(BootstrapTarget::source(module)).with_aot(true));
        let state = AppState::from_engine(render, template.path(), Some(engine));
        build_router(state, Duration::from_secs(30))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let template = template();
        let (status, body) = get(setup_router(&template), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_readiness_check() {
        let template = template();
        let (status, body) = get(setup_router(&template), "/ready").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["module"], "PageApp");
        assert_eq!(json["aot"], true);
    }

    #[tokio::test]
    async fn test_render_page() {
        let template = template();
        let (status, body) = get(setup_router(&template), "/products/42").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>/products/42</p>");
    }

    #[tokio::test]
    async fn test_render_page_sets_status() {
        let template = template();
        let (status, body) = get(setup_router(&template), "/missing").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "<p>/missing</p>");
    }

    #[tokio::test]
    async fn test_missing_template() {
        let template = template();
        let app = setup_router(&template);
        let path = template.path().to_path_buf();
        drop(template);
        assert!(!path.exists());

        let (status, body) = get(app, "/").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Template not found"));
    }
}
