//! Render-per-request engine for ssr-engine.
//!
//! This crate provides the render lifecycle and the WebAssembly backing for
//! guest applications:
//! - [`RenderEngine`]: Bootstraps, awaits, serializes and destroys one
//!   application instance per render
//! - [`TemplateLoader`]: Memoized shell template reads
//! - [`ServerPlatform`] / [`DynamicServerPlatform`]: Bootstrap of compiled
//!   factories and source modules
//! - [`WasmEngine`], [`CompiledModule`], [`InstanceRunner`]: Wasmtime plumbing
//! - [`WasmModuleFactory`] / [`WasmSourceModule`]: Guests as bootstrap targets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     RenderEngine                        │
//! │  (One per app, shared by all requests)                  │
//! │  - SetupOptions, TemplateLoader                         │
//! │  - AOT-compiled factory (once)                          │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          ServerPlatform / DynamicServerPlatform         │
//! │  (Per render)                                           │
//! │  - Injector: REQUEST, RESPONSE, INITIAL_CONFIG          │
//! │  - PlatformState, ApplicationRef                        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                AppInstance (per render)                 │
//! │  - Wasm: Store<GuestContext> + Instance                 │
//! │  - Stable when the entry point returns                  │
//! │  - Destroyed exactly once                               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod context;
pub mod engine;
pub mod injector;
pub mod instance;
pub mod module;
pub mod options;
pub mod platform;
pub mod render;
pub mod store;
pub mod template;
pub mod wasm_app;

pub use app::{
    AppInstance, ApplicationRef, BootstrapTarget, ModuleFactory, PendingTask, PlatformState,
    SourceModule, Stability,
};
pub use context::{InitialConfig, RenderContext, RenderRequest, ResponseHandle, ResponseState};
pub use engine::WasmEngine;
pub use injector::{
    APPLICATION_REF, INITIAL_CONFIG, InjectionToken, Injector, PLATFORM_STATE, Provider, REQUEST,
    RESPONSE,
};
pub use instance::{ExecutionResult, InstanceRunner};
pub use module::{CompiledModule, ModuleOrigin};
pub use options::{OnStableHook, SetupOptions};
pub use platform::{DynamicServerPlatform, ServerPlatform};
pub use render::{RenderEngine, create_engine, create_engine_with_templates};
pub use store::{ExecutionMetrics, GuestContext, LogEntry, LogLevel};
pub use template::{FsTemplateSource, TemplateLoader, TemplateSource};
pub use wasm_app::{ModuleSource, WasmAppInstance, WasmModuleFactory, WasmSourceModule};
