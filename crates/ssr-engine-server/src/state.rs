//! Shared application state.
//!
//! This module provides [`AppState`], which holds the render engine and the
//! shell template shared by all HTTP request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use ssr_engine_common::{BoxError, ConfigFile, RenderError};
use ssr_engine_core::{
    AppInstance, BootstrapTarget, CompiledModule, ModuleSource, Provider, RESPONSE, RenderEngine,
    SetupOptions, WasmEngine, WasmModuleFactory, WasmSourceModule, create_engine,
};
use ssr_engine_host::create_instance_runner;

/// Shared state across all request handlers.
///
/// This struct is cloned for each request, so it uses `Arc` for shared data.
#[derive(Clone)]
pub struct AppState {
    /// Render engine (shared across all requests).
    render: RenderEngine,

    /// Shell template every page renders into.
    template: Arc<PathBuf>,

    /// Wasmtime engine backing the guest, if any.
    wasm: Option<WasmEngine>,
}

impl AppState {
    /// Create application state from a configuration file.
    ///
    /// A precompiled artifact becomes a compiled module factory; a plain
    /// `.wasm` module becomes a source module, compiled once when
    /// `app.aot` is set and on every render otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if no module is configured, or if the engine, the
    /// host functions or a precompiled artifact cannot be loaded.
    pub fn new(config: &ConfigFile) -> Result<Self, RenderError> {
        let app = &config.app;
        let Some(module_path) = app.module.as_deref() else {
            return Err(RenderError::invalid_config("app.module is not set"));
        };

        let engine = WasmEngine::new(&config.runtime.engine)?;
        let runner = Arc::new(create_instance_runner(&engine)?);
        let execution = config.runtime.execution.clone();

        let target = if app.precompiled {
            let module = CompiledModule::from_precompiled(engine.inner(), module_path)?;
            BootstrapTarget::factory(WasmModuleFactory::new(
                app.name.clone(),
                module,
                runner,
                execution,
            ))
        } else {
            BootstrapTarget::source(WasmSourceModule::new(
                app.name.clone(),
                ModuleSource::File(module_path.to_path_buf()),
                runner,
                execution,
            ))
        };

        let options = app.providers.iter().fold(
            SetupOptions::new(target)
                .with_aot(app.aot)
                .with_render_timeout(config.runtime.render.render_timeout())
                .with_on_stable(log_response_status),
            |options, (key, value)| options.with_provider(Provider::json(key.clone(), value.clone())),
        );

        info!(
            module = %app.name,
            path = %module_path.display(),
            precompiled = app.precompiled,
            aot = app.aot,
            providers = app.providers.len(),
            "Application configured"
        );

        Ok(Self {
            render: create_engine(options),
            template: Arc::new(app.template.clone()),
            wasm: Some(engine),
        })
    }

    /// Create application state around an existing render engine.
    pub fn from_engine(
        render: RenderEngine,
        template: impl Into<PathBuf>,
        wasm: Option<WasmEngine>,
    ) -> Self {
        Self {
            render,
            template: Arc::new(template.into()),
            wasm,
        }
    }

    /// Get the render engine.
    pub fn render(&self) -> &RenderEngine {
        &self.render
    }

    /// Get the shell template path.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Get the Wasmtime engine.
    pub fn wasm(&self) -> Option<&WasmEngine> {
        self.wasm.as_ref()
    }
}

/// Last look at the response before the document is serialized.
#[allow(clippy::unnecessary_wraps)]
fn log_response_status(instance: &dyn AppInstance, _: &SetupOptions) -> Result<(), BoxError> {
    if let Some(response) = instance.injector().get(&RESPONSE) {
        debug!(module = instance.name(), status = response.status(), "Application stable");
    }
    Ok(())
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("template", &self.template)
            .field("templates_cached", &self.render.templates().len())
            .finish_non_exhaustive()
    }
}
