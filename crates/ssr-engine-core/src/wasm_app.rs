//! WebAssembly guests as bootstrap targets.
//!
//! A guest application is a core module exporting `memory` and a
//! parameterless entry point (`render` by default). Bootstrapping
//! instantiates the module in a fresh store; running the entry point is the
//! application's pending work, so the instance becomes stable once the entry
//! point returns and fails if it traps.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};
use uuid::Uuid;

use ssr_engine_common::{ExecutionConfig, RenderError};

use crate::app::{AppInstance, ModuleFactory, SourceModule};
use crate::context::ResponseHandle;
use crate::injector::{APPLICATION_REF, Injector, PLATFORM_STATE, REQUEST, RESPONSE};
use crate::instance::{ExecutionResult, InstanceRunner};
use crate::module::CompiledModule;
use crate::store::{GuestContext, create_store};

/// Factory for a compiled guest module.
pub struct WasmModuleFactory {
    name: String,
    module: CompiledModule,
    runner: Arc<InstanceRunner>,
    execution: ExecutionConfig,
}

impl WasmModuleFactory {
    /// Wrap a compiled module. `runner` must have the host functions the
    /// module imports registered.
    pub fn new(
        name: impl Into<String>,
        module: CompiledModule,
        runner: Arc<InstanceRunner>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            module,
            runner,
            execution,
        }
    }

    /// The compiled module.
    pub fn module(&self) -> &CompiledModule {
        &self.module
    }
}

#[async_trait]
impl ModuleFactory for WasmModuleFactory {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(module = %self.name, content_hash = %self.module.content_hash()))]
    async fn create(&self, injector: Injector) -> Result<Box<dyn AppInstance>, RenderError> {
        let request = injector.require(&REQUEST)?;
        let document = injector.require(&PLATFORM_STATE)?;
        let app_ref = injector.require(&APPLICATION_REF)?;
        let response = injector.get(&RESPONSE).map(|r| ResponseHandle::clone(&r));

        let ctx = GuestContext::new(Uuid::new_v4().to_string(), request, document, response);
        let mut store = create_store(self.runner.engine(), &self.execution, ctx)?;
        let instance = self
            .runner
            .instantiate(&self.name, &self.module, &mut store)
            .await?;

        let pending = app_ref.begin_task();
        let runner = Arc::clone(&self.runner);
        let entry_point = self.execution.entry_point.clone();
        let deadline_ms = self.execution.timeout_ms;

        let task = tokio::spawn(async move {
            let _pending = pending;
            match runner
                .call_entry(instance, &mut store, &entry_point, deadline_ms)
                .await
            {
                Ok(ExecutionResult::Success) => {}
                Ok(ExecutionResult::Trap { message, .. }) => app_ref.fail(RenderError::trap(message)),
                Err(e) => app_ref.fail(e),
            }
        });

        Ok(Box::new(WasmAppInstance {
            name: self.name.clone(),
            injector,
            task: Some(task),
        }))
    }
}

impl std::fmt::Debug for WasmModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmModuleFactory")
            .field("name", &self.name)
            .field("content_hash", &self.module.content_hash())
            .finish_non_exhaustive()
    }
}

/// A running guest instance.
pub struct WasmAppInstance {
    name: String,
    injector: Injector,
    task: Option<JoinHandle<()>>,
}

impl AppInstance for WasmAppInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn injector(&self) -> &Injector {
        &self.injector
    }

    fn destroy(&mut self) -> Result<(), RenderError> {
        self.abort_entry();
        Ok(())
    }
}

impl WasmAppInstance {
    fn abort_entry(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(module = %self.name, "Aborting unfinished guest render");
                task.abort();
            }
        }
    }
}

impl Drop for WasmAppInstance {
    fn drop(&mut self) {
        self.abort_entry();
    }
}

/// Where a guest module's code comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Wasm binary in memory.
    Bytes(Arc<[u8]>),
    /// WebAssembly text format.
    Wat(String),
    /// Wasm binary on disk, read at every compile.
    File(PathBuf),
}

/// A guest module in source form, compiled on bootstrap.
pub struct WasmSourceModule {
    name: String,
    source: ModuleSource,
    runner: Arc<InstanceRunner>,
    execution: ExecutionConfig,
}

impl WasmSourceModule {
    /// Wrap a module source. `runner` must have the host functions the
    /// module imports registered.
    pub fn new(
        name: impl Into<String>,
        source: ModuleSource,
        runner: Arc<InstanceRunner>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            runner,
            execution,
        }
    }

    /// The module source.
    pub fn source(&self) -> &ModuleSource {
        &self.source
    }
}

#[async_trait]
impl SourceModule for WasmSourceModule {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(module = %self.name))]
    async fn compile(&self) -> Result<Arc<dyn ModuleFactory>, RenderError> {
        let engine = self.runner.engine().inner();

        let module = match &self.source {
            ModuleSource::Bytes(bytes) => CompiledModule::from_bytes(engine, bytes)?,
            ModuleSource::Wat(text) => CompiledModule::from_wat(engine, text)?,
            ModuleSource::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => {
                        RenderError::module_not_found(path.display().to_string())
                    }
                    _ => RenderError::Io(e),
                })?;
                CompiledModule::from_bytes(engine, &bytes)?
            }
        };

        Ok(Arc::new(WasmModuleFactory::new(
            self.name.clone(),
            module,
            Arc::clone(&self.runner),
            self.execution.clone(),
        )))
    }
}

impl std::fmt::Debug for WasmSourceModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmSourceModule")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
