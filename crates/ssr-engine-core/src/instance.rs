//! WebAssembly instance lifecycle management.
//!
//! [`InstanceRunner`] splits a guest render into the two halves the
//! application model needs:
//!
//! 1. [`InstanceRunner::instantiate`]: link host functions and instantiate
//!    the module in a fresh store (the bootstrap)
//! 2. [`InstanceRunner::call_entry`]: run the entry point to completion
//!    (the pending work the application waits on before it is stable)

use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Instance, Linker, Store, Trap};

use crate::store::{GuestContext, LogLevel, fuel_spent, remaining_fuel};
use crate::{CompiledModule, WasmEngine};
use ssr_engine_common::RenderError;

/// Result of running a guest entry point.
#[derive(Debug)]
pub enum ExecutionResult {
    /// The entry point returned.
    Success,

    /// The entry point trapped.
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },
}

impl ExecutionResult {
    /// Returns `true` if execution was successful.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success)
    }

    /// Returns `true` if execution trapped.
    pub fn is_trap(&self) -> bool {
        matches!(self, ExecutionResult::Trap { .. })
    }
}

/// Instance lifecycle manager.
///
/// Holds the linker with every registered host function. Shared by all
/// renders of a module; each render brings its own [`Store`].
pub struct InstanceRunner {
    engine: WasmEngine,
    linker: Linker<GuestContext>,
}

impl InstanceRunner {
    /// Create a runner with an empty linker.
    pub fn new(engine: &WasmEngine) -> Self {
        Self {
            linker: Linker::new(engine.inner()),
            engine: engine.clone(),
        }
    }

    /// Get a mutable reference to the linker, to register host functions.
    pub fn linker_mut(&mut self) -> &mut Linker<GuestContext> {
        &mut self.linker
    }

    /// Instantiate `module` in `store`.
    ///
    /// Runs the module's start function, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::BootstrapFailed`] if an import cannot be
    /// resolved or the start function traps, and
    /// [`RenderError::FuelExhausted`] if it runs out of fuel.
    #[instrument(skip_all, fields(module = %name))]
    pub async fn instantiate(
        &self,
        name: &str,
        module: &CompiledModule,
        store: &mut Store<GuestContext>,
    ) -> Result<Instance, RenderError> {
        debug!("Instantiating guest module");

        self.linker
            .instantiate_async(&mut *store, module.as_module())
            .await
            .map_err(|e| {
                if is_out_of_fuel(&e) {
                    RenderError::FuelExhausted
                } else {
                    RenderError::bootstrap_failed(name, format!("Instantiation failed: {e}"))
                }
            })
    }

    /// Run `entry_point` on `instance` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ModuleNotFound`] if the export is missing or
    /// has the wrong signature, [`RenderError::FuelExhausted`] if the guest
    /// ran out of fuel and [`RenderError::RenderTimeout`] if it passed its
    /// epoch deadline. Any other trap is reported as
    /// [`ExecutionResult::Trap`].
    #[instrument(skip(self, instance, store), fields(request_id = %store.data().request_id))]
    pub async fn call_entry(
        &self,
        instance: Instance,
        store: &mut Store<GuestContext>,
        entry_point: &str,
        deadline_ms: u64,
    ) -> Result<ExecutionResult, RenderError> {
        let start = Instant::now();
        let initial_fuel = remaining_fuel(store);

        let func = instance
            .get_typed_func::<(), ()>(&mut *store, entry_point)
            .map_err(|_| {
                RenderError::module_not_found(format!("Entry point '{entry_point}' not found"))
            })?;

        let result = func.call_async(&mut *store, ()).await;

        let fuel_consumed = fuel_spent(store, initial_fuel);
        store.data_mut().record_entry(fuel_consumed);

        let duration = start.elapsed();

        match result {
            Ok(()) => {
                let ctx = store.data();
                info!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = ctx.metrics.fuel_consumed,
                    guest_logs = ctx.logs.len(),
                    guest_errors = ctx.logs.iter().filter(|log| log.level == LogLevel::Error).count(),
                    "Guest render completed"
                );
                Ok(ExecutionResult::Success)
            }
            Err(trap) if is_out_of_fuel(&trap) => {
                warn!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = fuel_consumed,
                    "Guest render terminated: fuel exhausted"
                );
                Err(RenderError::FuelExhausted)
            }
            Err(trap) if is_interrupted(&trap) => {
                warn!(
                    duration_ms = duration.as_millis(),
                    "Guest render terminated: epoch deadline reached"
                );
                Err(RenderError::RenderTimeout {
                    duration_ms: deadline_ms,
                })
            }
            Err(trap) => {
                let (message, code) = extract_trap_info(&trap);
                error!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = fuel_consumed,
                    trap_message = %message,
                    "Guest render trapped"
                );
                Ok(ExecutionResult::Trap { message, code })
            }
        }
    }

    /// Get the engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = error.to_string();
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));
    (message, code)
}

fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}

fn is_interrupted(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::Interrupt)
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
