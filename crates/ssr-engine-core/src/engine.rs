//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is shared by every render. It is:
//! - Thread-safe and cloned cheaply into module factories
//! - Configured with pooling allocator so per-render instances are cheap
//! - Set up with fuel metering and epoch interruption to bound guest work

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, OptLevel, PoolingAllocationConfig};

use ssr_engine_common::{EngineConfig, RenderError};

/// Interval between epoch increments driven by [`WasmEngine::spawn_epoch_ticker`].
pub const EPOCH_TICK: Duration = Duration::from_millis(1);

/// Thread-safe WebAssembly engine wrapper.
///
/// Wraps a Wasmtime [`Engine`] configured for render-per-request execution.
/// The engine holds no per-render state; each render gets its own store.
///
/// # Example
///
/// ```ignore
/// use ssr_engine_common::EngineConfig;
/// use ssr_engine_core::WasmEngine;
///
/// let engine = WasmEngine::new(&EngineConfig::default())?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid, the
    /// pooling allocator cannot be initialized or the module cache
    /// configuration cannot be loaded.
    pub fn new(config: &EngineConfig) -> Result<Self, RenderError> {
        let mut wasmtime_config = Config::new();
        wasmtime_config
            .async_support(true)
            .consume_fuel(true)
            .epoch_interruption(config.epoch_interruption)
            .cranelift_opt_level(OptLevel::Speed);

        if config.pooling_allocator {
            wasmtime_config.allocation_strategy(InstanceAllocationStrategy::Pooling(
                pooling_config(config),
            ));
            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        if config.module_cache {
            match &config.module_cache_config {
                Some(path) => wasmtime_config.cache_config_load(path),
                None => wasmtime_config.cache_config_load_default(),
            }
            .map_err(|e| {
                RenderError::invalid_config(format!("Failed to load module cache config: {e}"))
            })?;
            debug!(config = ?config.module_cache_config, "Compiled module cache enabled");
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RenderError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            pooling = config.pooling_allocator,
            epoch_interruption = config.epoch_interruption,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }

    /// Spawn a background task that increments the epoch every [`EPOCH_TICK`].
    ///
    /// Store deadlines are expressed in ticks, so a deadline of `n` allows
    /// roughly `n` milliseconds of guest execution. Returns `None` when epoch
    /// interruption is disabled.
    pub fn spawn_epoch_ticker(&self) -> Option<JoinHandle<()>> {
        if !self.config.epoch_interruption {
            return None;
        }

        let engine = Arc::clone(&self.engine);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(EPOCH_TICK);
            loop {
                interval.tick().await;
                engine.increment_epoch();
            }
        }))
    }

    /// Check if the pooling allocator is enabled.
    pub fn is_pooling_enabled(&self) -> bool {
        self.config.pooling_allocator
    }
}

/// One slot per in-flight render: a core instance with one memory and one table.
fn pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
    let mut pooling = PoolingAllocationConfig::default();
    pooling
        .total_core_instances(config.max_instances)
        .total_memories(config.max_instances)
        .total_tables(config.max_instances)
        .max_memory_size(config.instance_memory_bytes());
    pooling
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("epoch_interruption", &self.config.epoch_interruption)
            .finish_non_exhaustive()
    }
}
