//! Runtime settings, the `[runtime]` table of `ssr-engine.toml`.
//!
//! Every field has a default, so any subset of a table may be given.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub execution: ExecutionConfig,
    pub render: RenderConfig,
}

/// `[runtime.engine]`: the wasmtime engine shared by every render.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pre-allocate instance slots. Every render creates a fresh instance,
    /// so pooling keeps construction cheap.
    pub pooling_allocator: bool,

    /// Instance slots in the pool, i.e. the maximum number of renders in
    /// flight. Ignored without `pooling_allocator`.
    pub max_instances: u32,

    /// Linear memory per instance slot, in megabytes.
    pub instance_memory_mb: u32,

    /// Keep compiled machine code in wasmtime's on-disk cache, so source
    /// modules compiled on every render skip Cranelift after the first.
    pub module_cache: bool,

    /// wasmtime cache configuration file. The system default location is
    /// used when unset.
    pub module_cache_config: Option<PathBuf>,

    /// Interrupt guests once their epoch deadline passes. The epoch is
    /// ticked once per millisecond.
    pub epoch_interruption: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: true,
            max_instances: 1000,
            instance_memory_mb: 64,
            module_cache: false,
            module_cache_config: None,
            epoch_interruption: true,
        }
    }
}

impl EngineConfig {
    /// Memory per instance slot in bytes.
    pub fn instance_memory_bytes(&self) -> usize {
        usize::try_from(self.instance_memory_mb)
            .unwrap_or(usize::MAX)
            .saturating_mul(1024 * 1024)
    }
}

/// `[runtime.execution]`: limits applied to each guest instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fuel handed to each store, roughly one unit per Wasm instruction.
    pub max_fuel: u64,

    /// Guest execution deadline in milliseconds (epoch ticks).
    pub timeout_ms: u64,

    /// Without metering a store gets unlimited fuel.
    pub fuel_metering: bool,

    /// Name of the exported guest function that renders the document.
    pub entry_point: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: 10_000_000,
            timeout_ms: 1000,
            fuel_metering: true,
            entry_point: "render".to_string(),
        }
    }
}

impl ExecutionConfig {
    /// `timeout_ms` as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[runtime.render]`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// How long a render may wait for the application to become stable.
    ///
    /// `0` disables the timeout.
    pub render_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_timeout_ms: 30_000,
        }
    }
}

impl RenderConfig {
    /// `None` when the timeout is disabled.
    pub fn render_timeout(&self) -> Option<Duration> {
        (self.render_timeout_ms > 0).then(|| Duration::from_millis(self.render_timeout_ms))
    }
}
