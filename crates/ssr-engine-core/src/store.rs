//! Store data for one guest render.
//!
//! Every application instance owns a [`Store`] whose data is a
//! [`GuestContext`]. Host functions reach the request, the document and the
//! response through it, and append guest log lines to it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use wasmtime::Store;

use crate::WasmEngine;
use crate::app::PlatformState;
use crate::context::{RenderRequest, ResponseHandle};
use ssr_engine_common::{ExecutionConfig, RenderError};

/// Data attached to the store of one application instance.
pub struct GuestContext {
    /// Correlates guest logs with the render that produced them.
    pub request_id: String,
    pub request: Arc<RenderRequest>,
    /// Document shared with the platform state of the same render.
    pub document: Arc<PlatformState>,
    /// Absent when the caller did not supply a response handle.
    pub response: Option<ResponseHandle>,
    pub logs: Vec<LogEntry>,
    pub metrics: ExecutionMetrics,
    created: Instant,
}

/// One line logged by the guest.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Offset from the creation of the store.
    pub at: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the entry point cost.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    pub fuel_consumed: u64,
    /// Time from store creation until the entry point returned. `None`
    /// while the entry point has not finished.
    pub duration: Option<Duration>,
}

impl GuestContext {
    pub fn new(
        request_id: String,
        request: Arc<RenderRequest>,
        document: Arc<PlatformState>,
        response: Option<ResponseHandle>,
    ) -> Self {
        Self {
            request_id,
            request,
            document,
            response,
            logs: Vec::new(),
            metrics: ExecutionMetrics::default(),
            created: Instant::now(),
        }
    }

    pub fn log(&mut self, level: LogLevel, message: String) {
        let at = self.created.elapsed();
        self.logs.push(LogEntry { level, message, at });
    }

    /// Record the cost of a finished entry point call.
    pub fn record_entry(&mut self, fuel_consumed: u64) {
        self.metrics = ExecutionMetrics {
            fuel_consumed,
            duration: Some(self.created.elapsed()),
        };
    }
}

impl fmt::Debug for GuestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestContext")
            .field("request_id", &self.request_id)
            .field("url", &self.request.url)
            .field("logs", &self.logs.len())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Create the store for one application instance.
///
/// The engine always meters fuel, so a store without `fuel_metering` is
/// handed `u64::MAX`. The epoch deadline is `timeout_ms` ticks.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    context: GuestContext,
) -> Result<Store<GuestContext>, RenderError> {
    let mut store = Store::new(engine.inner(), context);

    let fuel = if config.fuel_metering { config.max_fuel } else { u64::MAX };
    store
        .set_fuel(fuel)
        .map_err(|e| RenderError::invalid_config(format!("Failed to set fuel: {e}")))?;

    if engine.config().epoch_interruption {
        store.set_epoch_deadline(config.timeout_ms);
    }

    Ok(store)
}

/// Fuel left in `store`, `0` if it cannot be read.
pub fn remaining_fuel(store: &Store<GuestContext>) -> u64 {
    store.get_fuel().unwrap_or(0)
}

/// Fuel spent since `store` had `before` left.
pub fn fuel_spent(store: &Store<GuestContext>, before: u64) -> u64 {
    before.saturating_sub(remaining_fuel(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssr_engine_common::EngineConfig;

    fn context() -> GuestContext {
        GuestContext::new(
            "req-1".into(),
            Arc::new(RenderRequest::get("/home")),
            Arc::new(PlatformState::new("<app-root></app-root>")),
            None,
        )
    }

    fn engine(epoch_interruption: bool) -> WasmEngine {
        WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            epoch_interruption,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_logs_keep_order() {
        let mut ctx = context();

        ctx.log(LogLevel::Info, "Hello".into());
        ctx.log(LogLevel::Error, "World".into());

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].level, LogLevel::Info);
        assert_eq!(ctx.logs[1].message, "World");
        assert!(ctx.logs[0].at <= ctx.logs[1].at);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
        assert_eq!(LogLevel::Warn.as_str(), "WARN");
        assert!(LogLevel::Error > LogLevel::Info);
    }

    #[test]
    fn test_record_entry() {
        let mut ctx = context();
        assert!(ctx.metrics.duration.is_none());

        ctx.record_entry(42);

        assert_eq!(ctx.metrics.fuel_consumed, 42);
        assert!(ctx.metrics.duration.is_some());
    }

    #[test]
    fn test_metered_store() {
        let config = ExecutionConfig {
            max_fuel: 1000,
            fuel_metering: true,
            ..Default::default()
        };

        let store = create_store(&engine(true), &config, context()).unwrap();
        assert_eq!(remaining_fuel(&store), 1000);
        assert_eq!(fuel_spent(&store, 1000), 0);
        assert_eq!(fuel_spent(&store, 1500), 500);
    }

    #[test]
    fn test_unmetered_store() {
        let config = ExecutionConfig {
            max_fuel: 1000,
            fuel_metering: false,
            ..Default::default()
        };

        let store = create_store(&engine(false), &config, context()).unwrap();
        assert_eq!(remaining_fuel(&store), u64::MAX);
    }
}
