//! Host functions exposed to ssr-engine guest applications.
//!
//! Guests are core WebAssembly modules importing from the `env` module.
//! Strings cross the boundary as `(ptr, len)` pairs in the guest's exported
//! `memory`; functions that return data write into a guest buffer and
//! return the number of bytes written, or `-1` on failure.
//!
//! # Interfaces
//!
//! - [`logging`]: Structured logging from guest code
//! - [`request`]: Read-only view of the request being rendered
//! - [`document`]: The document the guest renders into
//! - [`response`]: Status and headers of the response
//!
//! [`linker`] registers all of them on a Wasmtime linker.

pub mod document;
pub mod linker;
pub mod logging;
pub mod request;
pub mod response;

pub use document::DocumentHost;
pub use linker::register_all;
pub use logging::LoggingHost;
pub use request::RequestHost;
pub use response::ResponseHost;

use ssr_engine_common::RenderError;
use ssr_engine_core::{InstanceRunner, WasmEngine};

/// Create an instance runner with every host function registered.
///
/// # Errors
///
/// Returns an error if a host function cannot be registered.
pub fn create_instance_runner(engine: &WasmEngine) -> Result<InstanceRunner, RenderError> {
    let mut runner = InstanceRunner::new(engine);
    register_all(runner.linker_mut())?;
    Ok(runner)
}
