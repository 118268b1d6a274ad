//! Common types, errors, and configuration for ssr-engine.
//!
//! This crate provides shared functionality used across the ssr-engine workspace:
//! - [`RenderError`]: the error taxonomy of the render lifecycle
//! - Configuration structures for the Wasm engine, guest execution and rendering
//! - The TOML configuration file loaded by the binary

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, RenderConfig, RuntimeConfig};
pub use config_file::{AppConfig, ConfigFile, ConfigFileError, ServerConfigFile};
pub use error::{BoxError, RenderError};
