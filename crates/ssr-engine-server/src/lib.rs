//! HTTP server for ssr-engine.
//!
//! This crate serves the rendered application over HTTP. It handles:
//!
//! - Building the render engine from the configuration file
//! - Request conversion into render requests
//! - Rendering every non-health route through the shell template
//! - Health and readiness checks
//!
//! # Quick Start
//!
//! ```ignore
//! use ssr_engine_common::ConfigFile;
//! use ssr_engine_server::SsrServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigFile::from_file("ssr-engine.toml")?;
//!     SsrServer::new(&config)?.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use server::{SsrServer, ServerConfig, TestHandle};
pub use state::AppState;
