//! The `ssr-engine.toml` file.
//!
//! Three tables, all optional:
//! - `[runtime]`: [`RuntimeConfig`] (engine, guest limits, render timeout)
//! - `[server]`: [`ServerConfigFile`] (listener)
//! - `[app]`: [`AppConfig`] (guest module, shell template, providers)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RuntimeConfig;

/// Parsed configuration file.
///
/// ```toml
/// [runtime.execution]
/// max_fuel = 10_000_000
/// entry_point = "render"
///
/// [runtime.render]
/// render_timeout_ms = 5000
///
/// [server]
/// bind_addr = "0.0.0.0:8080"
///
/// [app]
/// name = "shop"
/// module = "./dist/shop.wasm"
/// template = "./dist/index.html"
/// aot = true
///
/// [app.providers]
/// api_base = "https://api.example.com"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub runtime: RuntimeConfig,
    pub server: ServerConfigFile,
    pub app: AppConfig,
}

impl ConfigFile {
    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Io`] if the file cannot be read and
    /// [`ConfigFileError::Parse`] if it is not a valid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = text.parse()?;
        debug!(
            path = %path.display(),
            app = %config.app.name,
            module = ?config.app.module,
            "Configuration file loaded"
        );
        Ok(config)
    }
}

impl FromStr for ConfigFile {
    type Err = ConfigFileError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(text)?)
    }
}

/// `[server]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfigFile {
    /// `host:port` to listen on.
    pub bind_addr: String,
    /// Whole-request timeout, render included.
    pub request_timeout_secs: u64,
    /// Drain connections on SIGTERM/SIGINT instead of exiting at once.
    pub graceful_shutdown: bool,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            graceful_shutdown: true,
        }
    }
}

/// `[app]` table: the application every request renders.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, used in logs and errors.
    pub name: String,

    /// Guest module: a `.wasm` binary, or a `.cwasm` artifact from
    /// `ssr-engine compile` when `precompiled` is set.
    pub module: Option<PathBuf>,

    pub precompiled: bool,

    /// Compile a `.wasm` module once at the first render and reuse it.
    /// Without it every render compiles the module again.
    pub aot: bool,

    /// HTML shell template.
    pub template: PathBuf,

    /// Values bound in every application instance, by key.
    pub providers: BTreeMap<String, serde_json::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            module: None,
            precompiled: false,
            aot: false,
            template: PathBuf::from("./index.html"),
            providers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.server.graceful_shutdown);
        assert_eq!(config.app.name, "app");
        assert_eq!(config.app.module, None);
        assert_eq!(config.app.template, Path::new("./index.html"));
        assert!(!config.app.aot);
        assert!(config.app.providers.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: ConfigFile = assert_ok!(
            r#"
            [app]
            module = "./shop.wasm"
            "#
            .parse::<ConfigFile>()
        );

        assert_eq!(config.app.module.as_deref(), Some(Path::new("./shop.wasm")));
        assert_eq!(config.app.name, "app");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.runtime.render.render_timeout_ms, 30_000);
    }

    #[test]
    fn test_parse_full_config() {
        let config: ConfigFile = assert_ok!(
            r#"
            [runtime.engine]
            pooling_allocator = false

            [runtime.execution]
            max_fuel = 5_000_000
            entry_point = "main"

            [runtime.render]
            render_timeout_ms = 0

            [server]
            bind_addr = "127.0.0.1:3000"
            graceful_shutdown = false

            [app]
            name = "shop"
            module = "./shop.cwasm"
            precompiled = true
            template = "./dist/index.html"

            [app.providers]
            api_base = "https://api.example.com"
            page_size = 20
            "#
            .parse::<ConfigFile>()
        );

        assert!(!config.runtime.engine.pooling_allocator);
        assert_eq!(config.runtime.execution.max_fuel, 5_000_000);
        assert_eq!(config.runtime.execution.entry_point, "main");
        assert_eq!(config.runtime.render.render_timeout(), None);
        assert_eq!(config.server.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(!config.server.graceful_shutdown);
        assert_eq!(config.app.name, "shop");
        assert!(config.app.precompiled);
        assert_eq!(config.app.template, Path::new("./dist/index.html"));
        assert_eq!(
            config.app.providers["api_base"],
            serde_json::json!("https://api.example.com")
        );
        assert_eq!(config.app.providers["page_size"], serde_json::json!(20));
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert_err!("this is not valid toml [".parse::<ConfigFile>());
    }

    #[test]
    fn test_wrong_field_type() {
        let err = "[server]\nrequest_timeout_secs = \"soon\"".parse::<ConfigFile>().unwrap_err();
        assert!(matches!(err, ConfigFileError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigFile::from_file("/nonexistent/ssr-engine.toml").unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/ssr-engine.toml"));
    }
}
