//! Error types for ssr-engine.
//!
//! Every failure of a render invocation ends up as a [`RenderError`] handed to
//! the completion callback. The variants follow the lifecycle of a render:
//! configuration, template loading, bootstrap, stability, and the
//! `on_stable` hook.

use std::io;

use thiserror::Error;

/// Boxed error returned by user-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while rendering a page.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No bootstrap target was configured on the setup options.
    #[error(
        "No bootstrap target configured: pass a compiled module factory or a source module"
    )]
    MissingBootstrapTarget,

    /// The shell template could not be read.
    #[error("Failed to read template '{path}': {source}")]
    TemplateRead {
        /// Path of the template.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The requested module was not found.
    #[error("Module not found: {module_id}")]
    ModuleNotFound {
        /// The identifier of the module that was not found.
        module_id: String,
    },

    /// Compiling a source module failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// Constructing the application instance failed.
    #[error("Bootstrap of module '{module}' failed: {reason}")]
    BootstrapFailed {
        /// Name of the module being bootstrapped.
        module: String,
        /// Description of the failure.
        reason: String,
    },

    /// The application reported a failure instead of becoming stable.
    #[error("Application '{module}' failed before becoming stable: {reason}")]
    StabilityFailed {
        /// Name of the module.
        module: String,
        /// Description of the failure.
        reason: String,
    },

    /// The application did not become stable within the render timeout.
    #[error("Render timeout after {duration_ms}ms")]
    RenderTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Guest execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// A WebAssembly trap occurred during guest execution.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
    },

    /// The `on_stable` hook returned an error or panicked.
    #[error("on_stable hook failed for module '{module}': {source}")]
    Hook {
        /// Name of the module the hook ran against.
        module: String,
        /// The error raised by the hook.
        #[source]
        source: BoxError,
    },

    /// A value the lifecycle depends on was not provided to the injector.
    #[error("No provider for token: {token}")]
    MissingProvider {
        /// Name of the injection token.
        token: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RenderError {
    /// Create a new `TemplateRead` error.
    pub fn template_read(path: impl Into<String>, source: io::Error) -> Self {
        Self::TemplateRead {
            path: path.into(),
            source,
        }
    }

    /// Create a new `ModuleNotFound` error.
    pub fn module_not_found(module_id: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module_id: module_id.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `BootstrapFailed` error.
    pub fn bootstrap_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BootstrapFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `StabilityFailed` error.
    pub fn stability_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StabilityFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::Trap {
            message: message.into(),
        }
    }

    /// Create a new `Hook` error wrapping the hook's own error.
    pub fn hook(module: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Hook {
            module: module.into(),
            source: source.into(),
        }
    }

    /// Create a new `MissingProvider` error.
    pub fn missing_provider(token: impl Into<String>) -> Self {
        Self::MissingProvider {
            token: token.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the template file does not exist.
    pub fn is_template_not_found(&self) -> bool {
        matches!(self, Self::TemplateRead { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::RenderTimeout { .. })
    }
}
