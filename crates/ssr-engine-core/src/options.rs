//! Engine setup options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ssr_engine_common::{BoxError, RenderConfig};

use crate::app::{AppInstance, BootstrapTarget};
use crate::injector::Provider;

/// Hook run once the application is stable and before the document is
/// serialized. Typical use: set a response status from application state.
pub type OnStableHook =
    Arc<dyn Fn(&dyn AppInstance, &SetupOptions) -> Result<(), BoxError> + Send + Sync>;

/// Configuration of a render engine. Immutable once the engine is created.
#[derive(Clone)]
pub struct SetupOptions {
    /// The bootstrap target is an ahead-of-time compiled artifact.
    ///
    /// With a [`BootstrapTarget::SourceModule`], the module is compiled once
    /// per engine and every render bootstraps the compiled factory.
    pub aot: bool,

    /// Hook run against the stable instance.
    pub on_stable: Option<OnStableHook>,

    /// What to instantiate for every render.
    pub bootstrap: Option<BootstrapTarget>,

    /// Extra values injected into every instance.
    pub providers: Vec<Provider>,

    /// Upper bound on the wait for stability. `None` waits forever.
    pub render_timeout: Option<Duration>,
}

impl SetupOptions {
    /// Options for the given target, with defaults elsewhere.
    pub fn new(bootstrap: BootstrapTarget) -> Self {
        Self {
            bootstrap: Some(bootstrap),
            ..Self::default()
        }
    }

    /// Set the ahead-of-time flag.
    pub fn with_aot(mut self, aot: bool) -> Self {
        self.aot = aot;
        self
    }

    /// Set the `on_stable` hook.
    pub fn with_on_stable<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn AppInstance, &SetupOptions) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_stable = Some(Arc::new(hook));
        self
    }

    /// Append a provider.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the render timeout.
    pub fn with_render_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.render_timeout = timeout;
        self
    }
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            aot: false,
            on_stable: None,
            bootstrap: None,
            providers: Vec::new(),
            render_timeout: RenderConfig::default().render_timeout(),
        }
    }
}

impl fmt::Debug for SetupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupOptions")
            .field("aot", &self.aot)
            .field("on_stable", &self.on_stable.is_some())
            .field("bootstrap", &self.bootstrap)
            .field("providers", &self.providers)
            .field("render_timeout", &self.render_timeout)
            .finish()
    }
}
