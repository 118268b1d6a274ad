//! Platforms that turn a bootstrap target into a running application.
//!
//! [`ServerPlatform`] bootstraps compiled module factories.
//! [`DynamicServerPlatform`] compiles a source module first and then
//! bootstraps the result the same way.

use std::sync::Arc;

use tracing::{debug, instrument};

use ssr_engine_common::RenderError;

use crate::app::{AppInstance, ApplicationRef, ModuleFactory, PlatformState, SourceModule};
use crate::injector::{APPLICATION_REF, INITIAL_CONFIG, Injector, PLATFORM_STATE, Provider};

/// Platform for compiled module factories.
#[derive(Debug, Clone, Default)]
pub struct ServerPlatform {
    providers: Vec<Provider>,
}

impl ServerPlatform {
    /// Platform whose instances see `providers`.
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }

    /// Instantiate `factory`.
    ///
    /// The instance's injector holds the platform providers plus a fresh
    /// [`PlatformState`] (seeded from `INITIAL_CONFIG`) and
    /// [`ApplicationRef`]. Once the factory returns, the application is
    /// settled: it is stable right away unless it registered pending work.
    #[instrument(skip_all, fields(module = %factory.name()))]
    pub async fn bootstrap_module_factory(
        &self,
        factory: &dyn ModuleFactory,
    ) -> Result<Box<dyn AppInstance>, RenderError> {
        let mut injector = Injector::from_providers(self.providers.iter().cloned());

        let document = injector
            .get(&INITIAL_CONFIG)
            .map(|config| config.document.to_string())
            .unwrap_or_default();
        injector.provide(Provider::value(&PLATFORM_STATE, PlatformState::new(document)));

        let app_ref = Arc::new(ApplicationRef::new());
        injector.provide(Provider::shared(&APPLICATION_REF, Arc::clone(&app_ref)));

        let instance = factory.create(injector).await?;
        app_ref.settle();

        debug!(pending_tasks = app_ref.pending_tasks(), "Module bootstrapped");
        Ok(instance)
    }
}

/// Platform for source modules; compiles on every bootstrap.
#[derive(Debug, Clone, Default)]
pub struct DynamicServerPlatform {
    inner: ServerPlatform,
}

impl DynamicServerPlatform {
    /// Platform whose instances see `providers`.
    pub fn new(providers: Vec<Provider>) -> Self {
        Self {
            inner: ServerPlatform::new(providers),
        }
    }

    /// Compile `module` and instantiate the result.
    #[instrument(skip_all, fields(module = %module.name()))]
    pub async fn bootstrap_module(
        &self,
        module: &dyn SourceModule,
    ) -> Result<Box<dyn AppInstance>, RenderError> {
        let factory = module.compile().await?;
        self.inner.bootstrap_module_factory(factory.as_ref()).await
    }
}
