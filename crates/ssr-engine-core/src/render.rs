//! Render lifecycle controller.
//!
//! Each render invocation runs through:
//!
//! ```text
//! Created ─► Constructing ─► AwaitingStability ─► Finalizing ─► Completed
//!                 │                  │                 │
//!                 └──────────────────┴─────────────────┴──────► Failed
//! ```
//!
//! Every instance that was constructed is destroyed exactly once, on every
//! path, before the result is handed back. Destroy-time errors and panics
//! are logged and never replace the result. A render future dropped before
//! it completes still destroys its instance.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use ssr_engine_common::RenderError;

use crate::app::{AppInstance, ApplicationRef, BootstrapTarget, ModuleFactory, PlatformState};
use crate::context::{InitialConfig, RenderContext};
use crate::injector::{APPLICATION_REF, INITIAL_CONFIG, PLATFORM_STATE, Provider, REQUEST, RESPONSE};
use crate::options::SetupOptions;
use crate::platform::{DynamicServerPlatform, ServerPlatform};
use crate::template::TemplateLoader;

/// Create a render engine with its own template cache.
pub fn create_engine(options: SetupOptions) -> RenderEngine {
    create_engine_with_templates(options, Arc::new(TemplateLoader::new()))
}

/// Create a render engine that loads shell templates through `templates`.
///
/// Engines sharing a loader share its cache.
pub fn create_engine_with_templates(
    options: SetupOptions,
    templates: Arc<TemplateLoader>,
) -> RenderEngine {
    match &options.bootstrap {
        Some(target) if options.on_stable.is_none() => {
            warn!(
                module = %target.name(),
                "No on_stable hook configured, documents are serialized as soon as the app is stable"
            );
        }
        Some(target) => debug!(module = %target.name(), aot = options.aot, "Render engine created"),
        None => warn!("Render engine created without a bootstrap target, every render will fail"),
    }

    RenderEngine {
        inner: Arc::new(EngineInner {
            options,
            templates,
            compiled: OnceCell::new(),
        }),
    }
}

/// Renders pages by bootstrapping one application instance per invocation.
///
/// Cheap to clone; clones share options, template cache and the
/// ahead-of-time compiled factory.
#[derive(Clone)]
pub struct RenderEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    options: SetupOptions,
    templates: Arc<TemplateLoader>,
    compiled: OnceCell<Arc<dyn ModuleFactory>>,
}

impl RenderEngine {
    /// The options this engine was created with.
    pub fn options(&self) -> &SetupOptions {
        &self.inner.options
    }

    /// The template loader used by this engine.
    pub fn templates(&self) -> &Arc<TemplateLoader> {
        &self.inner.templates
    }

    /// Render the shell at `path` and hand the result to `callback`.
    ///
    /// The render runs on a spawned task; `callback` is invoked exactly once
    /// from that task. Must be called within a tokio runtime.
    pub fn render<F>(
        &self,
        path: impl Into<PathBuf>,
        ctx: RenderContext,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<String, RenderError>) + Send + 'static,
    {
        let engine = self.clone();
        let path = path.into();

        tokio::spawn(async move {
            let result = engine.render_to_string(&path, ctx).await;
            callback(result);
        })
    }

    /// Render the shell at `path` for the request in `ctx`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::MissingBootstrapTarget`] if no target is configured
    /// - [`RenderError::TemplateRead`] if the shell cannot be read
    /// - any error raised while compiling or bootstrapping the module
    /// - the application's failure if it fails before becoming stable
    /// - [`RenderError::RenderTimeout`] if it does not become stable in time
    /// - [`RenderError::Hook`] if the `on_stable` hook fails or panics
    #[instrument(
        name = "render",
        skip(self, path, ctx),
        fields(path = %path.as_ref().display(), url = %ctx.request.url)
    )]
    pub async fn render_to_string(
        &self,
        path: impl AsRef<Path>,
        ctx: RenderContext,
    ) -> Result<String, RenderError> {
        let target = self
            .inner
            .options
            .bootstrap
            .as_ref()
            .ok_or(RenderError::MissingBootstrapTarget)?;

        let document = self.inner.templates.load(path)?;
        let providers = self.providers_for(document, ctx);

        let instance = self.bootstrap(target, providers).await.inspect_err(|e| {
            error!(module = %target.name(), error = %e, "Bootstrap failed");
        })?;
        let mut instance = LiveInstance::new(instance);

        let outcome = self.finalize(instance.get()).await;
        instance.destroy();

        let state = outcome?;
        let html = state.render_to_string();
        info!(bytes = html.len(), "Page rendered");
        Ok(html)
    }

    fn providers_for(&self, document: Arc<str>, ctx: RenderContext) -> Vec<Provider> {
        let RenderContext { request, response } = ctx;
        let initial = InitialConfig {
            document,
            url: request.url.clone(),
        };

        let mut providers = self.inner.options.providers.clone();
        providers.push(Provider::value(&REQUEST, request));
        if let Some(response) = response {
            providers.push(Provider::value(&RESPONSE, response));
        }
        providers.push(Provider::value(&INITIAL_CONFIG, initial));
        providers
    }

    async fn bootstrap(
        &self,
        target: &BootstrapTarget,
        providers: Vec<Provider>,
    ) -> Result<Box<dyn AppInstance>, RenderError> {
        match target {
            BootstrapTarget::CompiledFactory(factory) => {
                ServerPlatform::new(providers)
                    .bootstrap_module_factory(factory.as_ref())
                    .await
            }
            BootstrapTarget::SourceModule(module) if self.inner.options.aot => {
                let factory = self
                    .inner
                    .compiled
                    .get_or_try_init(|| module.compile())
                    .await?;
                ServerPlatform::new(providers)
                    .bootstrap_module_factory(factory.as_ref())
                    .await
            }
            BootstrapTarget::SourceModule(module) => {
                DynamicServerPlatform::new(providers)
                    .bootstrap_module(module.as_ref())
                    .await
            }
        }
    }

    /// Wait for stability and run the hook. Returns the document holder on
    /// success; the caller destroys the instance either way.
    async fn finalize(
        &self,
        instance: &dyn AppInstance,
    ) -> Result<Arc<PlatformState>, RenderError> {
        let injector = instance.injector();
        let state = injector.require(&PLATFORM_STATE)?;
        let app_ref = injector.require(&APPLICATION_REF)?;

        self.await_stable(&app_ref).await.inspect_err(|e| {
            error!(module = %instance.name(), error = %e, "Application did not become stable");
        })?;

        self.run_hook(instance)?;
        Ok(state)
    }

    async fn await_stable(&self, app_ref: &ApplicationRef) -> Result<(), RenderError> {
        match self.inner.options.render_timeout {
            Some(limit) => tokio::time::timeout(limit, app_ref.when_stable())
                .await
                .map_err(|_| RenderError::RenderTimeout {
                    duration_ms: duration_ms(limit),
                })?,
            None => app_ref.when_stable().await,
        }
    }

    fn run_hook(&self, instance: &dyn AppInstance) -> Result<(), RenderError> {
        let Some(hook) = &self.inner.options.on_stable else {
            return Ok(());
        };

        match catch_unwind(AssertUnwindSafe(|| hook(instance, &self.inner.options))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RenderError::hook(instance.name(), e)),
            Err(panic) => Err(RenderError::hook(
                instance.name(),
                format!("hook panicked: {}", panic_message(&*panic)),
            )),
        }
    }
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("options", &self.inner.options)
            .field("templates", &self.inner.templates)
            .field("compiled", &self.inner.compiled.initialized())
            .finish()
    }
}

/// A constructed instance that has not been destroyed yet.
///
/// Dropping it destroys the instance, which covers renders cancelled while
/// awaiting stability.
struct LiveInstance {
    instance: Box<dyn AppInstance>,
    destroyed: bool,
}

impl LiveInstance {
    fn new(instance: Box<dyn AppInstance>) -> Self {
        Self {
            instance,
            destroyed: false,
        }
    }

    fn get(&self) -> &dyn AppInstance {
        self.instance.as_ref()
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            destroy_quietly(self.instance.as_mut());
        }
    }
}

impl Drop for LiveInstance {
    fn drop(&mut self) {
        if !self.destroyed {
            debug!(module = %self.instance.name(), "Render dropped before completion");
            self.destroy();
        }
    }
}

fn destroy_quietly(instance: &mut dyn AppInstance) {
    match catch_unwind(AssertUnwindSafe(|| instance.destroy())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(module = %instance.name(), error = %e, "Error destroying application instance");
        }
        Err(panic) => warn!(
            module = %instance.name(),
            panic = %panic_message(&*panic),
            "Application instance panicked while being destroyed"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_target_fails_before_reading_template() {
        let engine = create_engine(SetupOptions::default());
        let ctx = RenderContext::new(crate::context::RenderRequest::get("/"));

        let err = engine
            .render_to_string("/nonexistent/shell.html", ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::MissingBootstrapTarget));
        assert!(engine.templates().is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(Duration::from_secs(2)), 2000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
