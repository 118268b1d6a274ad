//! Application model: what a platform bootstraps and what the renderer observes.
//!
//! - [`AppInstance`]: one bootstrapped, request-scoped application
//! - [`ModuleFactory`] / [`SourceModule`]: the two forms of [`BootstrapTarget`]
//! - [`PlatformState`]: the document-state holder
//! - [`ApplicationRef`]: the stability source

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use ssr_engine_common::RenderError;

use crate::injector::Injector;

/// One bootstrapped instance of an application, scoped to a single render.
pub trait AppInstance: Send + Sync {
    /// Module name, used in logs and errors.
    fn name(&self) -> &str;

    /// The instance's injector. Contains every provider of the render plus
    /// the platform's [`PlatformState`] and [`ApplicationRef`].
    fn injector(&self) -> &Injector;

    /// Tear the instance down. Called exactly once per instance.
    fn destroy(&mut self) -> Result<(), RenderError>;
}

/// A compiled application, ready to be instantiated.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    /// Module name, used in logs and errors.
    fn name(&self) -> &str;

    /// Construct a new instance wired with `injector`.
    async fn create(&self, injector: Injector) -> Result<Box<dyn AppInstance>, RenderError>;
}

/// An application in source form; compiled into a [`ModuleFactory`] on bootstrap.
#[async_trait]
pub trait SourceModule: Send + Sync {
    /// Module name, used in logs and errors.
    fn name(&self) -> &str;

    /// Compile the module.
    async fn compile(&self) -> Result<Arc<dyn ModuleFactory>, RenderError>;
}

/// What the render engine instantiates for every request.
#[derive(Clone)]
pub enum BootstrapTarget {
    /// A pre-compiled module factory.
    CompiledFactory(Arc<dyn ModuleFactory>),
    /// A module that is compiled as part of bootstrap.
    SourceModule(Arc<dyn SourceModule>),
}

impl BootstrapTarget {
    /// Wrap a compiled factory.
    pub fn factory(factory: impl ModuleFactory + 'static) -> Self {
        Self::CompiledFactory(Arc::new(factory))
    }

    /// Wrap a source module.
    pub fn source(module: impl SourceModule + 'static) -> Self {
        Self::SourceModule(Arc::new(module))
    }

    /// Name of the wrapped module.
    pub fn name(&self) -> &str {
        match self {
            Self::CompiledFactory(factory) => factory.name(),
            Self::SourceModule(module) => module.name(),
        }
    }
}

impl fmt::Debug for BootstrapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompiledFactory(factory) => {
                f.debug_tuple("CompiledFactory").field(&factory.name()).finish()
            }
            Self::SourceModule(module) => {
                f.debug_tuple("SourceModule").field(&module.name()).finish()
            }
        }
    }
}

/// Holds the document an application renders into.
#[derive(Debug, Default)]
pub struct PlatformState {
    document: Mutex<String>,
}

impl PlatformState {
    /// Start from the given shell document.
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(document.into()),
        }
    }

    /// Replace the document.
    pub fn set_document(&self, document: impl Into<String>) {
        *self.document.lock() = document.into();
    }

    /// Apply an edit to the document in place.
    pub fn update(&self, edit: impl FnOnce(&mut String)) {
        edit(&mut self.document.lock());
    }

    /// Serialize the document.
    pub fn render_to_string(&self) -> String {
        self.document.lock().clone()
    }
}

/// Stability of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Work is still pending.
    Pending,
    /// All pending work has settled.
    Stable,
    /// The application failed; see [`ApplicationRef::take_error`].
    Failed,
}

/// Stability source of an application instance.
///
/// Applications register outstanding work with [`ApplicationRef::begin_task`].
/// When the last task guard is dropped the application becomes stable, unless
/// it already failed. A failure is sticky and carries the original error.
pub struct ApplicationRef {
    state: watch::Sender<Stability>,
    pending: AtomicUsize,
    error: Mutex<Option<RenderError>>,
}

impl ApplicationRef {
    /// A new application with no work registered, in `Pending` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(Stability::Pending);
        Self {
            state,
            pending: AtomicUsize::new(0),
            error: Mutex::new(None),
        }
    }

    /// Current stability.
    pub fn stability(&self) -> Stability {
        *self.state.borrow()
    }

    /// Returns `true` once the application is stable.
    pub fn is_stable(&self) -> bool {
        self.stability() == Stability::Stable
    }

    /// Number of tasks still pending.
    pub fn pending_tasks(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Observe stability changes.
    pub fn subscribe(&self) -> watch::Receiver<Stability> {
        self.state.subscribe()
    }

    /// Register outstanding work. The application cannot become stable
    /// until the returned guard is dropped.
    pub fn begin_task(self: &Arc<Self>) -> PendingTask {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.state.send_if_modified(|state| {
            if *state == Stability::Stable {
                *state = Stability::Pending;
                true
            } else {
                false
            }
        });
        PendingTask {
            app: Arc::clone(self),
        }
    }

    /// Mark the application stable if no task is pending.
    pub fn settle(&self) {
        if self.pending_tasks() == 0 {
            self.mark_stable();
        }
    }

    /// Mark the application stable, unless it failed.
    pub fn mark_stable(&self) {
        self.state.send_if_modified(|state| {
            if *state == Stability::Pending {
                *state = Stability::Stable;
                true
            } else {
                false
            }
        });
    }

    /// Record a failure. Only the first failure is kept.
    pub fn fail(&self, error: RenderError) {
        {
            let mut slot = self.error.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(error);
        }
        self.state.send_replace(Stability::Failed);
    }

    /// Take the recorded failure, if any.
    pub fn take_error(&self) -> Option<RenderError> {
        self.error.lock().take()
    }

    /// Wait for the first `Stable` or `Failed` notification.
    ///
    /// Later notifications are not observed.
    pub async fn when_stable(&self) -> Result<(), RenderError> {
        let mut rx = self.subscribe();
        let outcome = rx
            .wait_for(|state| *state != Stability::Pending)
            .await
            .map(|state| *state);

        match outcome {
            Ok(Stability::Stable) => Ok(()),
            _ => Err(self
                .take_error()
                .unwrap_or_else(|| RenderError::stability_failed("unknown", "stability source closed"))),
        }
    }

    fn finish_task(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.mark_stable();
        }
    }
}

impl Default for ApplicationRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApplicationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationRef")
            .field("stability", &self.stability())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

/// Guard for outstanding application work.
#[must_use = "the task is finished as soon as the guard is dropped"]
pub struct PendingTask {
    app: Arc<ApplicationRef>,
}

impl Drop for PendingTask {
    fn drop(&mut self) {
        self.app.finish_task();
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask").finish_non_exhaustive()
    }
}
