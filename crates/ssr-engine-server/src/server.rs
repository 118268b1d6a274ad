//! HTTP server lifecycle.
//!
//! [`SsrServer::run`] serves the render router until a shutdown signal
//! arrives. [`SsrServer::start_test`] serves the same router on an ephemeral
//! port and hands back a [`TestHandle`].

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use ssr_engine_common::{ConfigFile, RenderError, ServerConfigFile};

use crate::router::build_router;
use crate::state::AppState;

/// Listener and request settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Upper bound for a whole request, render included.
    pub request_timeout: Duration,
    /// Drain in-flight requests on SIGTERM/SIGINT.
    pub graceful_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(30),
            graceful_shutdown: true,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` table.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] when `bind_addr` is not a
    /// `host:port` socket address.
    pub fn from_file(file: &ServerConfigFile) -> Result<Self, RenderError> {
        let bind_addr = file.bind_addr.parse().map_err(|e| {
            RenderError::invalid_config(format!("bind_addr '{}' is not host:port: {e}", file.bind_addr))
        })?;

        Ok(Self {
            bind_addr,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            graceful_shutdown: file.graceful_shutdown,
        })
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Server-side rendering HTTP server.
///
/// ```ignore
/// let config = ConfigFile::from_file("ssr-engine.toml")?;
/// SsrServer::new(&config)?.run().await?;
/// ```
pub struct SsrServer {
    state: AppState,
    config: ServerConfig,
}

impl SsrServer {
    /// Build the application and listener settings from a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if either the `[app]` or the `[server]` table is
    /// invalid.
    pub fn new(config: &ConfigFile) -> Result<Self, RenderError> {
        let state = AppState::new(config)?;
        let server = ServerConfig::from_file(&config.server)?;
        Ok(Self::with_state(state, server))
    }

    pub fn with_state(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until shutdown.
    ///
    /// Drives the engine's epoch ticker for as long as the server runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self) -> Result<(), RenderError> {
        let Self { state, config } = self;
        let (listener, addr) = bind(config.bind_addr).await?;
        let ticker = state.wasm().and_then(|engine| engine.spawn_epoch_ticker());
        let router = build_router(state, config.request_timeout);

        info!(%addr, graceful = config.graceful_shutdown, "Serving rendered pages");

        let served = if config.graceful_shutdown {
            serve(listener, router, shutdown_signal()).await
        } else {
            serve(listener, router, std::future::pending()).await
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        served?;

        info!("Server stopped");
        Ok(())
    }

    /// Serve `state` on `127.0.0.1` with an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start_test(state: AppState) -> Result<TestHandle, RenderError> {
        let (listener, addr) = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let router = build_router(state.clone(), ServerConfig::default().request_timeout);
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(serve(listener, router, async {
            let _ = stopped.await;
        }));

        Ok(TestHandle {
            addr,
            state,
            stop,
            task,
        })
    }
}

/// A server started by [`SsrServer::start_test`].
pub struct TestHandle {
    addr: SocketAddr,
    state: AppState,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), RenderError>>,
}

impl TestHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:49152`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Ok(Err(e)) = self.task.await {
            error!(error = %e, "Test server failed");
        }
    }
}

async fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), RenderError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RenderError::invalid_config(format!("Failed to bind {addr}: {e}")))?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RenderError> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RenderError::invalid_config(format!("Server error: {e}")))
}

/// Resolves on SIGINT, or SIGTERM on unix.
///
/// A handler that fails to install is logged and never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }

    info!("Shutdown requested, draining connections");
}
