//! HTTP server lifecycle.
//!
//! One [`Server`] owns one listener at a time and moves through
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. Transitions are
//! compare-and-swap on an atomic, so concurrent `start`/`stop` calls cannot
//! both win.

use axum::Router;
use std::{
    io::ErrorKind,
    net::SocketAddr,
    sync::{
        Mutex,
        atomic::{AtomicU8, Ordering},
    },
};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already started")]
    AlreadyStarted,
    #[error("server is not running")]
    NotRunning,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server terminated with error: {0}")]
    Serve(#[from] std::io::Error),
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

pub struct Server {
    router: Router,
    state: AtomicU8,
    running: Mutex<Option<Running>>,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            state: AtomicU8::new(ServerState::Stopped as u8),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_running().as_ref().map(|r| r.local_addr)
    }

    fn transition(&self, from: ServerState, to: ServerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind `addr` and serve in a background task.
    ///
    /// Binding a wildcard host without permission falls back to loopback.
    pub async fn start(&self, addr: &str) -> Result<SocketAddr, ServerError> {
        if !self.transition(ServerState::Stopped, ServerState::Starting) {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = match bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                self.state
                    .store(ServerState::Stopped as u8, Ordering::Release);
                return Err(err);
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(source) => {
                self.state
                    .store(ServerState::Stopped as u8, Ordering::Release);
                return Err(ServerError::Bind {
                    addr: addr.to_string(),
                    source,
                });
            }
        };

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let router = self.router.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        *self.lock_running() = Some(Running {
            local_addr,
            shutdown,
            handle,
        });
        self.state
            .store(ServerState::Running as u8, Ordering::Release);
        tracing::info!("Server listening on http://{}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn stop(&self) -> Result<(), ServerError> {
        if !self.transition(ServerState::Running, ServerState::Stopping) {
            return Err(ServerError::NotRunning);
        }

        let running = self.lock_running().take();
        let result = match running {
            Some(running) => {
                running.shutdown.cancel();
                match running.handle.await {
                    Ok(served) => served.map_err(ServerError::from),
                    Err(join) => Err(ServerError::from(join)),
                }
            }
            None => Ok(()),
        };

        self.state
            .store(ServerState::Stopped as u8, Ordering::Release);
        tracing::info!("Server stopped");
        result
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            let Some((host, port)) = addr.rsplit_once(':') else {
                return Err(bind_err(err));
            };
            if !matches!(host, "0.0.0.0" | "::" | "[::]") {
                return Err(bind_err(err));
            }
            let fallback_addr = format!("127.0.0.1:{port}");
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await.map_err(bind_err)
        }
        Err(err) => Err(bind_err(err)),
    }
}
