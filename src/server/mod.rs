//! Proxy server: accept loop, shared state, graceful shutdown.

pub mod connection;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::listener;
use crate::proxy::ProxyClient;
use crate::routing::RouteTable;

/// State shared by every connection task.
pub struct ServerState {
    /// Constructed routes; read-only after startup.
    pub routes: RouteTable,
    /// Backend round-trip executor.
    pub proxy: ProxyClient,
    /// Emit access log lines.
    pub access_log: bool,
}

/// The proxy server.
pub struct Server {
    config: ServerConfig,
    state: Arc<ServerState>,
    shutdown_tx: watch::Sender<bool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Create a server from configuration and a constructed route table.
    pub fn new(config: ServerConfig, routes: RouteTable) -> Self {
        let proxy = ProxyClient::new(config.default_backend_timeout);
        let state = Arc::new(ServerState {
            routes,
            proxy,
            access_log: config.access_log,
        });
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            state,
            shutdown_tx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle that can trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Bind per configuration and serve until shutdown.
    pub async fn run(self) -> io::Result<()> {
        let listener = listener::bind(self.config.listen_addr)?;
        info!(addr = %self.config.listen_addr, routes = self.state.routes.len(), "listening");
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener (lets tests use an ephemeral
    /// port).
    pub async fn run_on(self, listener: TcpListener) -> io::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let state = Arc::clone(&self.state);
                    let active = Arc::clone(&self.active);
                    active.fetch_add(1, Ordering::SeqCst);

                    tokio::spawn(async move {
                        connection::handle(stream, peer, state).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                _ = shutdown_rx.changed() => {
                    info!("shutdown requested, draining connections");
                    break;
                }
            }
        }

        self.drain(self.config.shutdown_grace).await;
        Ok(())
    }

    /// Wait for in-flight connections to finish, up to `grace`.
    async fn drain(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        while self.active.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.active.load(Ordering::SeqCst),
                    "drain grace elapsed, abandoning connections"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        debug!("all connections drained");
    }
}
