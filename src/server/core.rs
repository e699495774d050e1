//! Playground server.
//!
//! The [`Server`] owns the configuration, the shared [`Runner`] and the
//! registry of live connections. [`Server::bind`] produces a
//! [`BoundServer`] whose accept loop serves until [`Server::shutdown`].
//!
//! # Example
//!
//! ```no_run
//! use playground_server::Server;
//!
//! # async fn example() -> playground_server::Result<()> {
//! let server = Server::builder().addr("127.0.0.1:8080").build()?;
//! let bound = server.bind().await?;
//! println!("Server is running at {}", bound.ws_url());
//!
//! let handle = server.clone();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.shutdown();
//! });
//!
//! bound.serve().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::execution::Runner;
use crate::identifiers::ConnectionId;
use crate::transport::{Session, UpgradeRequest};

use super::builder::ServerBuilder;

// ============================================================================
// Types
// ============================================================================

/// Live connection tasks by connection ID.
type ConnectionMap = FxHashMap<ConnectionId, AbortHandle>;

/// Internal shared state for the server.
pub(crate) struct ServerInner {
    /// Configured listen address.
    addr: SocketAddr,
    /// Path that accepts WebSocket upgrades.
    path: String,
    /// Largest accepted frame payload.
    max_payload: u64,
    /// Shared by every session.
    runner: Runner,
    /// Live connections.
    connections: Mutex<ConnectionMap>,
    /// Flips to `true` on shutdown.
    shutdown_tx: watch::Sender<bool>,
}

// ============================================================================
// Server
// ============================================================================

/// Live-code playground server.
///
/// Cheap to clone; clones share state, so a clone can be used to shut down
/// a server that is serving elsewhere.
#[derive(Clone)]
pub struct Server {
    /// Shared inner state.
    pub(crate) inner: Arc<ServerInner>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.inner.addr)
            .field("path", &self.inner.path)
            .field("connection_count", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Creates a configuration builder for the server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates a server from validated parts.
    pub(crate) fn new(addr: SocketAddr, path: String, max_payload: u64, runner: Runner) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ServerInner {
                addr,
                path,
                max_payload,
                runner,
                connections: Mutex::new(ConnectionMap::default()),
                shutdown_tx,
            }),
        }
    }

    /// Returns the configured listen address.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Returns the upgrade path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Returns the shared runner.
    #[inline]
    #[must_use]
    pub fn runner(&self) -> &Runner {
        &self.inner.runner
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Binds the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(&self) -> Result<BoundServer> {
        let listener = TcpListener::bind(self.inner.addr).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Listener bound");

        Ok(BoundServer {
            server: self.clone(),
            listener,
            local_addr,
        })
    }

    /// Stops the accept loop and aborts every live connection.
    pub fn shutdown(&self) {
        info!("Server shutting down");
        self.inner.shutdown_tx.send_replace(true);
    }
}

// ============================================================================
// Server - Connections
// ============================================================================

impl Server {
    /// Spawns the task serving one accepted stream.
    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId::new();
        let server = self.clone();

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        // Held across spawn so the task cannot deregister before it is registered.
        let mut connections = self.inner.connections.lock();
        let handle = tokio::spawn(async move {
            if let Err(e) = server.handle_connection(stream, peer, id).await {
                if e.is_clean_close() {
                    debug!(connection_id = %id, %peer, "Client left before upgrading");
                } else if matches!(e, Error::Handshake { .. }) {
                    warn!(connection_id = %id, %peer, error = %e, "WebSocket upgrade failed");
                } else {
                    warn!(connection_id = %id, %peer, error = %e, "Connection handling failed");
                }
            }
            server.inner.connections.lock().remove(&id);
        });
        connections.insert(id, handle.abort_handle());
    }

    /// Routes one request and, for an upgrade, runs its session.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, id: ConnectionId) -> Result<()> {
        let request = UpgradeRequest::read(stream).await?;

        if request.head().path() != self.inner.path {
            debug!(connection_id = %id, path = %request.head().path(), "No route");
            return request.respond(404, "Not Found", "Not Found").await;
        }

        let transport = request.accept().await?;
        info!(connection_id = %id, %peer, "WebSocket connection established");

        let reason = Session::new(transport, id, self.inner.runner.clone(), self.inner.max_payload)
            .run()
            .await;

        info!(connection_id = %id, ?reason, "Connection closed");
        Ok(())
    }

    /// Aborts every live connection task.
    fn abort_connections(&self) {
        let connections: Vec<_> = self.inner.connections.lock().drain().collect();
        let count = connections.len();

        for (id, handle) in connections {
            handle.abort();
            debug!(connection_id = %id, "Connection aborted");
        }

        if count > 0 {
            info!(count, "Aborted live connections");
        }
    }
}

// ============================================================================
// BoundServer
// ============================================================================

/// A server with a bound listener, ready to serve.
#[derive(Debug)]
pub struct BoundServer {
    server: Server,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// Returns the address actually bound (useful with port 0).
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL, `ws://<addr><path>`.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.server.inner.path)
    }

    /// Accepts connections until [`Server::shutdown`] is called.
    ///
    /// Accept failures are logged and do not stop the loop.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for fatal listener errors.
    pub async fn serve(self) -> Result<()> {
        let mut shutdown_rx = self.server.inner.shutdown_tx.subscribe();
        info!(addr = %self.local_addr, path = %self.server.inner.path, "Server started");

        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "New TCP connection");
                        self.server.spawn_connection(stream, peer);
                    }
                    Err(e) => error!(error = %e, "Accept failed"),
                },
                _ = shutdown_rx.changed() => {}
            }
        }

        self.server.abort_connections();
        info!("Server stopped");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
