//! TCP front end feeding requests to a [`Dispatcher`].
//!
//! One task per accepted connection reads the request head, attaches the
//! connection to a [`Request`] according to the [`UpgradeMode`] and hands it
//! to the dispatcher.
//!
//! # Example
//!
//! ```ignore
//! use ws_transport::{Dispatcher, Server, Transport};
//!
//! # async fn example() -> ws_transport::Result<()> {
//! let transport = Transport::new()?;
//! let server = Server::builder()
//!     .port(8000)
//!     .dispatcher(Dispatcher::standard(transport))
//!     .build()
//!     .await?;
//!
//! println!("listening on {}", server.ws_url("/ws"));
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::backend::markers;
use crate::error::{Error, Result};
use crate::transport::{BoxedIo, Request};

use super::builder::ServerBuilder;
use super::dispatcher::Dispatcher;
use super::http::{RequestHead, Rewind, StaticResponse, read_head};

// ============================================================================
// Constants
// ============================================================================

/// Value reported under [`markers::SERVER_SOFTWARE`].
pub const SERVER_SOFTWARE: &str = concat!("ws-transport/", env!("CARGO_PKG_VERSION"));

/// Accept timeout between shutdown-flag checks.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// UpgradeMode
// ============================================================================

/// Who performs the WebSocket handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpgradeMode {
    /// The server upgrades matching requests and attaches the WebSocket.
    #[default]
    Server,
    /// The server attaches the raw stream and sets [`markers::STREAM`];
    /// the transport performs the handshake.
    Backend,
}

// ============================================================================
// Server
// ============================================================================

/// Running TCP front end.
///
/// Created through [`Server::builder`]. The accept loop runs until
/// [`Server::shutdown`] is called; connections already handed to the
/// dispatcher keep running to completion.
pub struct Server {
    /// Bound address.
    local_addr: SocketAddr,

    /// Routing table.
    dispatcher: Dispatcher,

    /// Handshake placement.
    upgrade_mode: UpgradeMode,

    /// Request head size limit.
    max_head_bytes: usize,

    /// Connections currently being served.
    active: AtomicUsize,

    /// Shutdown flag.
    shutdown: AtomicBool,

    /// Accept loop task.
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Server - Constructor
// ============================================================================

impl Server {
    /// Creates a configuration builder for the server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listener and starts the accept loop.
    pub(crate) async fn start(
        addr: SocketAddr,
        dispatcher: Dispatcher,
        upgrade_mode: UpgradeMode,
        max_head_bytes: usize,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, ?upgrade_mode, "Server bound");

        let server = Arc::new(Self {
            local_addr,
            dispatcher,
            upgrade_mode,
            max_head_bytes,
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            accept_task: Mutex::new(None),
        });

        let server_clone = Arc::clone(&server);
        let task = tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });
        *server.accept_task.lock() = Some(task);

        info!(%local_addr, "Server started");

        Ok(server)
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the handshake placement.
    #[inline]
    #[must_use]
    pub fn upgrade_mode(&self) -> UpgradeMode {
        self.upgrade_mode
    }

    /// Returns the number of connections currently being served.
    #[inline]
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns a `ws://` URL for `path` on this server.
    ///
    /// Unspecified bind addresses are reported as loopback.
    #[must_use]
    pub fn ws_url(&self, path: &str) -> String {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr {
                SocketAddr::V4(_) => std::net::Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => std::net::Ipv6Addr::LOCALHOST.into(),
            });
        }
        format!("ws://{addr}{path}")
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    pub async fn shutdown(&self) {
        info!(local_addr = %self.local_addr, "Server shutting down");

        self.shutdown.store(true, Ordering::SeqCst);

        let task = self.accept_task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        info!("Server shutdown complete");
    }
}

// ============================================================================
// Server - Accept Loop
// ============================================================================

impl Server {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _active = ActiveConnection::enter(&server.active);
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Serves a single TCP connection.
    async fn handle_connection(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let (head, consumed) = match read_head(&mut stream, self.max_head_bytes).await {
            Ok(read) => read,
            Err(e) => {
                let _ = StaticResponse::bad_request().write_to(&mut stream).await;
                return Err(e);
            }
        };

        debug!(
            ?addr,
            method = %head.method,
            path = %head.path,
            upgrade = head.is_websocket_upgrade(),
            "Request received"
        );

        let request = self
            .attach(&head, Rewind::new(consumed, stream))
            .await?;
        self.dispatcher.dispatch(request).await
    }

    /// Builds the request and attaches the connection to it.
    async fn attach(&self, head: &RequestHead, io: Rewind<TcpStream>) -> Result<Request> {
        let request = Request::new(head.path.clone())
            .with_method(head.method.clone())
            .with_environ(head.environ())
            .with_env(markers::SERVER_SOFTWARE, SERVER_SOFTWARE);

        match self.upgrade_mode {
            UpgradeMode::Server if head.is_websocket_upgrade() => {
                let io: BoxedIo = Box::new(io);
                let websocket = tokio_tungstenite::accept_async(io)
                    .await
                    .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;
                Ok(request.with_websocket(websocket))
            }
            UpgradeMode::Backend if head.is_websocket_upgrade() => {
                Ok(request.with_env(markers::STREAM, "1").with_stream(io))
            }
            UpgradeMode::Server | UpgradeMode::Backend => Ok(request.with_stream(io)),
        }
    }
}

// ============================================================================
// ActiveConnection
// ============================================================================

/// Counts one connection as active for as long as it lives.
///
/// The count is released on drop, so a panicking connection task still
/// decrements it.
struct ActiveConnection<'a>(&'a AtomicUsize);

impl<'a> ActiveConnection<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
