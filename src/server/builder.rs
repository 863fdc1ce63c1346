//! Builder pattern for server configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! use ws_transport::{Server, StaticResponse, Transport, UpgradeMode};
//!
//! # async fn example() -> ws_transport::Result<()> {
//! let transport = Transport::new()?;
//! let server = Server::builder()
//!     .bind(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000)
//!     .upgrade_mode(UpgradeMode::Backend)
//!     .route("/ws", transport)
//!     .route("/", StaticResponse::html("WebSocket server is running"))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use crate::error::{Error, Result};

use super::core::{Server, UpgradeMode};
use super::dispatcher::{Dispatcher, Route};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default request head size limit.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 8 * 1024;

/// Smallest accepted request head size limit.
const MIN_HEAD_BYTES: usize = 256;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`Server`].
///
/// Defaults: `127.0.0.1`, random port, [`UpgradeMode::Server`], 8 KiB head
/// limit, no routes.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    /// Bind address.
    ip: IpAddr,

    /// Bind port (0 for random).
    port: u16,

    /// Handshake placement.
    upgrade_mode: UpgradeMode,

    /// Request head size limit.
    max_head_bytes: usize,

    /// Routing table.
    dispatcher: Dispatcher,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            ip: DEFAULT_BIND_IP,
            port: 0,
            upgrade_mode: UpgradeMode::default(),
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            dispatcher: Dispatcher::new(),
        }
    }
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address and port.
    #[inline]
    #[must_use]
    pub fn bind(mut self, ip: IpAddr, port: u16) -> Self {
        self.ip = ip;
        self.port = port;
        self
    }

    /// Sets the bind port, keeping the address.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets who performs the WebSocket handshake.
    #[inline]
    #[must_use]
    pub fn upgrade_mode(mut self, mode: UpgradeMode) -> Self {
        self.upgrade_mode = mode;
        self
    }

    /// Sets the request head size limit.
    #[inline]
    #[must_use]
    pub fn max_head_bytes(mut self, bytes: usize) -> Self {
        self.max_head_bytes = bytes;
        self
    }

    /// Appends a route to the current routing table.
    #[inline]
    #[must_use]
    pub fn route(mut self, prefix: impl Into<String>, route: impl Into<Route>) -> Self {
        self.dispatcher = self.dispatcher.route(prefix, route);
        self
    }

    /// Replaces the routing table.
    #[inline]
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Binds the listener and starts the server.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no routes are configured or the head limit is
    ///   too small
    /// - [`Error::Io`] if binding fails
    pub async fn build(self) -> Result<Arc<Server>> {
        self.validate()?;

        Server::start(
            SocketAddr::new(self.ip, self.port),
            self.dispatcher,
            self.upgrade_mode,
            self.max_head_bytes,
        )
        .await
    }

    fn validate(&self) -> Result<()> {
        if self.dispatcher.is_empty() {
            return Err(Error::config("at least one route is required"));
        }

        if self.max_head_bytes < MIN_HEAD_BYTES {
            return Err(Error::config(format!(
                "max_head_bytes must be at least {MIN_HEAD_BYTES}"
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
