//! Process-wide WebSocket transport.
//!
//! The [`Transport`] is the single subscription point for applications. It
//! owns the [`EventHub`] and the backend selected at construction time.
//!
//! # Example
//!
//! ```ignore
//! use ws_transport::Transport;
//!
//! # async fn example() -> ws_transport::Result<()> {
//! let transport = Transport::builder().build()?;
//!
//! transport.on_open(|socket| {
//!     let id = socket.id();
//!     socket.on_message(move |payload| println!("socket[{id}] message: {payload}"));
//! });
//! transport.on_close(|reason| println!("connection close: {reason}"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, Mechanism};
use crate::error::{Error, Result};
use crate::events::EventArgs;
use crate::payload::{CloseReason, Payload};
use crate::socket::Socket;

use super::builder::TransportBuilder;
use super::hub::EventHub;
use super::request::Request;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the transport.
struct TransportInner {
    /// Process-wide emitter.
    hub: EventHub,
    /// Backend bound during construction.
    backend: Box<dyn Backend>,
}

// ============================================================================
// Transport
// ============================================================================

/// Backend-agnostic WebSocket event transport.
///
/// Cloning is cheap; clones share listeners and the bound backend.
///
/// # Events
///
/// | Event | Argument |
/// |-------|----------|
/// | `open` | [`Socket`] |
/// | `message` | [`Payload`] (decoded when it parses as JSON) |
/// | `close` | [`CloseReason`] |
///
/// # Blocking Contract
///
/// Listeners run synchronously on the connection's task. A slow listener
/// delays every later event of that connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

// ============================================================================
// Transport - Display
// ============================================================================

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("backend", &self.backend_name())
            .field("hub", &self.inner.hub)
            .finish()
    }
}

// ============================================================================
// Transport - Constructors
// ============================================================================

impl Transport {
    /// Creates a configuration builder for the transport.
    #[inline]
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Creates a transport probing the default backends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotFound`] if no backend is usable.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Assembles a transport from a hub and its bound backend.
    pub(crate) fn from_parts(hub: EventHub, backend: Box<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(TransportInner { hub, backend }),
        }
    }
}

// ============================================================================
// Transport - Public API
// ============================================================================

impl Transport {
    /// Returns the name of the bound backend.
    #[inline]
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Returns the process-wide hub.
    #[inline]
    #[must_use]
    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&EventArgs) + Send + Sync + 'static,
    {
        self.inner.hub.on(event, listener);
    }

    /// Registers a listener for `open` events.
    pub fn on_open<F>(&self, listener: F)
    where
        F: Fn(&Socket) + Send + Sync + 'static,
    {
        self.inner.hub.on_open(listener);
    }

    /// Registers a listener for `message` events.
    pub fn on_message<F>(&self, listener: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.inner.hub.on_message(listener);
    }

    /// Registers a listener for `close` events.
    pub fn on_close<F>(&self, listener: F)
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        self.inner.hub.on_close(listener);
    }

    /// Emits `event`, decoding `message` payloads first.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, args: EventArgs) -> usize {
        self.inner.hub.emit(event, args)
    }

    /// Handles one inbound request until its connection ends.
    ///
    /// The request markers decide how the WebSocket is obtained; the bound
    /// backend then drives it.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the request carries no WebSocket marker
    /// - [`Error::Connection`] if the WebSocket handshake fails
    /// - Any error the backend reports while serving
    pub async fn handle(&self, mut request: Request) -> Result<()> {
        let Some(mechanism) = Mechanism::detect(&request) else {
            warn!(path = request.path(), "Request has no WebSocket marker");
            return Err(Error::protocol(format!(
                "no WebSocket attached to request for {}",
                request.path()
            )));
        };

        debug!(
            path = request.path(),
            ?mechanism,
            backend = self.backend_name(),
            "Handling WebSocket request"
        );

        let websocket = mechanism.open(&mut request).await?;
        self.inner.backend.serve(websocket).await
    }
}

// ============================================================================
// Tests
// ============================================================================
