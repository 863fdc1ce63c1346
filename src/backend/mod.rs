//! Connection-hosting backends and probe-and-fallback selection.
//!
//! A [`Backend`] translates one hosting model into events on the
//! [`EventHub`]. Backends are discovered at transport construction time by
//! trying an ordered list of [`BackendFactory`] values; the first factory that
//! succeeds is bound for the transport's lifetime.
//!
//! # Backends
//!
//! | Backend | Model | Events |
//! |---------|-------|--------|
//! | [`CallbackBackend`] | callback-driven | `open`, `message`, `close` (+ `Socket::send`) |
//! | [`PullBackend`] | pull loop | `message` only |
//!
//! # Per-request Mechanism Detection
//!
//! On every request the transport also inspects request markers
//! ([`Mechanism::detect`]) to decide how the WebSocket is obtained:
//!
//! 1. An already-upgraded WebSocket is attached → [`Mechanism::Upgraded`]
//! 2. The [`markers::STREAM`] flag is set and a raw stream is attached →
//!    [`Mechanism::RawStream`], the handshake runs here
//!
//! The bound backend then drives the resulting WebSocket.

// ============================================================================
// Submodules
// ============================================================================

/// Callback-driven backend.
pub mod callback;

/// Pull-based, message-only backend.
pub mod pull;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transport::{EventHub, Request, WebSocket};

// ============================================================================
// Re-exports
// ============================================================================

pub use callback::CallbackBackend;
pub use pull::PullBackend;

// ============================================================================
// Markers
// ============================================================================

/// Request-environment keys understood by the backends.
///
/// These are a contract between the hosting front end and the backends, not
/// part of the transport's event interface.
pub mod markers {
    /// Set by a front end that attached the raw connection stream and left
    /// the WebSocket handshake to the backend.
    pub const STREAM: &str = "ws_transport.stream";

    /// Name of the front end serving the request.
    pub const SERVER_SOFTWARE: &str = "SERVER_SOFTWARE";
}

// ============================================================================
// Backend
// ============================================================================

/// A connection-hosting backend bound to an [`EventHub`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Drives one connection until it ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails mid-stream. Peer
    /// disconnects are not errors.
    async fn serve(&self, websocket: WebSocket) -> Result<()>;
}

// ============================================================================
// BackendFactory
// ============================================================================

/// Constructor function for a backend.
pub type MakeBackend = fn(&EventHub) -> Result<Box<dyn Backend>>;

/// A named candidate in backend probing.
///
/// The factory fails with [`Error::BackendUnavailable`] when the facility
/// its backend needs is missing from this process.
#[derive(Clone, Copy)]
pub struct BackendFactory {
    name: &'static str,
    make: MakeBackend,
}

impl fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BackendFactory {
    /// Creates a named factory.
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str, make: MakeBackend) -> Self {
        Self { name, make }
    }

    /// Returns the candidate's name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Attempts to construct the backend.
    ///
    /// # Errors
    ///
    /// Whatever the factory function returns.
    pub fn make(&self, hub: &EventHub) -> Result<Box<dyn Backend>> {
        (self.make)(hub)
    }
}

/// Default candidates in probe order: callback first, then pull.
#[must_use]
pub fn default_factories() -> Vec<BackendFactory> {
    vec![callback::FACTORY, pull::FACTORY]
}

/// Binds the first candidate that constructs successfully.
///
/// Individual failures are logged and discarded.
///
/// # Errors
///
/// Returns [`Error::BackendNotFound`] if every candidate fails.
pub fn probe(hub: &EventHub, factories: &[BackendFactory]) -> Result<Box<dyn Backend>> {
    let mut tried = Vec::with_capacity(factories.len());

    for factory in factories {
        match factory.make(hub) {
            Ok(backend) => {
                info!(backend = backend.name(), "WebSocket backend selected");
                return Ok(backend);
            }
            Err(e) => {
                debug!(candidate = factory.name(), error = %e, "Backend candidate rejected");
                tried.push(factory.name().to_string());
            }
        }
    }

    Err(Error::backend_not_found(tried))
}

/// Fails unless a tokio runtime is running on this thread.
pub(crate) fn require_runtime(backend: &str) -> Result<()> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|e| Error::backend_unavailable(backend, e.to_string()))
}

// ============================================================================
// Mechanism
// ============================================================================

/// How the WebSocket for a request is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// The front end already performed the handshake.
    Upgraded,
    /// The front end attached the raw stream; the handshake runs here.
    RawStream,
}

impl Mechanism {
    /// Detects the mechanism from request markers.
    ///
    /// Returns `None` when the request carries no usable marker.
    #[must_use]
    pub fn detect(request: &Request) -> Option<Self> {
        if request.has_websocket() {
            return Some(Self::Upgraded);
        }

        if request.env(markers::STREAM).is_some() && request.has_stream() {
            return Some(Self::RawStream);
        }

        None
    }

    /// Takes the WebSocket out of `request`, upgrading if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the marked attachment is missing
    /// - [`Error::Connection`] if the WebSocket handshake fails
    pub(crate) async fn open(self, request: &mut Request) -> Result<WebSocket> {
        match self {
            Self::Upgraded => request
                .take_websocket()
                .ok_or_else(|| Error::protocol("upgraded WebSocket already taken")),
            Self::RawStream => {
                let stream = request
                    .take_stream()
                    .ok_or_else(|| Error::protocol("raw stream already taken"))?;

                tokio_tungstenite::accept_async(stream)
                    .await
                    .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `true` for errors that only mean the peer went away.
pub(crate) fn is_end_of_stream(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

// ============================================================================
// Tests
// ============================================================================
