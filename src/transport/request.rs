//! Inbound request context handed to the transport.
//!
//! A [`Request`] is what the hosting front end gives the transport: the
//! request path, string-keyed environment flags, and whatever connection the
//! front end attached. The transport only looks at the markers described in
//! [`crate::backend::markers`]; everything else is for the dispatcher.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

// ============================================================================
// Types
// ============================================================================

/// Byte stream a connection can run over.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased connection stream.
pub type BoxedIo = Box<dyn Io>;

/// WebSocket stream over a type-erased connection.
pub type WebSocket = WebSocketStream<BoxedIo>;

// ============================================================================
// Request
// ============================================================================

/// An inbound request as seen by the transport.
///
/// # Example
///
/// ```ignore
/// let request = Request::new("/ws")
///     .with_env(markers::STREAM, "1")
///     .with_stream(tcp_stream);
/// transport.handle(request).await?;
/// ```
pub struct Request {
    /// HTTP method.
    method: String,
    /// Request path, without query string.
    path: String,
    /// Environment flags set by the front end.
    environ: FxHashMap<String, String>,
    /// WebSocket already upgraded by the front end.
    websocket: Option<WebSocket>,
    /// Raw stream, positioned at the start of the request head.
    stream: Option<BoxedIo>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("environ", &self.environ)
            .field("websocket", &self.websocket.is_some())
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

impl Request {
    /// Creates a `GET` request for `path` with no attachments.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            environ: FxHashMap::default(),
            websocket: None,
            stream: None,
        }
    }

    /// Sets the HTTP method.
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets an environment flag.
    #[inline]
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environ.insert(key.into(), value.into());
        self
    }

    /// Merges several environment flags.
    #[must_use]
    pub fn with_environ<I, K, V>(mut self, environ: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environ
            .extend(environ.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attaches a WebSocket the front end already upgraded.
    #[inline]
    #[must_use]
    pub fn with_websocket(mut self, websocket: WebSocket) -> Self {
        self.websocket = Some(websocket);
        self
    }

    /// Attaches the raw connection stream.
    #[inline]
    #[must_use]
    pub fn with_stream(mut self, stream: impl Io) -> Self {
        self.stream = Some(Box::new(stream));
        self
    }

    /// Returns the HTTP method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns an environment flag.
    #[inline]
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environ.get(key).map(String::as_str)
    }

    /// Returns `true` if an upgraded WebSocket is attached.
    #[inline]
    #[must_use]
    pub fn has_websocket(&self) -> bool {
        self.websocket.is_some()
    }

    /// Returns `true` if a raw stream is attached.
    #[inline]
    #[must_use]
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Detaches the upgraded WebSocket.
    #[inline]
    pub fn take_websocket(&mut self) -> Option<WebSocket> {
        self.websocket.take()
    }

    /// Detaches the raw stream.
    #[inline]
    pub fn take_stream(&mut self) -> Option<BoxedIo> {
        self.stream.take()
    }
}

// ============================================================================
// Tests
// ============================================================================
