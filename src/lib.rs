//! WS Transport - Backend-agnostic WebSocket event transport.
//!
//! This library exposes WebSocket connections to application code as named
//! events, independent of the server backend that hosts them.
//!
//! # Architecture
//!
//! - **Transport**: Process-wide event hub; binds one backend at construction
//! - **Backend**: Drives a WebSocket and reports open / message / close
//! - **Socket**: Per-connection emitter with a process-unique id
//! - **Server**: Optional reference front end routing requests by path
//!
//! Key design principles:
//!
//! - Backends are probed in order; the first usable one is bound
//! - Text payloads that parse as JSON are delivered decoded
//! - Listeners run synchronously, in registration order
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_transport::{Dispatcher, Result, Server, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = Transport::new()?;
//!
//!     transport.on_open(|socket| {
//!         let id = socket.id();
//!         socket.on_message(move |payload| println!("socket[{id}] message: {payload}"));
//!         socket.on_close(move |reason| println!("socket[{id}] close: {reason}"));
//!     });
//!
//!     let server = Server::builder()
//!         .port(8000)
//!         .dispatcher(Dispatcher::standard(transport))
//!         .build()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backend`] | Backend trait, factories, probing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Named-event emitter and event arguments |
//! | [`payload`] | Inbound payloads, outbound messages, close reasons |
//! | [`server`] | Reference TCP front end and dispatcher |
//! | [`socket`] | Per-connection socket and id allocator |
//! | [`transport`] | Process-wide transport and request context |
//!
//! # Features
//!
//! - `callback-backend` (default): backend pushing open / message / close
//! - `pull-backend` (default): message-only backend reading in a loop

// ============================================================================
// Modules
// ============================================================================

/// Connection-hosting backends.
///
/// Use [`Transport::builder()`] to choose the probe order.
pub mod backend;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Named-event publish/subscribe.
pub mod events;

/// Message payload types.
pub mod payload;

/// Reference front end.
pub mod server;

/// Per-connection sockets.
pub mod socket;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Backend types
pub use backend::{Backend, BackendFactory, Mechanism};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{CLOSE, EventArgs, EventEmitter, Listener, MESSAGE, OPEN};

// Payload types
pub use payload::{CloseReason, OutboundMessage, Payload};

// Server types
pub use server::{Dispatcher, Route, Server, ServerBuilder, StaticResponse, UpgradeMode};

// Socket types
pub use socket::{Socket, SocketId};

// Transport types
pub use transport::{EventHub, Request, Transport, TransportBuilder};
