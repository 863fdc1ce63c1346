//! Callback-driven backend.
//!
//! Models a hosting runtime that reports connection activity through
//! callbacks. A driver loop turns the WebSocket stream into `on_open`,
//! `on_message` and `on_close` calls on a [`ConnectionHandler`]; the
//! transport's handler turns those into events on the hub and the
//! connection's [`Socket`].
//!
//! # Event Loop
//!
//! The driver multiplexes two sources with `tokio::select!`:
//!
//! - Incoming frames from the peer (data, close, errors)
//! - Outbound commands from the socket handle (`send`, `close`)
//!
//! Control frames (ping/pong) are answered by tungstenite and never surface.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::events::{CLOSE, EventArgs, MESSAGE, OPEN};
use crate::payload::{CloseReason, Payload};
use crate::socket::{Socket, SocketCommand};
use crate::transport::{EventHub, WebSocket};

use super::{Backend, BackendFactory, is_end_of_stream};

// ============================================================================
// Constants
// ============================================================================

/// Backend name.
pub const NAME: &str = "callback";

/// Probe candidate for this backend.
pub const FACTORY: BackendFactory = BackendFactory::new(NAME, make);

// ============================================================================
// Factory
// ============================================================================

#[cfg(feature = "callback-backend")]
fn make(hub: &EventHub) -> Result<Box<dyn Backend>> {
    super::require_runtime(NAME)?;
    Ok(Box::new(CallbackBackend::new(hub.clone())))
}

#[cfg(not(feature = "callback-backend"))]
fn make(_hub: &EventHub) -> Result<Box<dyn Backend>> {
    Err(crate::error::Error::backend_unavailable(
        NAME,
        "compiled without the `callback-backend` feature",
    ))
}

// ============================================================================
// ConnectionHandler
// ============================================================================

/// Callback surface of one hosted connection.
pub(crate) trait ConnectionHandler: Send {
    /// The connection is open; `outbound` reaches the connection's writer.
    fn on_open(&mut self, outbound: mpsc::UnboundedSender<SocketCommand>);

    /// A data frame arrived. `None` marks the end of the stream.
    fn on_message(&mut self, payload: Option<Payload>);

    /// The connection closed.
    fn on_close(&mut self, reason: CloseReason);
}

// ============================================================================
// TransportApplication
// ============================================================================

/// Connection handler that publishes into the transport hub.
///
/// Owns the connection's [`Socket`] for the connection's lifetime.
pub(crate) struct TransportApplication {
    hub: EventHub,
    socket: Option<Socket>,
}

impl TransportApplication {
    pub(crate) fn new(hub: EventHub) -> Self {
        Self { hub, socket: None }
    }
}

impl ConnectionHandler for TransportApplication {
    fn on_open(&mut self, outbound: mpsc::UnboundedSender<SocketCommand>) {
        let socket = Socket::with_writer(outbound);
        debug!(socket_id = %socket.id(), "Socket opened");

        self.socket = Some(socket.clone());
        self.hub.emit(OPEN, EventArgs::Open(socket));
    }

    fn on_message(&mut self, payload: Option<Payload>) {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            trace!("No payload, nothing to forward");
            return;
        };

        // Decoded once, then delivered to both emitters
        let args = EventArgs::Message(payload.decode());
        self.hub.events().emit(MESSAGE, &args);

        if let Some(socket) = &self.socket {
            socket.events().emit(MESSAGE, &args);
        }
    }

    fn on_close(&mut self, reason: CloseReason) {
        if let Some(socket) = &self.socket {
            debug!(socket_id = %socket.id(), %reason, "Socket closed");
        }

        self.hub.emit(CLOSE, EventArgs::Close(reason.clone()));

        if let Some(socket) = self.socket.take() {
            socket.emit(CLOSE, EventArgs::Close(reason));
            // Listeners may hold clones of their own socket.
            socket.events().clear();
        }
    }
}

// ============================================================================
// CallbackBackend
// ============================================================================

/// Full-featured backend: `open`, `message`, `close` and outbound sends.
#[derive(Debug, Clone)]
pub struct CallbackBackend {
    hub: EventHub,
}

impl CallbackBackend {
    /// Creates a backend publishing into `hub`.
    #[inline]
    #[must_use]
    pub fn new(hub: EventHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Backend for CallbackBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn serve(&self, websocket: WebSocket) -> Result<()> {
        drive(websocket, TransportApplication::new(self.hub.clone())).await
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Runs one connection, reporting activity to `handler`.
///
/// `on_open` fires before the first read and `on_close` fires exactly once
/// on the way out, whatever ended the connection.
pub(crate) async fn drive<H>(websocket: WebSocket, mut handler: H) -> Result<()>
where
    H: ConnectionHandler,
{
    let (mut ws_write, mut ws_read) = websocket.split();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let mut outcome = Ok(());

    handler.on_open(command_tx);

    let reason = loop {
        tokio::select! {
            // Incoming frames from the peer
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Close(frame))) => {
                        debug!("WebSocket closed by remote");
                        // Flushes the queued close reply
                        if let Err(e) = ws_write.close().await {
                            trace!(error = %e, "Close reply not delivered");
                        }
                        break CloseReason::from_frame(frame.as_ref());
                    }

                    Some(Ok(message)) => {
                        // Ping, Pong and raw frames carry no payload
                        if let Some(payload) = Payload::from_message(message) {
                            handler.on_message(Some(payload));
                        }
                    }

                    Some(Err(e)) if is_end_of_stream(&e) => {
                        debug!(error = %e, "WebSocket ended without close frame");
                        handler.on_message(None);
                        break CloseReason::abnormal();
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        outcome = Err(e.into());
                        break CloseReason::abnormal();
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        handler.on_message(None);
                        break CloseReason::abnormal();
                    }
                }
            }

            // Commands from socket handles
            Some(command) = command_rx.recv() => {
                match command {
                    SocketCommand::Send(frame) => {
                        if let Err(e) = ws_write.send(frame).await {
                            warn!(error = %e, "Failed to send frame");
                            if !is_end_of_stream(&e) {
                                outcome = Err(e.into());
                            }
                            break CloseReason::abnormal();
                        }
                    }

                    SocketCommand::Close(reason) => {
                        debug!(%reason, "Close requested locally");
                        let frame = reason.to_frame();
                        let sent = CloseReason::from_frame(Some(&frame));
                        if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
                            trace!(error = %e, "Close frame not delivered");
                        }
                        break sent;
                    }
                }
            }
        }
    };

    handler.on_close(reason);

    outcome
}

// ============================================================================
// Tests
// ============================================================================
