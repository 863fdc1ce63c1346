//! Pull-based, message-only backend.
//!
//! Models a hosting runtime that hands over a connection and lets the
//! application pull messages until the stream runs dry. This tier emits only
//! transport `message` events: no [`Socket`](crate::Socket) is constructed and
//! no `open`/`close` events are emitted.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::error::Result;
use crate::events::{EventArgs, MESSAGE};
use crate::payload::Payload;
use crate::transport::{EventHub, WebSocket};

use super::{Backend, BackendFactory, is_end_of_stream};

// ============================================================================
// Constants
// ============================================================================

/// Backend name.
pub const NAME: &str = "pull";

/// Probe candidate for this backend.
pub const FACTORY: BackendFactory = BackendFactory::new(NAME, make);

// ============================================================================
// Factory
// ============================================================================

#[cfg(feature = "pull-backend")]
fn make(hub: &EventHub) -> Result<Box<dyn Backend>> {
    super::require_runtime(NAME)?;
    Ok(Box::new(PullBackend::new(hub.clone())))
}

#[cfg(not(feature = "pull-backend"))]
fn make(_hub: &EventHub) -> Result<Box<dyn Backend>> {
    Err(crate::error::Error::backend_unavailable(
        NAME,
        "compiled without the `pull-backend` feature",
    ))
}

// ============================================================================
// PullBackend
// ============================================================================

/// Minimal backend that forwards inbound messages only.
#[derive(Debug, Clone)]
pub struct PullBackend {
    hub: EventHub,
}

impl PullBackend {
    /// Creates a backend publishing into `hub`.
    #[inline]
    #[must_use]
    pub fn new(hub: EventHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Backend for PullBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn serve(&self, mut websocket: WebSocket) -> Result<()> {
        let mut received = 0usize;

        loop {
            match wait(&mut websocket).await? {
                Some(payload) if !payload.is_empty() => {
                    received += 1;
                    self.hub.emit(MESSAGE, EventArgs::Message(payload));
                }
                _ => break,
            }
        }

        debug!(received, "Pull loop finished");

        if let Err(e) = websocket.close(None).await {
            trace!(error = %e, "Close after pull loop not delivered");
        }

        Ok(())
    }
}

/// Waits for the next data payload.
///
/// Returns `None` once the peer closes or disconnects.
async fn wait(websocket: &mut WebSocket) -> Result<Option<Payload>> {
    loop {
        match websocket.next().await {
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(message)) => {
                if let Some(payload) = Payload::from_message(message) {
                    return Ok(Some(payload));
                }
            }
            Some(Err(e)) if is_end_of_stream(&e) => return Ok(None),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::SinkExt;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::timeout;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use crate::events::{CLOSE, OPEN};
    use crate::transport::BoxedIo;

    const STEP: Duration = Duration::from_secs(5);

    async fn websocket_pair() -> (WebSocket, WebSocketStream<tokio::io::DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let server_io: BoxedIo = Box::new(server_io);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn test_forwards_messages_until_close() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let lifecycle = Arc::new(Mutex::new(0));

        let seen_clone = Arc::clone(&seen);
        hub.on_message(move |payload| seen_clone.lock().push(payload.clone()));
        let lifecycle_clone = Arc::clone(&lifecycle);
        hub.on(OPEN, move |_| *lifecycle_clone.lock() += 1);
        let lifecycle_clone = Arc::clone(&lifecycle);
        hub.on(CLOSE, move |_| *lifecycle_clone.lock() += 1);

        let (server, mut client) = websocket_pair().await;
        let backend = PullBackend::new(hub);
        let task = tokio::spawn(async move { backend.serve(server).await });

        client.send(Message::text(r#"{"a":1}"#)).await.expect("send");
        client.send(Message::text("not-json")).await.expect("send");
        client.send(Message::binary(b"[1]".to_vec())).await.expect("send");
        client.close(None).await.expect("close");

        timeout(STEP, task)
            .await
            .expect("serve finishes")
            .expect("join")
            .expect("serve ok");

        assert_eq!(
            *seen.lock(),
            vec![
                Payload::Json(json!({ "a": 1 })),
                Payload::text("not-json"),
                Payload::Json(json!([1])),
            ]
        );
        assert_eq!(*lifecycle.lock(), 0, "pull tier never emits open/close");
    }

    #[tokio::test]
    async fn test_empty_read_ends_loop() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        hub.on_message(move |payload| seen_clone.lock().push(payload.clone()));

        let (server, mut client) = websocket_pair().await;
        let backend = PullBackend::new(hub);
        let task = tokio::spawn(async move { backend.serve(server).await });

        client.send(Message::text("first")).await.expect("send");
        client.send(Message::text("")).await.expect("send");

        timeout(STEP, task)
            .await
            .expect("serve finishes")
            .expect("join")
            .expect("serve ok");

        assert_eq!(*seen.lock(), vec![Payload::text("first")]);
    }

    #[tokio::test]
    async fn test_peer_disconnect_ends_loop() {
        let hub = EventHub::new();
        let (server, client) = websocket_pair().await;
        let backend = PullBackend::new(hub);
        let task = tokio::spawn(async move { backend.serve(server).await });

        drop(client);

        timeout(STEP, task)
            .await
            .expect("serve finishes")
            .expect("join")
            .expect("disconnect is not an error");
    }
}
