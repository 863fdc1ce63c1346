//! Connection handles and the process-wide identity allocator.
//!
//! Every [`Socket`] receives a [`SocketId`] from a single process-wide
//! counter at construction time.
//!
//! # Identity Allocation
//!
//! - The counter starts at 0 when the process starts and is never torn down.
//! - Each allocation atomically advances it to `(counter + 1) % i64::MAX` and
//!   returns the new value, so the first id handed out is 1.
//! - Ids are unique until the counter wraps after ~2^63 allocations.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

use crate::error::{Error, Result};
use crate::events::{CLOSE, EventArgs, EventEmitter, MESSAGE};
use crate::payload::{CloseReason, OutboundMessage, Payload};

// ============================================================================
// Constants
// ============================================================================

/// Counter modulus: the largest positive signed 64-bit integer.
const SOCKET_ID_MODULUS: u64 = i64::MAX as u64;

/// Process-wide id counter. Lives for the whole process.
static SOCKET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SocketId
// ============================================================================

/// Process-wide unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Allocates the next id from the process-wide counter.
    #[must_use]
    pub fn next() -> Self {
        let previous = match SOCKET_ID_COUNTER.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |current| Some(advance(current)),
        ) {
            Ok(previous) | Err(previous) => previous,
        };

        Self(advance(previous))
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Advances the counter by one, wrapping at the modulus.
#[inline]
const fn advance(current: u64) -> u64 {
    (current + 1) % SOCKET_ID_MODULUS
}

// ============================================================================
// SocketCommand
// ============================================================================

/// Commands forwarded from a socket handle to its connection task.
#[derive(Debug)]
pub(crate) enum SocketCommand {
    /// Write a frame.
    Send(Message),
    /// Send a close frame and stop.
    Close(CloseReason),
}

// ============================================================================
// Socket
// ============================================================================

/// Shared state behind a [`Socket`] handle.
struct SocketInner {
    /// Identity allocated at construction.
    id: SocketId,
    /// Connection-scoped events (`message`, `close`).
    events: EventEmitter<EventArgs>,
    /// Channel to the connection task's writer, if the backend provides one.
    outbound: Option<mpsc::UnboundedSender<SocketCommand>>,
}

/// One logical client connection.
///
/// `Socket` is a cheap handle; clones share the same id and listeners.
/// Listeners registered on a socket should capture [`Socket::id`] rather than
/// the socket itself, otherwise the socket keeps itself alive.
///
/// # Example
///
/// ```ignore
/// transport.on_open(|socket| {
///     let id = socket.id();
///     socket.on_message(move |payload| println!("socket[{id}] message: {payload}"));
///     socket.on_close(move |reason| println!("socket[{id}] close: {reason}"));
/// });
/// ```
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.inner.id)
            .field("events", &self.inner.events)
            .field("writable", &self.is_writable())
            .finish()
    }
}

impl Socket {
    /// Creates a socket without a writer.
    ///
    /// [`send`](Self::send) and [`close`](Self::close) fail with
    /// [`Error::ConnectionClosed`].
    #[must_use]
    pub fn detached() -> Self {
        Self::build(None)
    }

    /// Creates a socket whose outbound frames go to `outbound`.
    pub(crate) fn with_writer(outbound: mpsc::UnboundedSender<SocketCommand>) -> Self {
        Self::build(Some(outbound))
    }

    fn build(outbound: Option<mpsc::UnboundedSender<SocketCommand>>) -> Self {
        let id = SocketId::next();
        trace!(socket_id = %id, "Socket created");

        Self {
            inner: Arc::new(SocketInner {
                id,
                events: EventEmitter::new(),
                outbound,
            }),
        }
    }

    /// Returns the socket's process-wide id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.inner.id
    }

    /// Returns the socket's emitter.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventEmitter<EventArgs> {
        &self.inner.events
    }

    /// Registers a listener for a connection-scoped event.
    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&EventArgs) + Send + Sync + 'static,
    {
        self.inner.events.on(event, listener);
    }

    /// Registers a listener for `message` events.
    pub fn on_message<F>(&self, listener: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.on(MESSAGE, move |args| {
            if let Some(payload) = args.as_payload() {
                listener(payload);
            }
        });
    }

    /// Registers a listener for `close` events.
    pub fn on_close<F>(&self, listener: F)
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        self.on(CLOSE, move |args| {
            if let Some(reason) = args.as_close_reason() {
                listener(reason);
            }
        });
    }

    /// Emits a connection-scoped event.
    ///
    /// `message` payloads go through the opportunistic decode policy first.
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, args: EventArgs) -> usize {
        let args = if event == MESSAGE { args.decoded() } else { args };
        self.inner.events.emit(event, &args)
    }

    /// Returns `true` if the socket has a live writer.
    #[inline]
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.inner
            .outbound
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queues a message for the peer.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket has no writer or the
    ///   connection already ended
    /// - [`Error::Json`] if a JSON message fails to serialize
    pub fn send(&self, message: impl Into<OutboundMessage>) -> Result<()> {
        let frame = message.into().into_message()?;
        self.command(SocketCommand::Send(frame))
    }

    /// Serializes `value` and queues it as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Same as [`Socket::send`].
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(OutboundMessage::json(value)?)
    }

    /// Asks the connection to close with `reason`.
    ///
    /// The `close` event fires once the connection task has shut down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection already ended.
    pub fn close(&self, reason: impl Into<CloseReason>) -> Result<()> {
        self.command(SocketCommand::Close(reason.into()))
    }

    fn command(&self, command: SocketCommand) -> Result<()> {
        let outbound = self.inner.outbound.as_ref().ok_or(Error::ConnectionClosed)?;
        outbound
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_ids_strictly_increase_in_construction_order() {
        let ids: Vec<SocketId> = (0..64).map(|_| Socket::detached().id()).collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_first_id_is_nonzero() {
        assert!(SocketId::next().as_u64() > 0);
    }

    #[test]
    fn test_counter_wraps_to_zero() {
        assert_eq!(advance(0), 1);
        assert_eq!(advance(SOCKET_ID_MODULUS - 2), SOCKET_ID_MODULUS - 1);
        assert_eq!(advance(SOCKET_ID_MODULUS - 1), 0);
    }

    #[test]
    fn test_clones_share_identity_and_listeners() {
        let socket = Socket::detached();
        let clone = socket.clone();
        let hits = Arc::new(Mutex::new(0));

        let hits_clone = Arc::clone(&hits);
        clone.on_close(move |_| *hits_clone.lock() += 1);

        assert_eq!(socket.id(), clone.id());
        socket.emit(CLOSE, EventArgs::Close(CloseReason::new("normal")));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_emit_message_decodes_payload() {
        let socket = Socket::detached();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        socket.on_message(move |payload| seen_clone.lock().push(payload.clone()));

        socket.emit(MESSAGE, EventArgs::Message(Payload::text(r#"{"x":2}"#)));
        socket.emit(MESSAGE, EventArgs::Message(Payload::text("plain")));

        assert_eq!(
            *seen.lock(),
            vec![Payload::Json(json!({ "x": 2 })), Payload::text("plain")]
        );
    }

    #[test]
    fn test_detached_socket_cannot_send() {
        let socket = Socket::detached();
        assert!(!socket.is_writable());
        assert!(matches!(socket.send("hi"), Err(Error::ConnectionClosed)));
        assert!(matches!(socket.close("bye"), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_send_queues_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = Socket::with_writer(tx);

        socket.send(json!({ "ok": true })).expect("send");
        socket.close("done").expect("close");

        match rx.try_recv() {
            Ok(SocketCommand::Send(frame)) => assert_eq!(frame, Message::text(r#"{"ok":true}"#)),
            other => panic!("unexpected command: {other:?}"),
        }
        match rx.try_recv() {
            Ok(SocketCommand::Close(reason)) => assert_eq!(reason.reason(), "done"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_send_json_serializes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = Socket::with_writer(tx);

        socket.send_json(&[1, 2, 3]).expect("send");

        match rx.try_recv() {
            Ok(SocketCommand::Send(frame)) => assert_eq!(frame, Message::text("[1,2,3]")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_send_after_writer_dropped_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Socket::with_writer(tx);
        drop(rx);

        assert!(!socket.is_writable());
        assert!(matches!(socket.send("late"), Err(Error::ConnectionClosed)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_concurrent_accepts_yield_unique_ids(
            connections in 2usize..200,
            workers in 1usize..8,
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(workers)
                .build()
                .expect("runtime");

            let ids = runtime.block_on(async move {
                let handles: Vec<_> = (0..connections)
                    .map(|_| {
                        tokio::spawn(async {
                            tokio::task::yield_now().await;
                            Socket::detached().id()
                        })
                    })
                    .collect();

                let mut ids = Vec::with_capacity(handles.len());
                for handle in handles {
                    ids.push(handle.await.expect("join"));
                }
                ids
            });

            let unique: HashSet<SocketId> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), connections);
        }
    }
}
