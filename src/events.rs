//! Named-event publish/subscribe primitive.
//!
//! [`EventEmitter`] maps event names to ordered listener lists. Every other
//! component composes on top of it: the [`Transport`](crate::Transport) for
//! process-wide events and each [`Socket`] for connection-scoped ones.
//!
//! # Event Names
//!
//! | Name | Emitted on | Argument |
//! |------|------------|----------|
//! | [`OPEN`] | Transport | [`EventArgs::Open`] |
//! | [`MESSAGE`] | Transport, Socket | [`EventArgs::Message`] |
//! | [`CLOSE`] | Transport, Socket | [`EventArgs::Close`] |
//!
//! # Dispatch Contract
//!
//! - Listeners run synchronously on the emitting task, in registration order.
//! - Emitting a name with no listeners is a no-op.
//! - The listener list is snapshotted before dispatch, so a listener may
//!   register further listeners; those first fire on the next emission.
//! - A panicking listener unwinds into the caller of [`EventEmitter::emit`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::payload::{CloseReason, Payload};
use crate::socket::Socket;

// ============================================================================
// Constants
// ============================================================================

/// A connection was opened.
pub const OPEN: &str = "open";

/// A payload was received.
pub const MESSAGE: &str = "message";

/// A connection was closed.
pub const CLOSE: &str = "close";

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
///
/// Receives the emitted argument by reference.
pub type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

// ============================================================================
// EventArgs
// ============================================================================

/// Argument carried by transport and socket events.
#[derive(Debug, Clone)]
pub enum EventArgs {
    /// Payload of [`OPEN`]: the freshly opened socket.
    Open(Socket),
    /// Payload of [`MESSAGE`].
    Message(Payload),
    /// Payload of [`CLOSE`].
    Close(CloseReason),
}

impl EventArgs {
    /// Returns the socket of an `open` event.
    #[inline]
    #[must_use]
    pub fn as_socket(&self) -> Option<&Socket> {
        match self {
            Self::Open(socket) => Some(socket),
            _ => None,
        }
    }

    /// Returns the payload of a `message` event.
    #[inline]
    #[must_use]
    pub fn as_payload(&self) -> Option<&Payload> {
        match self {
            Self::Message(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the reason of a `close` event.
    #[inline]
    #[must_use]
    pub fn as_close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::Close(reason) => Some(reason),
            _ => None,
        }
    }

    /// Applies the opportunistic decode policy to a message payload.
    ///
    /// Non-message arguments are returned unchanged.
    #[must_use]
    pub fn decoded(self) -> Self {
        match self {
            Self::Message(payload) => Self::Message(payload.decode()),
            other => other,
        }
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Named-event publish/subscribe primitive.
///
/// # Thread Safety
///
/// `EventEmitter` is `Send + Sync` when `A` is. Registration and emission may
/// happen from different tasks; the listener map is guarded by a read-write
/// lock that is never held while listeners run.
///
/// # Example
///
/// ```ignore
/// let emitter = EventEmitter::<u32>::new();
/// emitter.on("tick", |n| println!("tick {n}"));
/// emitter.emit("tick", &1);
/// ```
pub struct EventEmitter<A> {
    /// Listeners by event name, in registration order.
    listeners: RwLock<FxHashMap<String, Vec<Listener<A>>>>,
}

impl<A> Default for EventEmitter<A> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<A> fmt::Debug for EventEmitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: FxHashMap<&str, usize> = listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();

        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .finish()
    }
}

impl<A> EventEmitter<A> {
    /// Creates an emitter with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `event`.
    ///
    /// The listener runs on every later emission of `event`.
    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let event = event.into();
        trace!(event = %event, "Listener registered");

        self.listeners
            .write()
            .entry(event)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Invokes every listener of `event` with `args`, in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, args: &A) -> usize {
        let snapshot = {
            let listeners = self.listeners.read();
            match listeners.get(event) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };

        trace!(event, count = snapshot.len(), "Emitting");

        for listener in &snapshot {
            listener(args);
        }

        snapshot.len()
    }

    /// Removes every listener of `event`.
    ///
    /// Returns how many listeners were removed.
    pub fn off(&self, event: &str) -> usize {
        self.listeners
            .write()
            .remove(event)
            .map_or(0, |list| list.len())
    }

    /// Removes every listener of every event.
    ///
    /// Returns how many listeners were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.listeners.write());
        removed.values().map(Vec::len).sum()
    }

    /// Returns the number of listeners registered for `event`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let emitter = EventEmitter::<String>::new();
        assert_eq!(emitter.emit("missing", &"x".to_string()), 0);
    }

    #[test]
    fn test_listeners_receive_args_unchanged() {
        let emitter = EventEmitter::<(u32, String)>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        emitter.on("pair", move |args: &(u32, String)| {
            seen_clone.lock().push(args.clone());
        });

        emitter.emit("pair", &(7, "seven".to_string()));
        assert_eq!(*seen.lock(), vec![(7, "seven".to_string())]);
    }

    #[test]
    fn test_event_names_are_exact_match() {
        let emitter = EventEmitter::<()>::new();
        let hits = Arc::new(Mutex::new(0));

        let hits_clone = Arc::clone(&hits);
        emitter.on("message", move |_| *hits_clone.lock() += 1);

        emitter.emit("Message", &());
        emitter.emit("message.text", &());
        emitter.emit("message", &());
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_off_removes_all_listeners() {
        let emitter = EventEmitter::<()>::new();
        emitter.on("a", |_| {});
        emitter.on("a", |_| {});
        emitter.on("b", |_| {});

        assert_eq!(emitter.listener_count("a"), 2);
        assert_eq!(emitter.off("a"), 2);
        assert_eq!(emitter.listener_count("a"), 0);
        assert_eq!(emitter.listener_count("b"), 1);
        assert_eq!(emitter.off("a"), 0);
    }

    #[test]
    fn test_clear_removes_every_event() {
        let emitter = EventEmitter::<()>::new();
        emitter.on("a", |_| {});
        emitter.on("b", |_| {});
        emitter.on("b", |_| {});

        assert_eq!(emitter.clear(), 3);
        assert_eq!(emitter.emit("b", &()), 0);
    }

    #[test]
    fn test_listener_may_register_during_emit() {
        let emitter = Arc::new(EventEmitter::<()>::new());
        let hits = Arc::new(Mutex::new(0));

        let emitter_clone = Arc::clone(&emitter);
        let hits_clone = Arc::clone(&hits);
        emitter.on("grow", move |_| {
            let hits_inner = Arc::clone(&hits_clone);
            emitter_clone.on("grow", move |_| *hits_inner.lock() += 1);
        });

        // Newly added listener does not fire in the emission that added it
        assert_eq!(emitter.emit("grow", &()), 1);
        assert_eq!(*hits.lock(), 0);

        assert_eq!(emitter.emit("grow", &()), 2);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    #[should_panic(expected = "listener failed")]
    fn test_listener_panic_propagates_to_emitter() {
        let emitter = EventEmitter::<()>::new();
        emitter.on("boom", |_| panic!("listener failed"));
        emitter.emit("boom", &());
    }

    #[test]
    fn test_event_args_accessors() {
        let args = EventArgs::Close(CloseReason::new("normal"));
        assert!(args.as_socket().is_none());
        assert!(args.as_payload().is_none());
        assert_eq!(args.as_close_reason().map(CloseReason::reason), Some("normal"));
    }

    #[test]
    fn test_event_args_decoded_only_touches_messages() {
        let args = EventArgs::Message(Payload::text("[1,2]")).decoded();
        assert_eq!(args.as_payload(), Some(&Payload::Json(serde_json::json!([1, 2]))));

        let args = EventArgs::Close(CloseReason::new("{}")).decoded();
        assert_eq!(args.as_close_reason().map(CloseReason::reason), Some("{}"));
    }

    proptest! {
        #[test]
        fn prop_emission_follows_registration_order(count in 1usize..40, arg in any::<i64>()) {
            let emitter = EventEmitter::<i64>::new();
            let calls = Arc::new(Mutex::new(Vec::new()));

            for index in 0..count {
                let calls_clone = Arc::clone(&calls);
                emitter.on("ordered", move |value: &i64| {
                    calls_clone.lock().push((index, *value));
                });
            }

            prop_assert_eq!(emitter.emit("ordered", &arg), count);

            let expected: Vec<(usize, i64)> = (0..count).map(|i| (i, arg)).collect();
            prop_assert_eq!(calls.lock().clone(), expected);
        }
    }
}
