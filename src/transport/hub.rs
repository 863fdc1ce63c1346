//! Process-wide event hub.
//!
//! [`EventHub`] is the emitter every backend publishes into and every
//! application subscribes to. It exists before a backend is chosen, so
//! backend factories can bind to it during probing.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::events::{CLOSE, EventArgs, EventEmitter, MESSAGE, OPEN};
use crate::payload::{CloseReason, Payload};
use crate::socket::Socket;

// ============================================================================
// EventHub
// ============================================================================

/// Process-wide emitter for `open`, `message` and `close`.
///
/// Clones share the same listeners.
#[derive(Clone, Default)]
pub struct EventHub {
    events: Arc<EventEmitter<EventArgs>>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventHub").field(&self.events).finish()
    }
}

impl EventHub {
    /// Creates a hub with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the underlying emitter.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventEmitter<EventArgs> {
        &self.events
    }

    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&EventArgs) + Send + Sync + 'static,
    {
        self.events.on(event, listener);
    }

    /// Registers a listener for `open` events.
    pub fn on_open<F>(&self, listener: F)
    where
        F: Fn(&Socket) + Send + Sync + 'static,
    {
        self.on(OPEN, move |args| {
            if let Some(socket) = args.as_socket() {
                listener(socket);
            }
        });
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

    /// Emits `event` to every listener.
    ///
    /// `message` payloads go through the opportunistic decode policy first;
    /// other events pass through unchanged. Returns the number of listeners
    /// invoked.
    pub fn emit(&self, event: &str, args: EventArgs) -> usize {
        let args = if event == MESSAGE { args.decoded() } else { args };
        self.events.emit(event, &args)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_message_payloads_are_decoded() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        hub.on_message(move |payload| seen_clone.lock().push(payload.clone()));

        hub.emit(MESSAGE, EventArgs::Message(Payload::text(r#"{"a":1}"#)));
        hub.emit(MESSAGE, EventArgs::Message(Payload::text("not-json")));

        assert_eq!(
            *seen.lock(),
            vec![Payload::Json(json!({ "a": 1 })), Payload::text("not-json")]
        );
    }

    #[test]
    fn test_other_events_pass_through() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        hub.on_close(move |reason| seen_clone.lock().push(reason.clone()));

        hub.emit(CLOSE, EventArgs::Close(CloseReason::new(r#"{"a":1}"#)));
        assert_eq!(*seen.lock(), vec![CloseReason::new(r#"{"a":1}"#)]);
    }

    #[test]
    fn test_typed_listener_ignores_mismatched_args() {
        let hub = EventHub::new();
        let hits = Arc::new(Mutex::new(0));

        let hits_clone = Arc::clone(&hits);
        hub.on_open(move |_| *hits_clone.lock() += 1);

        // Wrong argument kind under the `open` name is skipped
        hub.emit(OPEN, EventArgs::Close(CloseReason::new("x")));
        assert_eq!(*hits.lock(), 0);

        hub.emit(OPEN, EventArgs::Open(Socket::detached()));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_clones_share_listeners() {
        let hub = EventHub::new();
        let clone = hub.clone();
        clone.on(OPEN, |_| {});
        assert_eq!(hub.events().listener_count(OPEN), 1);
    }

    #[test]
    fn test_emit_without_listeners() {
        let hub = EventHub::new();
        assert_eq!(hub.emit(MESSAGE, EventArgs::Message(Payload::text("x"))), 0);
    }
}
