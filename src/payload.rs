//! Message payloads and close reasons.
//!
//! Inbound frames become a [`Payload`]. The opportunistic decode policy
//! ([`Payload::decode`]) tries to parse textual and binary payloads as JSON
//! and falls back to the raw value when parsing fails. A decode failure is
//! never an error.
//!
//! Outbound frames are built from an [`OutboundMessage`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde_json::{Value, from_slice, from_str, to_string, to_value};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS_CODE: u16 = 1005;

/// Close code reported when the stream ended without a close frame.
const ABNORMAL_CODE: u16 = 1006;

// ============================================================================
// Payload
// ============================================================================

/// An inbound message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured data, produced by a successful decode.
    Json(Value),
    /// Raw text frame.
    Text(String),
    /// Raw binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Creates a raw text payload.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a raw binary payload.
    #[inline]
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Converts a WebSocket frame into a payload.
    ///
    /// Only data frames carry a payload; control frames return `None`.
    #[must_use]
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.as_str().to_owned())),
            Message::Binary(data) => Some(Self::Binary(data.to_vec())),
            _ => None,
        }
    }

    /// Applies the opportunistic decode policy.
    ///
    /// Text and binary payloads that parse as JSON become [`Payload::Json`];
    /// anything else is returned unchanged.
    #[must_use]
    pub fn decode(self) -> Self {
        match self {
            Self::Text(text) => match from_str::<Value>(&text) {
                Ok(value) => Self::Json(value),
                Err(_) => Self::Text(text),
            },
            Self::Binary(data) => match from_slice::<Value>(&data) {
                Ok(value) => Self::Json(value),
                Err(_) => Self::Binary(data),
            },
            json @ Self::Json(_) => json,
        }
    }

    /// Returns `true` for a zero-length raw payload.
    ///
    /// Empty payloads signal "no data" and are never forwarded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Binary(data) => data.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Returns the decoded value, if any.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the raw text, if this is an undecoded text payload.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is an undecoded binary payload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// A message queued for sending on a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// JSON value, serialized into a text frame.
    Json(Value),
}

impl OutboundMessage {
    /// Serializes `value` into a JSON message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if `value` fails to
    /// serialize.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Json(to_value(value)?))
    }

    /// Converts into a WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if a JSON value fails to
    /// serialize.
    pub fn into_message(self) -> Result<Message> {
        let message = match self {
            Self::Text(text) => Message::text(text),
            Self::Binary(data) => Message::binary(data),
            Self::Json(value) => Message::text(to_string(&value)?),
        };
        Ok(message)
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for OutboundMessage {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<Value> for OutboundMessage {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code, when one is known.
    code: Option<u16>,
    /// Human-readable reason.
    reason: String,
}

impl CloseReason {
    /// Creates a reason without a close code.
    #[inline]
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }

    /// Creates a reason with a close code.
    #[inline]
    #[must_use]
    pub fn with_code(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// Reason for a stream that ended without a close frame.
    #[inline]
    #[must_use]
    pub fn abnormal() -> Self {
        Self::with_code(ABNORMAL_CODE, "connection lost")
    }

    /// Builds a reason from a received close frame.
    #[must_use]
    pub fn from_frame(frame: Option<&CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self::with_code(u16::from(frame.code), frame.reason.as_str()),
            None => Self::with_code(NO_STATUS_CODE, ""),
        }
    }

    /// Builds the close frame sent when the local side closes.
    #[must_use]
    pub fn to_frame(&self) -> CloseFrame {
        CloseFrame {
            code: self.code.map_or(CloseCode::Normal, CloseCode::from),
            reason: self.reason.clone().into(),
        }
    }

    /// Returns the close code, if known.
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    /// Returns the reason text.
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<&str> for CloseReason {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.reason.is_empty() => write!(f, "{code}"),
            Some(code) => write!(f, "{code} {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_decode_json_object() {
        let payload = Payload::text(r#"{"a":1}"#).decode();
        assert_eq!(payload, Payload::Json(json!({ "a": 1 })));
    }

    #[test]
    fn test_decode_falls_back_to_raw_text() {
        let payload = Payload::text("not-json").decode();
        assert_eq!(payload, Payload::text("not-json"));
        assert_eq!(payload.as_text(), Some("not-json"));
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(Payload::text("42").decode(), Payload::Json(json!(42)));
        assert_eq!(
            Payload::text(r#""quoted""#).decode(),
            Payload::Json(json!("quoted"))
        );
    }

    #[test]
    fn test_decode_binary() {
        let payload = Payload::binary(br#"[true]"#.to_vec()).decode();
        assert_eq!(payload.as_json(), Some(&json!([true])));

        let payload = Payload::binary(vec![0xff, 0x00]).decode();
        assert_eq!(payload.as_bytes(), Some(&[0xff, 0x00][..]));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let once = Payload::text(r#"{"k":"v"}"#).decode();
        assert_eq!(once.clone().decode(), once);
    }

    #[test]
    fn test_is_empty() {
        assert!(Payload::text("").is_empty());
        assert!(Payload::binary(Vec::new()).is_empty());
        assert!(!Payload::text(" ").is_empty());
        assert!(!Payload::Json(json!(null)).is_empty());
    }

    #[test]
    fn test_from_message_skips_control_frames() {
        assert_eq!(
            Payload::from_message(Message::text("hi")),
            Some(Payload::text("hi"))
        );
        assert_eq!(Payload::from_message(Message::Ping(Vec::new().into())), None);
        assert_eq!(Payload::from_message(Message::Close(None)), None);
    }

    #[test]
    fn test_outbound_json_is_text_frame() {
        let message = OutboundMessage::from(json!({ "x": 2 }))
            .into_message()
            .expect("serialize");
        assert_eq!(message, Message::text(r#"{"x":2}"#));
    }

    #[test]
    fn test_outbound_json_from_serializable() {
        #[derive(Serialize)]
        struct Chat<'a> {
            room: &'a str,
            body: &'a str,
        }

        let message = OutboundMessage::json(&Chat {
            room: "lobby",
            body: "hi",
        })
        .expect("serialize");
        assert_eq!(
            message,
            OutboundMessage::Json(json!({ "room": "lobby", "body": "hi" }))
        );
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::new("normal").to_string(), "normal");
        assert_eq!(CloseReason::with_code(1000, "bye").to_string(), "1000 bye");
        assert_eq!(CloseReason::with_code(1005, "").to_string(), "1005");
    }

    #[test]
    fn test_close_reason_from_frame() {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "normal".into(),
        };
        let reason = CloseReason::from_frame(Some(&frame));
        assert_eq!(reason.code(), Some(1000));
        assert_eq!(reason.reason(), "normal");

        assert_eq!(CloseReason::from_frame(None).code(), Some(1005));
    }

    #[test]
    fn test_close_reason_to_frame_defaults_to_normal() {
        let frame = CloseReason::new("done").to_frame();
        assert_eq!(frame.code, CloseCode::Normal);
        assert_eq!(frame.reason.as_str(), "done");
    }
}
