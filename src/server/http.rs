//! Minimal HTTP/1.1 request-head handling.
//!
//! The front end only needs the request line and headers to route a request
//! and to tell a WebSocket upgrade apart from a plain request. Bytes consumed
//! while reading the head are replayed through [`Rewind`], so the WebSocket
//! handshake can still read the full request.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of headers accepted in a request head.
const MAX_HEADERS: usize = 64;

/// Read chunk size while waiting for a complete head.
const READ_CHUNK: usize = 1024;

// ============================================================================
// RequestHead
// ============================================================================

/// Parsed request line and headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP method.
    pub method: String,
    /// Path without query string.
    pub path: String,
    /// Query string without the leading `?`.
    pub query: String,
    /// Protocol version.
    pub version: Version,
    /// Headers in arrival order. Non-UTF-8 bytes in values are replaced.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parses a request head from the start of `buffer`.
    ///
    /// Returns the head and its length in bytes, or `None` while the head is
    /// still incomplete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for a malformed request line or header.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut headers);

        let status = request
            .parse(buffer)
            .map_err(|e| Error::protocol(format!("malformed request head: {e}")))?;
        let httparse::Status::Complete(length) = status else {
            return Ok(None);
        };

        let (Some(method), Some(target), Some(minor)) =
            (request.method, request.path, request.version)
        else {
            return Err(Error::protocol("incomplete request line"));
        };

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let version = if minor == 0 {
            Version::HTTP_10
        } else {
            Version::HTTP_11
        };

        let headers = request
            .headers
            .iter()
            .map(|header| {
                (
                    header.name.to_string(),
                    String::from_utf8_lossy(header.value).into_owned(),
                )
            })
            .collect();

        let head = Self {
            method: method.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            version,
            headers,
        };
        Ok(Some((head, length)))
    }

    /// Returns the first header named `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if the request asks for a WebSocket upgrade.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }

    /// Builds CGI-style environment flags for the request.
    ///
    /// Headers become `HTTP_<NAME>` with `-` mapped to `_`.
    #[must_use]
    pub fn environ(&self) -> FxHashMap<String, String> {
        let mut environ = FxHashMap::default();
        environ.insert("REQUEST_METHOD".to_string(), self.method.clone());
        environ.insert("PATH_INFO".to_string(), self.path.clone());
        environ.insert("QUERY_STRING".to_string(), self.query.clone());
        environ.insert("SERVER_PROTOCOL".to_string(), format!("{:?}", self.version));

        for (name, value) in &self.headers {
            let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            environ.entry(key).or_insert_with(|| value.clone());
        }

        environ
    }
}

/// Reads from `stream` until a full request head has arrived.
///
/// Returns the parsed head and every byte read so far.
///
/// # Errors
///
/// - [`Error::Protocol`] if the peer closes early, the head exceeds
///   `max_bytes`, or the head is malformed
/// - [`Error::Io`] if reading fails
pub async fn read_head<S>(stream: &mut S, max_bytes: usize) -> Result<(RequestHead, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if !buffer.is_empty()
            && let Some((head, _)) = RequestHead::parse(&buffer)?
        {
            return Ok((head, buffer));
        }

        if buffer.len() >= max_bytes {
            return Err(Error::protocol(format!(
                "request head exceeds {max_bytes} bytes"
            )));
        }

        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(Error::protocol("connection closed before request head"));
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

// ============================================================================
// StaticResponse
// ============================================================================

/// A fixed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResponse {
    status: StatusCode,
    content_type: HeaderValue,
    body: Vec<u8>,
}

impl StaticResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: HeaderValue::from_static(content_type),
            body: body.into(),
        }
    }

    /// `200 OK` with an HTML body.
    #[must_use]
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, "text/html", body)
    }

    /// `404 Not Found`.
    #[must_use]
    pub fn not_found() -> Self {
        Self::plain(StatusCode::NOT_FOUND)
    }

    /// `400 Bad Request`.
    #[must_use]
    pub fn bad_request() -> Self {
        Self::plain(StatusCode::BAD_REQUEST)
    }

    /// `426 Upgrade Required`, for plain requests to a WebSocket route.
    #[must_use]
    pub fn upgrade_required() -> Self {
        Self::plain(StatusCode::UPGRADE_REQUIRED)
    }

    fn plain(status: StatusCode) -> Self {
        Self::new(
            status,
            "text/plain",
            status.canonical_reason().unwrap_or_default(),
        )
    }

    /// Returns the status code.
    #[inline]
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the body.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, self.content_type.clone());
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        headers
    }

    /// Serializes the response, closing the connection afterwards.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = format!("{:?} {}\r\n", Version::HTTP_11, self.status).into_bytes();
        for (name, value) in &self.headers() {
            bytes.extend_from_slice(name.as_str().as_bytes());
            bytes.extend_from_slice(b": ");
            bytes.extend_from_slice(value.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Writes the response and shuts the stream down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if writing fails.
    pub async fn write_to<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        stream.write_all(&self.to_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// Rewind
// ============================================================================

/// Stream wrapper that replays already-read bytes before reading further.
#[derive(Debug)]
pub struct Rewind<S> {
    prefix: Vec<u8>,
    position: usize,
    inner: S,
}

impl<S> Rewind<S> {
    /// Wraps `inner`, replaying `prefix` first.
    #[must_use]
    pub fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            position: 0,
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Rewind<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.prefix.len() - self.position;
        if remaining > 0 {
            let count = remaining.min(buf.remaining());
            let start = self.position;
            buf.put_slice(&self.prefix[start..start + count]);
            self.position += count;
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Rewind<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const UPGRADE_HEAD: &str = "GET /ws?room=1 HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: WebSocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    fn parse_complete(raw: &[u8]) -> RequestHead {
        let (head, length) = RequestHead::parse(raw)
            .expect("parse")
            .expect("complete head");
        assert_eq!(length, raw.len());
        head
    }

    #[test]
    fn test_parse_request_line_and_headers() {
        let head = parse_complete(UPGRADE_HEAD.as_bytes());
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/ws");
        assert_eq!(head.query, "room=1");
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(head.header("host"), Some("localhost"));
        assert!(head.is_websocket_upgrade());
    }

    #[test]
    fn test_parse_incomplete_head_needs_more() {
        let result = RequestHead::parse(b"GET /ws HTTP/1.1\r\nHost: x\r\n");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_parse_rejects_malformed_request_line() {
        assert!(RequestHead::parse(b"NONSENSE\r\n\r\n").is_err());
        assert!(RequestHead::parse(b"GET / HTTP/9.1\r\n\r\n").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_header() {
        let result = RequestHead::parse(b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n");
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_parse_accepts_non_utf8_header_value() {
        let head = parse_complete(b"GET / HTTP/1.1\r\nHost: x\r\nX-Name: caf\xe9\r\n\r\n");
        assert_eq!(head.header("x-name"), Some("caf\u{fffd}"));
    }

    #[test]
    fn test_plain_request_is_not_upgrade() {
        let head = parse_complete(b"GET / HTTP/1.0\r\nHost: x\r\n\r\n");
        assert_eq!(head.version, Version::HTTP_10);
        assert!(!head.is_websocket_upgrade());
    }

    #[test]
    fn test_environ_flags() {
        let head = parse_complete(UPGRADE_HEAD.as_bytes());
        let environ = head.environ();
        assert_eq!(environ.get("REQUEST_METHOD").map(String::as_str), Some("GET"));
        assert_eq!(environ.get("PATH_INFO").map(String::as_str), Some("/ws"));
        assert_eq!(environ.get("QUERY_STRING").map(String::as_str), Some("room=1"));
        assert_eq!(environ.get("SERVER_PROTOCOL").map(String::as_str), Some("HTTP/1.1"));
        assert_eq!(environ.get("HTTP_UPGRADE").map(String::as_str), Some("WebSocket"));
        assert_eq!(
            environ.get("HTTP_SEC_WEBSOCKET_KEY").map(String::as_str),
            Some("dGhlIHNhbXBsZSBub25jZQ==")
        );
    }

    #[tokio::test]
    async fn test_read_head_keeps_trailing_bytes() {
        let (mut server, mut client) = tokio::io::duplex(4096);
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nEXTRA")
            .await
            .expect("write");

        let (head, consumed) = read_head(&mut server, 8192).await.expect("head");
        assert_eq!(head.path, "/");
        assert!(consumed.ends_with(b"EXTRA"));
    }

    #[tokio::test]
    async fn test_read_head_across_partial_writes() {
        let (mut server, mut client) = tokio::io::duplex(4096);
        let writer = tokio::spawn(async move {
            client.write_all(b"GET /ws HTTP/1.1\r\nHo").await.expect("write");
            tokio::task::yield_now().await;
            client.write_all(b"st: x\r\n\r\n").await.expect("write");
            client
        });

        let (head, _) = read_head(&mut server, 8192).await.expect("head");
        assert_eq!(head.header("host"), Some("x"));
        drop(writer.await.expect("join"));
    }

    #[tokio::test]
    async fn test_read_head_limit() {
        let (mut server, mut client) = tokio::io::duplex(4096);
        let mut raw = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend_from_slice(&[b'a'; 2048]);
        client.write_all(&raw).await.expect("write");

        let result = read_head(&mut server, 1024).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_read_head_early_eof() {
        let (mut server, mut client) = tokio::io::duplex(4096);
        client.write_all(b"GET / HTTP/1.1\r\n").await.expect("write");
        drop(client);

        let result = read_head(&mut server, 8192).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_rewind_replays_prefix_then_inner() {
        let (server, mut client) = tokio::io::duplex(64);
        client.write_all(b" world").await.expect("write");
        drop(client);

        let mut rewind = Rewind::new(b"hello".to_vec(), server);
        let mut out = String::new();
        rewind.read_to_string(&mut out).await.expect("read");
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn test_static_response_bytes() {
        let response = StaticResponse::html("WebSocket server is running");
        let (mut server, mut client) = tokio::io::duplex(4096);

        response.write_to(&mut server).await.expect("write");

        let mut raw = String::new();
        client.read_to_string(&mut raw).await.expect("read");
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("content-type: text/html\r\n"));
        assert!(raw.contains("content-length: 27\r\n"));
        assert!(raw.contains("connection: close\r\n"));
        assert!(raw.ends_with("\r\n\r\nWebSocket server is running"));
    }

    #[test]
    fn test_upgrade_required_response() {
        let response = StaticResponse::upgrade_required();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);

        let raw = String::from_utf8(response.to_bytes()).expect("utf8");
        assert!(raw.starts_with("HTTP/1.1 426 Upgrade Required\r\n"));
        assert!(raw.ends_with("Upgrade Required"));
    }
}
