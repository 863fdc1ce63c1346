//! Path-prefix request dispatcher.
//!
//! Routes are checked in registration order; the first prefix that matches
//! the request path wins. Unmatched requests get `404 Not Found`, and plain
//! HTTP requests to a transport route get `426 Upgrade Required`.

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::backend::Mechanism;
use crate::error::Result;
use crate::transport::{Request, Transport};

use super::http::StaticResponse;

// ============================================================================
// Constants
// ============================================================================

/// Path the reference wiring serves WebSockets on.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Body of the reference wiring's index page.
pub const INDEX_BODY: &str = "WebSocket server is running";

// ============================================================================
// Route
// ============================================================================

/// Where a matched request goes.
#[derive(Debug, Clone)]
pub enum Route {
    /// Hand the request to a transport.
    Transport(Transport),
    /// Answer with a fixed response.
    Static(StaticResponse),
}

impl From<Transport> for Route {
    fn from(transport: Transport) -> Self {
        Self::Transport(transport)
    }
}

impl From<StaticResponse> for Route {
    fn from(response: StaticResponse) -> Self {
        Self::Static(response)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Ordered path-prefix routing table.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    routes: Vec<(String, Route)>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference wiring: `/ws` to `transport`, `/` to a static index page.
    #[must_use]
    pub fn standard(transport: Transport) -> Self {
        Self::new()
            .route(DEFAULT_WS_PATH, transport)
            .route("/", StaticResponse::html(INDEX_BODY))
    }

    /// Appends a route.
    #[inline]
    #[must_use]
    pub fn route(mut self, prefix: impl Into<String>, route: impl Into<Route>) -> Self {
        self.routes.push((prefix.into(), route.into()));
        self
    }

    /// Returns the number of routes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the first route whose prefix matches `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, route)| route)
    }

    /// Dispatches a request to its route.
    ///
    /// # Errors
    ///
    /// Whatever the matched route reports.
    pub async fn dispatch(&self, mut request: Request) -> Result<()> {
        match self.resolve(request.path()) {
            Some(Route::Transport(_)) if Mechanism::detect(&request).is_none() => {
                debug!(path = request.path(), "Plain request to WebSocket route");
                respond(&mut request, &StaticResponse::upgrade_required()).await
            }
            Some(Route::Transport(transport)) => transport.handle(request).await,
            Some(Route::Static(response)) => respond(&mut request, response).await,
            None => {
                debug!(path = request.path(), "No route matched");
                respond(&mut request, &StaticResponse::not_found()).await
            }
        }
    }
}

/// Writes a fixed response to whatever the request has attached.
///
/// An already-upgraded WebSocket cannot carry an HTTP response and is closed.
async fn respond(request: &mut Request, response: &StaticResponse) -> Result<()> {
    if let Some(mut stream) = request.take_stream() {
        return response.write_to(&mut stream).await;
    }

    if let Some(mut websocket) = request.take_websocket() {
        websocket.close(None).await?;
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncReadExt;

    fn is_static(route: Option<&Route>, body: &str) -> bool {
        matches!(route, Some(Route::Static(response)) if response.body() == body.as_bytes())
    }

    #[test]
    fn test_first_prefix_match_wins() {
        let dispatcher = Dispatcher::new()
            .route("/api", StaticResponse::html("api"))
            .route("/", StaticResponse::html("index"))
            .route("/api/v2", StaticResponse::html("unreachable"));

        assert!(is_static(dispatcher.resolve("/api/v2/users"), "api"));
        assert!(is_static(dispatcher.resolve("/about"), "index"));
        assert_eq!(dispatcher.len(), 3);
    }

    #[test]
    fn test_unmatched_path() {
        let dispatcher = Dispatcher::new().route("/ws", StaticResponse::html("ws"));
        assert!(dispatcher.resolve("/").is_none());
        assert!(Dispatcher::new().is_empty());
    }

    #[tokio::test]
    async fn test_standard_wiring() {
        let transport = Transport::builder().build().expect("transport");
        let dispatcher = Dispatcher::standard(transport);

        assert!(matches!(dispatcher.resolve("/ws"), Some(Route::Transport(_))));
        assert!(is_static(dispatcher.resolve("/"), INDEX_BODY));
    }

    #[tokio::test]
    async fn test_dispatch_static_writes_response() {
        let dispatcher = Dispatcher::new().route("/", StaticResponse::html("hello"));
        let (server, mut client) = tokio::io::duplex(4096);

        dispatcher
            .dispatch(Request::new("/index.html").with_stream(server))
            .await
            .expect("dispatch");

        let mut raw = String::new();
        client.read_to_string(&mut raw).await.expect("read");
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("hello"));
    }

    #[tokio::test]
    async fn test_dispatch_plain_request_to_transport_is_upgrade_required() {
        let transport = Transport::builder().build().expect("transport");
        let dispatcher = Dispatcher::standard(transport);
        let (server, mut client) = tokio::io::duplex(4096);

        dispatcher
            .dispatch(Request::new("/ws").with_stream(server))
            .await
            .expect("dispatch");

        let mut raw = String::new();
        client.read_to_string(&mut raw).await.expect("read");
        assert!(raw.starts_with("HTTP/1.1 426 Upgrade Required"));
    }

    #[tokio::test]
    async fn test_dispatch_unmatched_is_not_found() {
        let dispatcher = Dispatcher::new().route("/ws", StaticResponse::html("ws"));
        let (server, mut client) = tokio::io::duplex(4096);

        dispatcher
            .dispatch(Request::new("/missing").with_stream(server))
            .await
            .expect("dispatch");

        let mut raw = String::new();
        client.read_to_string(&mut raw).await.expect("read");
        assert!(raw.starts_with("HTTP/1.1 404 Not Found"));
    }
}
