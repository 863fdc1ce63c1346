//! Reference front end.
//!
//! A small TCP server that parses request heads, routes them by path prefix
//! and feeds WebSocket requests to a [`Transport`](crate::Transport). It
//! exercises both handshake placements the transport supports.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Server configuration |
//! | `core` | `Server` accept loop and `UpgradeMode` |
//! | `dispatcher` | Path-prefix routing |
//! | `http` | Request heads and static responses |

// ============================================================================
// Submodules
// ============================================================================

/// Server configuration builder.
pub mod builder;

/// Accept loop and connection handling.
pub mod core;

/// Path-prefix routing.
pub mod dispatcher;

/// Minimal HTTP/1.1 handling.
pub mod http;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{SERVER_SOFTWARE, Server, UpgradeMode};
pub use builder::{DEFAULT_MAX_HEAD_BYTES, ServerBuilder};
pub use dispatcher::{DEFAULT_WS_PATH, Dispatcher, INDEX_BODY, Route};
pub use self::http::{RequestHead, Rewind, StaticResponse, read_head};
