//! WebSocket transport layer.
//!
//! The transport is the process-wide event hub applications subscribe to.
//! It binds one backend at construction and hands every WebSocket request to
//! it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Request    ┌──────────────┐   events    ┌──────────────┐
//! │  Front end   │─────────────►│  Transport   │────────────►│ Application  │
//! │ (Dispatcher) │              │  + Backend   │             │  listeners   │
//! └──────────────┘              └──────┬───────┘             └──────────────┘
//!                                      │ per connection
//!                                      ▼
//!                               ┌──────────────┐
//!                               │    Socket    │ message / close
//!                               └──────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. `Transport::builder().build()` - Probe backends, bind the first usable one
//! 2. `Transport::on_*` - Register application listeners
//! 3. `Transport::handle` - Serve one request per connection task
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Backend candidate configuration |
//! | `core` | `Transport` |
//! | `hub` | Process-wide emitter with the decode policy |
//! | `request` | Request context and stream types |

// ============================================================================
// Submodules
// ============================================================================

/// Transport configuration builder.
pub mod builder;

/// Transport and request handling.
pub mod core;

/// Process-wide event hub.
pub mod hub;

/// Request context handed in by the front end.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Transport;
pub use builder::TransportBuilder;
pub use hub::EventHub;
pub use request::{BoxedIo, Io, Request, WebSocket};
