//! Builder pattern for transport configuration.
//!
//! # Example
//!
//! ```ignore
//! use ws_transport::Transport;
//! use ws_transport::backend::{callback, pull};
//!
//! # fn example() -> ws_transport::Result<()> {
//! let transport = Transport::builder()
//!     .backend(pull::FACTORY)
//!     .backend(callback::FACTORY)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::backend::{BackendFactory, default_factories, probe};
use crate::error::Result;

use super::core::Transport;
use super::hub::EventHub;

// ============================================================================
// TransportBuilder
// ============================================================================

/// Builder for configuring a [`Transport`] instance.
///
/// Use [`Transport::builder()`] to create a new builder. Without explicit
/// candidates the default probe order is used.
#[derive(Debug, Default, Clone)]
pub struct TransportBuilder {
    /// Backend candidates in probe order.
    factories: Vec<BackendFactory>,
}

// ============================================================================
// TransportBuilder Implementation
// ============================================================================

impl TransportBuilder {
    /// Creates a builder with no explicit candidates.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a backend candidate.
    #[inline]
    #[must_use]
    pub fn backend(mut self, factory: BackendFactory) -> Self {
        self.factories.push(factory);
        self
    }

    /// Appends several backend candidates, keeping their order.
    #[inline]
    #[must_use]
    pub fn backends(mut self, factories: impl IntoIterator<Item = BackendFactory>) -> Self {
        self.factories.extend(factories);
        self
    }

    /// Probes the candidates and builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotFound`](crate::Error::BackendNotFound) if
    /// every candidate fails.
    pub fn build(self) -> Result<Transport> {
        let factories = if self.factories.is_empty() {
            default_factories()
        } else {
            self.factories
        };

        let hub = EventHub::new();
        let backend = probe(&hub, &factories)?;

        Ok(Transport::from_parts(hub, backend))
    }
}

// ============================================================================
// Tests
// ============================================================================
