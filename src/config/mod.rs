//! Client configuration.
//!
//! Every value is supplied by the embedding application through
//! [`ClientConfig::builder()`]; defaults are the documented constants in
//! [`builder`] and [`options`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent builder with validation |
//! | `options` | Reconnect, queue and feed protocol policies |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder with validation.
pub mod builder;

/// Reconnect, queue and feed protocol policies.
pub mod options;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientConfigBuilder;
pub use options::{FeedProtocol, OverflowPolicy, QueuePolicy, ReconnectPolicy};

// ============================================================================
// ClientConfig
// ============================================================================

/// Validated configuration for one server endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint.
    pub(crate) endpoint: Url,
    /// Reconnect backoff.
    pub(crate) reconnect: ReconnectPolicy,
    /// Outbound queue bound.
    pub(crate) queue: QueuePolicy,
    /// Handshake timeout.
    pub(crate) connect_timeout: Duration,
    /// Keepalive ping interval.
    pub(crate) ping_interval: Option<Duration>,
    /// Default call timeout.
    pub(crate) request_timeout: Option<Duration>,
    /// Pending call limit.
    pub(crate) max_pending_calls: usize,
    /// Subscribe wire contract.
    pub(crate) feed: FeedProtocol,
}

impl ClientConfig {
    /// Creates a builder for the given endpoint.
    #[inline]
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(endpoint)
    }

    /// Returns the server endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    /// Returns the outbound queue policy.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &QueuePolicy {
        &self.queue
    }

    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the keepalive ping interval, if enabled.
    #[inline]
    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval
    }

    /// Returns the default call timeout, if any.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Returns the pending call limit.
    #[inline]
    #[must_use]
    pub fn max_pending_calls(&self) -> usize {
        self.max_pending_calls
    }

    /// Returns the subscribe wire contract.
    #[inline]
    #[must_use]
    pub fn feed(&self) -> &FeedProtocol {
        &self.feed
    }
}
