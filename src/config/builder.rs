//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and validating [`ClientConfig`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use feed_sync::ClientConfig;
//!
//! # fn example() -> feed_sync::Result<()> {
//! let config = ClientConfig::builder("wss://feeds.example.com/ws")
//!     .base_delay(Duration::from_millis(250))
//!     .max_attempts(6)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::ClientConfig;
use super::options::{FeedProtocol, OverflowPolicy, QueuePolicy, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default keepalive ping interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum calls awaiting a response.
pub const DEFAULT_MAX_PENDING_CALLS: usize = 100;

// ============================================================================
// ClientConfigBuilder
// ============================================================================

/// Builder for configuring a [`ClientConfig`].
///
/// Use [`ClientConfig::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    /// Raw endpoint, parsed at build time.
    endpoint: String,
    /// Reconnect backoff.
    reconnect: ReconnectPolicy,
    /// Outbound queue bound.
    queue: QueuePolicy,
    /// Handshake timeout.
    connect_timeout: Duration,
    /// Keepalive ping interval.
    ping_interval: Option<Duration>,
    /// Default call timeout.
    request_timeout: Option<Duration>,
    /// Pending call limit.
    max_pending_calls: usize,
    /// Subscribe wire contract.
    feed: FeedProtocol,
}

// ============================================================================
// ClientConfigBuilder Implementation
// ============================================================================

impl ClientConfigBuilder {
    /// Creates a builder for the given endpoint with documented defaults.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectPolicy::default(),
            queue: QueuePolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            request_timeout: None,
            max_pending_calls: DEFAULT_MAX_PENDING_CALLS,
            feed: FeedProtocol::default(),
        }
    }

    /// Sets the delay before the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.reconnect.base_delay = delay;
        self
    }

    /// Sets the cap for a single reconnect delay.
    #[inline]
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.reconnect.max_delay = delay;
        self
    }

    /// Sets how many reconnect attempts are made before giving up.
    #[inline]
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Replaces the whole reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue.capacity = capacity;
        self
    }

    /// Sets the outbound queue overflow policy.
    #[inline]
    #[must_use]
    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.queue.overflow = overflow;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keepalive ping interval.
    #[inline]
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    /// Disables keepalive pings.
    #[inline]
    #[must_use]
    pub fn no_ping(mut self) -> Self {
        self.ping_interval = None;
        self
    }

    /// Applies a timeout to every [`call`](crate::Connection::call).
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the maximum calls awaiting a response.
    #[inline]
    #[must_use]
    pub fn max_pending_calls(mut self, limit: usize) -> Self {
        self.max_pending_calls = limit;
        self
    }

    /// Sets the subscribe wire contract.
    #[inline]
    #[must_use]
    pub fn feed_protocol(mut self, feed: FeedProtocol) -> Self {
        self.feed = feed;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the endpoint does not parse
    /// - [`Error::InvalidEndpoint`] if the scheme is not `ws` or `wss`
    /// - [`Error::Config`] if a policy value is out of range
    pub fn build(self) -> Result<ClientConfig> {
        let endpoint = self.validate_endpoint()?;
        self.validate_policies()?;

        Ok(ClientConfig {
            endpoint,
            reconnect: self.reconnect,
            queue: self.queue,
            connect_timeout: self.connect_timeout,
            ping_interval: self.ping_interval,
            request_timeout: self.request_timeout,
            max_pending_calls: self.max_pending_calls,
            feed: self.feed,
        })
    }

    /// Validates the endpoint URL.
    fn validate_endpoint(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::invalid_endpoint(
                    &self.endpoint,
                    format!("unsupported scheme '{other}', expected ws or wss"),
                ));
            }
        }

        if url.host_str().is_none() {
            return Err(Error::invalid_endpoint(&self.endpoint, "missing host"));
        }

        Ok(url)
    }

    /// Validates timing and sizing values.
    fn validate_policies(&self) -> Result<()> {
        if self.reconnect.base_delay.is_zero() {
            return Err(Error::config("base reconnect delay must be non-zero"));
        }
        if self.reconnect.max_delay < self.reconnect.base_delay {
            return Err(Error::config(
                "max reconnect delay must not be below the base delay",
            ));
        }
        if self.queue.capacity == 0 {
            return Err(Error::config("outbound queue capacity must be non-zero"));
        }
        if self.max_pending_calls == 0 {
            return Err(Error::config("max pending calls must be non-zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be non-zero"));
        }
        if self.ping_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::config("ping interval must be non-zero"));
        }
        if self.feed.subscribe_method.is_empty() || self.feed.unsubscribe_method.is_empty() {
            return Err(Error::config("feed subscribe/unsubscribe methods must be set"));
        }
        if self.feed.feed_param.is_empty() || self.feed.key_param.is_empty() {
            return Err(Error::config("feed param names must be set"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
