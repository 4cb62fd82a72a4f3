//! Policy types that make up a [`ClientConfig`](super::ClientConfig).
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use feed_sync::{OverflowPolicy, QueuePolicy, ReconnectPolicy};
//!
//! let reconnect = ReconnectPolicy::new()
//!     .with_base_delay(Duration::from_millis(250))
//!     .with_max_attempts(5);
//! let queue = QueuePolicy::new().with_capacity(64).with_overflow(OverflowPolicy::Reject);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::{Map, Value};

use crate::identifiers::{FeedKey, SubscriptionKey};

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound for a single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff with a hard attempt cap.
///
/// The delay before reconnect attempt `n` (0-based) is
/// `base_delay * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Reconnect attempts before the connection gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Creates a policy with the documented defaults.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the base delay.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the attempt cap.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

// ============================================================================
// QueuePolicy
// ============================================================================

/// What to do when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Refuse the new frame.
    Reject,
}

/// Bound and overflow behavior of the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Maximum frames held while disconnected.
    pub capacity: usize,

    /// Behavior once `capacity` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuePolicy {
    /// Creates a policy with the documented defaults.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::DropOldest,
        }
    }

    /// Sets the capacity.
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the overflow policy.
    #[inline]
    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

// ============================================================================
// FeedProtocol
// ============================================================================

/// Wire contract for server-level feed subscriptions.
///
/// Subscribe sends `{ "<feed_param>": <feed key> }` to `subscribe_method`;
/// unsubscribe sends `{ "<key_param>": <subscription key> }` to
/// `unsubscribe_method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedProtocol {
    /// Subscribe verb.
    pub subscribe_method: String,

    /// Unsubscribe verb.
    pub unsubscribe_method: String,

    /// Param name carrying the feed key.
    pub feed_param: String,

    /// Param name carrying the server subscription key.
    pub key_param: String,
}

impl Default for FeedProtocol {
    fn default() -> Self {
        Self {
            subscribe_method: "subscribe".to_string(),
            unsubscribe_method: "unsubscribe".to_string(),
            feed_param: "feed".to_string(),
            key_param: "subscriptionKey".to_string(),
        }
    }
}

impl FeedProtocol {
    /// Builds subscribe params for a feed.
    #[must_use]
    pub fn subscribe_params(&self, feed: &FeedKey) -> Value {
        let mut params = Map::new();
        params.insert(self.feed_param.clone(), Value::from(feed.as_str()));
        Value::Object(params)
    }

    /// Builds unsubscribe params for a server subscription.
    #[must_use]
    pub fn unsubscribe_params(&self, key: &SubscriptionKey) -> Value {
        let mut params = Map::new();
        params.insert(self.key_param.clone(), key.to_value());
        Value::Object(params)
    }
}

// ============================================================================
// Tests
// ============================================================================
