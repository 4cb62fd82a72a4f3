//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Assigned by | Scope |
//! |------|-------------|-------|
//! | [`RequestId`] | Connection | Correlates a call with its response |
//! | [`SubscriptionKey`] | Server | Tags push frames of one subscription |
//! | [`FeedKey`] | Caller | Logical feed name in the registry |
//! | [`ListenerId`] | Process | One local callback registration |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RequestId
// ============================================================================

/// Correlation token of an outbound call.
///
/// Generated from a per-connection counter, so uniqueness holds among
/// in-flight requests of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw request id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionKey
// ============================================================================

/// Server-assigned key that tags push frames.
///
/// Servers hand out either numeric or string keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionKey {
    /// Numeric key.
    Number(u64),
    /// String key.
    Text(String),
}

impl SubscriptionKey {
    /// Extracts a key from a subscribe response result.
    ///
    /// Accepts a bare number or string, or an object carrying a
    /// `subscriptionKey` field.
    #[must_use]
    pub fn from_result(result: &Value) -> Option<Self> {
        match result {
            Value::Number(n) => n.as_u64().map(Self::Number),
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            Value::Object(map) => map.get("subscriptionKey").and_then(Self::from_result),
            _ => None,
        }
    }

    /// Converts the key back into a JSON value for outbound params.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for SubscriptionKey {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for SubscriptionKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// ============================================================================
// FeedKey
// ============================================================================

/// Name of a logical feed, e.g. one instrument's live summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedKey(String);

impl FeedKey {
    /// Creates a feed key.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FeedKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&FeedKey> for FeedKey {
    fn from(value: &FeedKey) -> Self {
        value.clone()
    }
}

impl Borrow<str> for FeedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Global counter for listener IDs.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next process-unique listener ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
