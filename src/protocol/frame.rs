//! Inbound frame classification.
//!
//! Frames are told apart by shape, not by a type tag:
//!
//! | Shape | Frame |
//! |-------|-------|
//! | has `subscriptionKey` | [`Frame::Push`] |
//! | has `id` and `method` | [`Frame::Request`] (server-initiated, unsupported) |
//! | has `id` and `result` or `error` | [`Frame::Response`] |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionKey;

use super::Response;

// ============================================================================
// Push
// ============================================================================

/// An unsolicited notification for an active subscription.
///
/// # Format
///
/// ```json
/// { "subscriptionKey": "sub-1", "payload": { "price": 10 } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Push {
    /// Key assigned by the server when the subscription was created.
    #[serde(rename = "subscriptionKey")]
    pub subscription_key: SubscriptionKey,

    /// Feed data.
    #[serde(default)]
    pub payload: Value,
}

// ============================================================================
// Frame
// ============================================================================

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Response to one of our calls.
    Response(Response),

    /// Subscription notification.
    Push(Push),

    /// Request initiated by the server.
    Request {
        /// Method the server asked for.
        method: String,
    },
}

impl Frame {
    /// Parses and classifies a raw text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON or a field has the wrong type
    /// - [`Error::Protocol`] if the JSON has no recognizable frame shape
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        let Some(object) = value.as_object() else {
            return Err(Error::protocol("frame is not a JSON object"));
        };

        if object.contains_key("subscriptionKey") {
            return Ok(Self::Push(serde_json::from_value(value)?));
        }

        if object.contains_key("id") {
            if let Some(method) = object.get("method").and_then(Value::as_str) {
                return Ok(Self::Request {
                    method: method.to_string(),
                });
            }
            if object.contains_key("result") || object.contains_key("error") {
                return Ok(Self::Response(serde_json::from_value(value)?));
            }
        }

        Err(Error::protocol("unrecognized frame shape"))
    }

    /// Returns the frame kind for logging.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Push(_) => "push",
            Self::Request { .. } => "request",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
