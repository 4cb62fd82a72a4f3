//! Error types for feed-sync.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use feed_sync::{Connection, Result};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     let quote = connection.call("quote.get", serde_json::json!({"symbol": "SOL"})).await?;
//!     println!("{quote}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpoint`], [`Error::Url`] |
//! | Connection | [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ConnectionLost`], [`Error::ReconnectExhausted`] |
//! | Flow control | [`Error::QueueFull`], [`Error::QueueOverflow`], [`Error::TooManyPending`] |
//! | Protocol | [`Error::Protocol`] |
//! | Call | [`Error::Rpc`], [`Error::RequestTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint is not a WebSocket URL.
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Endpoint could not be parsed.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection was closed deliberately.
    ///
    /// Returned to calls still pending when [`close`](crate::Connection::close)
    /// runs, and to calls made afterwards.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The socket carrying this request died before a response arrived.
    #[error("Connection lost before response")]
    ConnectionLost,

    /// Reconnection gave up after the configured number of attempts.
    #[error("Reconnect gave up after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnect attempts made.
        attempts: u32,
    },

    // ========================================================================
    // Flow Control Errors
    // ========================================================================
    /// Outbound queue is full and the overflow policy rejects new frames.
    #[error("Outbound queue full ({capacity} frames)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Request was evicted from the outbound queue to make room.
    #[error("Request dropped from outbound queue on overflow")]
    QueueOverflow,

    /// Too many calls awaiting a response.
    #[error("Too many pending requests (limit {limit})")]
    TooManyPending {
        /// Configured pending-call limit.
        limit: usize,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// Error payload returned by the server for a call.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Server error code.
        code: i64,
        /// Server error message.
        message: String,
        /// Optional structured error data.
        data: Option<Value>,
    },

    /// Call did not receive a response in time.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    #[inline]
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(capacity: usize) -> Self {
        Self::QueueFull { capacity }
    }

    /// Creates a too many pending error.
    #[inline]
    pub fn too_many_pending(limit: usize) -> Self {
        Self::TooManyPending { limit }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an RPC error from a server error payload.
    #[inline]
    pub fn rpc(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ConnectionLost
                | Self::ReconnectExhausted { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the server answered with an error payload.
    #[inline]
    #[must_use]
    pub fn is_rpc_error(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionLost
                | Self::RequestTimeout { .. }
                | Self::QueueFull { .. }
                | Self::QueueOverflow
                | Self::TooManyPending { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection_timeout(1500);
        assert_eq!(err.to_string(), "Connection timeout after 1500ms");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_rpc_error_display() {
        let err = Error::rpc(-32601, "method not found", None);
        assert_eq!(err.to_string(), "RPC error -32601: method not found");
        assert!(err.is_rpc_error());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(RequestId::new(3), 250);
        let other_err = Error::ConnectionLost;

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
        assert_eq!(
            timeout_err.to_string(),
            "Request 3 timed out after 250ms"
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection_timeout(10).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::ConnectionLost.is_connection_error());
        assert!(Error::reconnect_exhausted(5).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
        assert!(!Error::QueueOverflow.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionLost.is_recoverable());
        assert!(Error::queue_full(8).is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
        assert!(!Error::reconnect_exhausted(3).is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
