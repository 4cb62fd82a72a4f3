//! Request and Response message types.
//!
//! Defines the message format for calls from the client and the
//! server's correlated responses.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Request
// ============================================================================

/// A call from client to server.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "subscribe",
///   "params": { "feed": "tok-1" }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Identifier for request/response correlation.
    pub id: RequestId,

    /// Method name.
    pub method: String,

    /// Method parameters (omitted when null).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Creates a new request.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from server to client.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": "sub-1" }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32602, "message": "unknown feed" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if error).
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// A missing or null `result` on success becomes [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the response carried an error payload.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::rpc(error.code, error.message, error.data)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// RpcError
// ============================================================================

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// Tests
// ============================================================================
