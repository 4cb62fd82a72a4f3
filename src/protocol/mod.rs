//! WebSocket protocol message types.
//!
//! This module defines the JSON frames exchanged with the feed server.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Server | Correlated call |
//! | `Response` | Server → Client | Result or error for one call |
//! | `Push` | Server → Client | Notification for a subscription |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Inbound frame classification and push type |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound frame classification.
pub mod frame;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, Push};
pub use request::{Request, Response, RpcError};
