//! WebSocket transport layer.
//!
//! This module owns the socket to the feed server: connecting and
//! reconnecting, correlating calls with responses, and routing pushes to
//! subscription handlers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                           ┌─────────────────┐
//! │  Connection      │                           │  Feed server    │
//! │                  │        WebSocket          │                 │
//! │  Correlator      │◄─────────────────────────►│  calls          │
//! │  PushDispatcher  │    {id, method, params}   │  pushes         │
//! │  OutboundQueue   │    {subscriptionKey, ..}  │                 │
//! └──────────────────┘                           └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::new` - Spawn the idle event loop
//! 2. `open()` or first call - Dial the endpoint, flush queued frames
//! 3. Socket lost - Reject in-flight calls, back off, redial
//! 4. Attempts exhausted - Reject everything, report `Exhausted`
//! 5. `close()` or last handle dropped - Shut down for good
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay schedule |
//! | `connection` | WebSocket connection and event loop |
//! | `correlator` | Pending call table |
//! | `dispatcher` | Push routing by subscription key |
//! | `listener` | Callback types and panic isolation |
//! | `queue` | Outbound queue used while offline |
//! | `state` | Connection state |
//! | `subscription` | Server subscription handle |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay schedule.
mod backoff;

/// WebSocket connection and event loop.
pub mod connection;

/// Pending call table.
mod correlator;

/// Push routing by subscription key.
mod dispatcher;

/// Callback types and panic isolation.
pub mod listener;

/// Outbound queue used while offline.
mod queue;

/// Connection state.
pub mod state;

/// Server subscription handle.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use listener::{PushHandler, StateHandler};
pub use state::ConnectionState;
pub use subscription::SubscriptionHandle;

pub(crate) use backoff::Backoff;
pub(crate) use listener::invoke_guarded;
