//! Shared feed subscriptions.
//!
//! The registry sits on top of one [`Connection`](crate::Connection) and
//! multiplexes any number of local consumers onto one server subscription
//! per feed.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──first subscribe──► Active ──last unsubscribe──► Idle
//! ```
//!
//! Per feed:
//!
//! ```text
//! Unsubscribed ──connected──► Subscribing ──reply──► Subscribed
//!       ▲                                                │
//!       └──────────── disconnected / last listener ──────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | `FeedRegistry` and its shared state |
//! | `feed` | Per-feed records and cached updates |
//! | `handle` | `FeedSubscription` consumer handle |

// ============================================================================
// Submodules
// ============================================================================

/// Registry core.
pub mod core;

/// Per-feed records and cached updates.
pub mod feed;

/// Consumer handle.
pub mod handle;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::FeedRegistry;
pub use feed::{ConnectivityHandler, DataHandler, FeedUpdate};
pub use handle::FeedSubscription;
