//! feed-sync - Reconnecting WebSocket client with shared live-feed subscriptions.
//!
//! This library keeps one multiplexed WebSocket connection to a feed server
//! and lets any number of consumers watch live feeds over it.
//!
//! # Architecture
//!
//! The client is layered:
//!
//! - **Transport**: One [`Connection`] per endpoint. Correlates calls with
//!   responses by id, routes pushes by subscription key, queues frames while
//!   offline and reconnects with capped exponential backoff.
//! - **Registry**: One [`FeedRegistry`] per application. Deduplicates feed
//!   subscriptions, caches the last value of each feed, replays it to late
//!   subscribers and resubscribes after every reconnect.
//!
//! Key design principles:
//!
//! - One server subscription per feed, however many consumers
//! - Callbacks never run under an internal lock
//! - A panicking callback is logged and contained
//! - Failures surface as state changes, never as panics
//!
//! # Quick Start
//!
//! ```no_run
//! use feed_sync::{ClientConfig, FeedRegistry, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::builder("ws://127.0.0.1:9000").build()?;
//!     let registry = FeedRegistry::new(config);
//!
//!     // Watch a feed
//!     let subscription = registry.subscribe(
//!         "tok-1",
//!         |update| println!("{}: {}", update.key(), update.value()),
//!         |state| println!("connection {state}"),
//!     );
//!
//!     // One-off call over the same socket
//!     let quote = registry
//!         .call("quote.get", serde_json::json!({"symbol": "SOL"}))
//!         .await?;
//!     println!("quote: {quote}");
//!
//!     subscription.unsubscribe();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Client configuration and builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket frame types |
//! | [`registry`] | Shared feed subscriptions: [`FeedRegistry`], [`FeedSubscription`] |
//! | [`transport`] | Connection, correlation and push routing |
//!
//! # Features
//!
//! - `rustls`: TLS for `wss://` endpoints

// ============================================================================
// Modules
// ============================================================================

/// Client configuration.
///
/// Use [`ClientConfig::builder()`] to create a validated configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// Shared feed subscriptions.
///
/// - [`FeedRegistry`] - One per application, owns the connection
/// - [`FeedSubscription`] - One per consumer
pub mod registry;

/// WebSocket transport layer.
///
/// Reconnecting connection, call correlation and push routing.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{
    ClientConfig, ClientConfigBuilder, FeedProtocol, OverflowPolicy, QueuePolicy, ReconnectPolicy,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{FeedKey, ListenerId, RequestId, SubscriptionKey};

// Registry types
pub use registry::{FeedRegistry, FeedSubscription, FeedUpdate};

// Transport types
pub use transport::{Connection, ConnectionState, SubscriptionHandle};
