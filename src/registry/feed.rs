//! Per-feed bookkeeping.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{FeedKey, ListenerId};
use crate::transport::{ConnectionState, SubscriptionHandle, invoke_guarded};

// ============================================================================
// Types
// ============================================================================

/// Callback receiving feed updates.
pub type DataHandler = Arc<dyn Fn(&FeedUpdate) + Send + Sync>;

/// Callback receiving connectivity changes.
pub type ConnectivityHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

// ============================================================================
// FeedUpdate
// ============================================================================

/// Latest value received for a feed.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    key: FeedKey,
    value: Arc<Value>,
    received_at: SystemTime,
    /// Registry-wide arrival order, starting at 1.
    seq: u64,
}

impl FeedUpdate {
    pub(crate) fn new(key: FeedKey, value: Value, seq: u64) -> Self {
        Self {
            key,
            value: Arc::new(value),
            received_at: SystemTime::now(),
            seq,
        }
    }

    /// Returns the feed this value belongs to.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// Returns the push payload.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns when the value arrived.
    #[inline]
    #[must_use]
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Deserializes the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload does not
    /// match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(self.value.as_ref())?)
    }
}

// ============================================================================
// ListenerEntry
// ============================================================================

/// One consumer attached to a feed.
pub(crate) struct ListenerEntry {
    pub id: ListenerId,
    pub sink: DataSink,
    pub on_connectivity: Option<ConnectivityHandler>,
}

impl ListenerEntry {
    pub(crate) fn new(
        id: ListenerId,
        on_data: DataHandler,
        on_connectivity: Option<ConnectivityHandler>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            sink: DataSink {
                active,
                delivered: Arc::new(Mutex::new(0)),
                on_data,
            },
            on_connectivity,
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.sink.is_active()
    }

    #[inline]
    pub(crate) fn active(&self) -> &Arc<AtomicBool> {
        &self.sink.active
    }
}

// ============================================================================
// DataSink
// ============================================================================

/// Delivery end of one listener.
///
/// Updates reach the handler in sequence order. An update older than the
/// last one delivered is skipped, so a cache replay racing a live push
/// never lands after it.
#[derive(Clone)]
pub(crate) struct DataSink {
    /// Cleared on unsubscribe; checked before every callback.
    active: Arc<AtomicBool>,
    /// Sequence of the last delivered update, held across the callback.
    delivered: Arc<Mutex<u64>>,
    on_data: DataHandler,
}

impl DataSink {
    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Delivers `update` unless the listener is gone or already saw a newer one.
    ///
    /// Returns `true` if the handler ran.
    pub(crate) fn deliver(&self, update: &FeedUpdate) -> bool {
        let mut delivered = self.delivered.lock();
        if update.seq <= *delivered || !self.is_active() {
            return false;
        }
        *delivered = update.seq;
        invoke_guarded("feed listener", || (self.on_data)(update));
        true
    }
}

// ============================================================================
// ServerSub
// ============================================================================

/// Server-side state of a feed.
#[derive(Default)]
pub(crate) enum ServerSub {
    /// No server subscription.
    #[default]
    Unsubscribed,
    /// Subscribe call in flight, tagged with its generation.
    Subscribing(u64),
    /// Live server subscription.
    Subscribed(SubscriptionHandle),
}

impl ServerSub {
    #[inline]
    pub(crate) fn is_unsubscribed(&self) -> bool {
        matches!(self, Self::Unsubscribed)
    }

    #[inline]
    pub(crate) fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed(_))
    }
}

// ============================================================================
// FeedRecord
// ============================================================================

/// Listeners and server state of one feed.
#[derive(Default)]
pub(crate) struct FeedRecord {
    pub listeners: Vec<ListenerEntry>,
    pub server: ServerSub,
    /// Consecutive failed subscribe calls on the current link.
    pub failures: u32,
}

impl FeedRecord {
    /// Removes a listener, returning `true` if it was attached.
    pub(crate) fn detach(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != id);
        self.listeners.len() != before
    }

    /// Snapshots the data sinks of active listeners.
    pub(crate) fn data_sinks(&self) -> Vec<DataSink> {
        self.listeners
            .iter()
            .filter(|entry| entry.is_active())
            .map(|entry| entry.sink.clone())
            .collect()
    }

    /// Snapshots the connectivity handlers of active listeners.
    pub(crate) fn connectivity_handlers(&self) -> Vec<(Arc<AtomicBool>, ConnectivityHandler)> {
        self.listeners
            .iter()
            .filter(|entry| entry.is_active())
            .filter_map(|entry| {
                entry
                    .on_connectivity
                    .as_ref()
                    .map(|handler| (Arc::clone(entry.active()), Arc::clone(handler)))
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
