//! Consumer handle for a registry subscription.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::identifiers::{FeedKey, ListenerId};

use super::core::RegistryInner;

// ============================================================================
// FeedSubscription
// ============================================================================

/// A consumer's attachment to one feed.
///
/// Dropping the subscription detaches it. Once the last consumer of a feed
/// detaches, the server subscription is released.
#[must_use = "dropping a FeedSubscription unsubscribes immediately"]
pub struct FeedSubscription {
    registry: Weak<RegistryInner>,
    key: FeedKey,
    listener: ListenerId,
    active: Arc<AtomicBool>,
}

impl FeedSubscription {
    pub(crate) fn new(
        registry: Weak<RegistryInner>,
        key: FeedKey,
        listener: ListenerId,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            key,
            listener,
            active,
        }
    }

    /// Returns the feed key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// Returns the listener ID.
    #[inline]
    #[must_use]
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Returns `true` until unsubscribed or the registry disconnects.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Detaches from the feed. Idempotent.
    ///
    /// No callback runs after this returns.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.key, self.listener);
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("key", &self.key)
            .field("listener", &self.listener)
            .field("active", &self.is_active())
            .finish()
    }
}
