//! Server subscription handle.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace};

use crate::error::Result;
use crate::identifiers::SubscriptionKey;

use super::Connection;

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// One live server subscription on a [`Connection`].
///
/// Dropping the handle removes the push handler and sends the unsubscribe
/// verb without waiting for the reply. Use
/// [`unsubscribe`](Self::unsubscribe) to wait for it.
///
/// A handle outlives the socket it was created on. Once that socket is
/// gone the server has already forgotten the key, so releasing the handle
/// only cleans up locally.
pub struct SubscriptionHandle {
    connection: Connection,
    key: SubscriptionKey,
    session: u64,
    active: bool,
}

impl SubscriptionHandle {
    pub(crate) fn new(connection: Connection, key: SubscriptionKey, session: u64) -> Self {
        Self {
            connection,
            key,
            session,
            active: true,
        }
    }

    /// Returns the server-assigned key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Returns `true` while the socket that created this subscription is up.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.active && self.connection.live_session() == self.session
    }

    /// Removes the handler and waits for the server to confirm.
    ///
    /// # Errors
    ///
    /// Returns the unsubscribe call's error. The local handler is removed
    /// regardless.
    pub async fn unsubscribe(mut self) -> Result<()> {
        if !self.release() {
            return Ok(());
        }

        let feed = self.connection.config().feed();
        let method = feed.unsubscribe_method.clone();
        let params = feed.unsubscribe_params(&self.key);
        self.connection.call(&method, params).await?;

        debug!(key = %self.key, "Unsubscribed");
        Ok(())
    }

    /// Marks the handle released and removes its handler.
    ///
    /// Returns `true` if the server still knows the key.
    fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;

        if self.connection.live_session() != self.session {
            trace!(key = %self.key, "Releasing subscription of a lost session");
            return false;
        }

        self.connection.dispatcher().remove(&self.key);
        true
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if self.release() {
            let feed = self.connection.config().feed();
            let params = feed.unsubscribe_params(&self.key);
            self.connection.fire(&feed.unsubscribe_method, params);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("key", &self.key)
            .field("session", &self.session)
            .field("active", &self.active)
            .finish()
    }
}
