//! Push dispatcher.
//!
//! Routes push frames to the handler registered under their server-assigned
//! subscription key. The table belongs to one socket session and is cleared
//! when that socket is lost, since the server forgets its keys.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::identifiers::SubscriptionKey;
use crate::protocol::Push;

use super::listener::{PushHandler, invoke_guarded};

// ============================================================================
// PushDispatcher
// ============================================================================

/// Handler table keyed by subscription key.
#[derive(Default)]
pub(crate) struct PushDispatcher {
    handlers: Mutex<FxHashMap<SubscriptionKey, PushHandler>>,
}

impl PushDispatcher {
    /// Registers a handler, replacing any handler already under `key`.
    pub(crate) fn register(&self, key: SubscriptionKey, handler: PushHandler) {
        let replaced = self.handlers.lock().insert(key.clone(), handler);
        if replaced.is_some() {
            debug!(%key, "Replaced push handler");
        } else {
            trace!(%key, "Registered push handler");
        }
    }

    /// Removes the handler under `key`.
    pub(crate) fn remove(&self, key: &SubscriptionKey) -> bool {
        self.handlers.lock().remove(key).is_some()
    }

    /// Delivers a push to its handler.
    ///
    /// Returns `false` if no handler is registered. The handler runs
    /// after the table lock is released.
    pub(crate) fn dispatch(&self, push: Push) -> bool {
        let handler = self.handlers.lock().get(&push.subscription_key).map(Arc::clone);

        match handler {
            Some(handler) => {
                let payload = push.payload;
                invoke_guarded("push handler", move || handler(payload));
                true
            }
            None => {
                debug!(key = %push.subscription_key, "Dropping push for unknown subscription");
                false
            }
        }
    }

    /// Drops every handler, returning how many were registered.
    pub(crate) fn clear(&self) -> usize {
        let mut handlers = self.handlers.lock();
        let count = handlers.len();
        handlers.clear();
        count
    }

    /// Returns the number of registered handlers.
    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
