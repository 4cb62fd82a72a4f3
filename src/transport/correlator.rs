//! Call correlator.
//!
//! Tracks calls awaiting a response and matches responses to them by
//! [`RequestId`]. Responses may arrive in any order.
//!
//! A call is removed from the table the moment its response is seen, when
//! the caller abandons it, or when the socket it was written on dies. Every
//! removal path either wakes the caller or happens because the caller is
//! gone.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SubscriptionKey};
use crate::protocol::Response;

use super::dispatcher::PushDispatcher;
use super::listener::PushHandler;

// ============================================================================
// Types
// ============================================================================

/// Receiving half handed to the caller.
pub(crate) type ReplyReceiver = oneshot::Receiver<Result<Reply>>;

/// Successful outcome of a call.
#[derive(Debug)]
pub(crate) struct Reply {
    /// The `result` member of the response.
    pub result: Value,
    /// Socket session the response arrived on.
    pub session: u64,
    /// Key under which the subscribe hook was registered.
    pub subscription: Option<SubscriptionKey>,
}

/// A call awaiting its response.
struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Reply>>,
    /// Session the frame was written in; `None` while queued.
    sent_in: Option<u64>,
    /// Push handler to register under the returned subscription key.
    hook: Option<PushHandler>,
}

// ============================================================================
// Correlator
// ============================================================================

/// Pending call table with a per-connection id counter.
pub(crate) struct Correlator {
    pending: Mutex<FxHashMap<RequestId, PendingCall>>,
    next_id: AtomicU64,
    max_pending: usize,
}

impl Correlator {
    /// Creates an empty table. Ids start at 1.
    pub(crate) fn new(max_pending: usize) -> Self {
        Self {
            pending: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            max_pending,
        }
    }

    /// Allocates an id and stores a pending call under it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyPending`] when the table is full.
    pub(crate) fn register(
        &self,
        method: &str,
        hook: Option<PushHandler>,
    ) -> Result<(RequestId, ReplyReceiver)> {
        let mut pending = self.pending.lock();

        if pending.len() >= self.max_pending {
            warn!(
                pending = pending.len(),
                max = self.max_pending,
                "Too many pending requests"
            );
            return Err(Error::too_many_pending(self.max_pending));
        }

        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
                sent_in: None,
                hook,
            },
        );

        Ok((id, rx))
    }

    /// Returns `true` if the call is still awaiting a response.
    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Records the session a call's frame was written in.
    pub(crate) fn mark_sent(&self, id: RequestId, session: u64) {
        if let Some(call) = self.pending.lock().get_mut(&id) {
            call.sent_in = Some(session);
        }
    }

    /// Completes the call matching `response`.
    ///
    /// For subscribe calls the push handler is registered in `dispatcher`
    /// before the caller is woken. Returns the subscription key if the
    /// caller went away in between, so the server side can be released.
    pub(crate) fn resolve(
        &self,
        response: Response,
        session: u64,
        dispatcher: &PushDispatcher,
    ) -> Option<SubscriptionKey> {
        let id = response.id;
        let Some(call) = self.pending.lock().remove(&id) else {
            warn!(%id, "Response for unknown request");
            return None;
        };

        let PendingCall {
            method, tx, hook, ..
        } = call;

        let mut registered = None;
        let outcome = match (response.into_result(), hook) {
            (Ok(result), Some(handler)) => match SubscriptionKey::from_result(&result) {
                Some(key) => {
                    dispatcher.register(key.clone(), handler);
                    registered = Some(key.clone());
                    Ok(Reply {
                        result,
                        session,
                        subscription: Some(key),
                    })
                }
                None => Err(Error::protocol(format!(
                    "{method} result carries no subscription key: {result}"
                ))),
            },
            (Ok(result), None) => Ok(Reply {
                result,
                session,
                subscription: None,
            }),
            (Err(e), _) => Err(e),
        };

        trace!(%id, %method, ok = outcome.is_ok(), "Call resolved");

        if tx.send(outcome).is_err() {
            debug!(%id, %method, "Caller gone before response");
            if let Some(key) = registered {
                dispatcher.remove(&key);
                return Some(key);
            }
        }

        None
    }

    /// Fails one call.
    pub(crate) fn reject(&self, id: RequestId, error: Error) -> bool {
        let Some(call) = self.pending.lock().remove(&id) else {
            return false;
        };
        debug!(%id, method = %call.method, error = %error, "Call rejected");
        let _ = call.tx.send(Err(error));
        true
    }

    /// Fails every call written in `session`.
    ///
    /// Calls still queued are left alone; they are flushed on the next
    /// session.
    pub(crate) fn reject_session(&self, session: u64, error: impl Fn() -> Error) -> usize {
        let lost: Vec<PendingCall> = {
            let mut pending = self.pending.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, call)| call.sent_in == Some(session))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let count = lost.len();
        for call in lost {
            let _ = call.tx.send(Err(error()));
        }
        count
    }

    /// Fails every pending call.
    pub(crate) fn reject_all(&self, error: impl Fn() -> Error) -> usize {
        let pending: Vec<PendingCall> = self.pending.lock().drain().map(|(_, call)| call).collect();

        let count = pending.len();
        for call in pending {
            let _ = call.tx.send(Err(error()));
        }
        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Drops a call without waking anyone.
    pub(crate) fn forget(&self, id: RequestId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Returns the number of pending calls.
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
