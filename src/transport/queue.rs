//! Outbound frame queue used while the socket is down.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::config::{OverflowPolicy, QueuePolicy};
use crate::identifiers::RequestId;

// ============================================================================
// QueuedFrame
// ============================================================================

/// A serialized frame waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedFrame {
    /// Correlation id of the call.
    pub request_id: RequestId,
    /// Serialized JSON text.
    pub text: String,
}

impl QueuedFrame {
    /// Creates a frame for a correlated call.
    pub(crate) fn request(id: RequestId, text: String) -> Self {
        Self {
            request_id: id,
            text,
        }
    }
}

// ============================================================================
// Enqueued
// ============================================================================

/// Outcome of [`OutboundQueue::push`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// Frame queued without side effects.
    Accepted,
    /// Frame queued; the oldest frame was evicted to make room.
    Evicted(QueuedFrame),
    /// Frame refused because the queue is full.
    Rejected(QueuedFrame),
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// Bounded FIFO of frames written on the next successful connect.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    frames: VecDeque<QueuedFrame>,
    policy: QueuePolicy,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        Self {
            frames: VecDeque::new(),
            policy,
        }
    }

    /// Appends a frame, applying the overflow policy when full.
    pub(crate) fn push(&mut self, frame: QueuedFrame) -> Enqueued {
        if self.frames.len() < self.policy.capacity {
            self.frames.push_back(frame);
            return Enqueued::Accepted;
        }

        match self.policy.overflow {
            OverflowPolicy::Reject => Enqueued::Rejected(frame),
            OverflowPolicy::DropOldest => {
                let evicted = self.frames.pop_front();
                self.frames.push_back(frame);
                match evicted {
                    Some(evicted) => Enqueued::Evicted(evicted),
                    None => Enqueued::Accepted,
                }
            }
        }
    }

    /// Puts a frame back at the head after a failed write.
    ///
    /// Ignores capacity: the frame was already accepted once.
    pub(crate) fn push_front(&mut self, frame: QueuedFrame) {
        self.frames.push_front(frame);
    }

    /// Removes the oldest frame.
    pub(crate) fn pop(&mut self) -> Option<QueuedFrame> {
        self.frames.pop_front()
    }

    /// Removes the queued frame of an abandoned call.
    pub(crate) fn remove(&mut self, id: RequestId) -> bool {
        let before = self.frames.len();
        self.frames.retain(|frame| frame.request_id != id);
        self.frames.len() != before
    }

    /// Drops every queued frame, returning how many were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        count
    }

    /// Returns the number of queued frames.
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if nothing is queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the configured capacity.
    pub(crate) fn capacity(&self) -> usize {
        self.policy.capacity
    }
}

// ============================================================================
// Tests
// ============================================================================
