//! Callback types and panic isolation.
//!
//! User callbacks run on the connection's event loop. A panicking callback
//! is caught and logged so it cannot take the loop, or its sibling
//! listeners, down with it.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use super::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Handler for push payloads of one server subscription.
pub type PushHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Observer of connection state transitions.
pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

// ============================================================================
// Functions
// ============================================================================

/// Runs a callback, catching and logging a panic.
///
/// Returns `false` if the callback panicked.
pub(crate) fn invoke_guarded(context: &'static str, callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            error!(context, panic = %panic_message(&panic), "Callback panicked");
            false
        }
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_guarded_runs_callback() {
        let mut ran = false;
        assert!(invoke_guarded("test", || ran = true));
        assert!(ran);
    }

    #[test]
    fn test_invoke_guarded_catches_panic() {
        assert!(!invoke_guarded("test", || panic!("listener failed")));
    }
}
