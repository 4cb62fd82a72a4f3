//! Connection state.

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`](super::Connection).
///
/// ```text
/// Disconnected ──open──► Connecting ──handshake──► Connected
///      ▲                     │                         │
///      └──── backoff ◄───────┴───────── lost ──────────┘
///                            │
///                  attempts exhausted
///                            ▼
///                        Exhausted ──open──► Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No live socket.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open; frames are written immediately.
    Connected,
    /// Reconnection gave up. Terminal until the next `open()`.
    Exhausted,
}

impl ConnectionState {
    /// Returns `true` when frames are written immediately.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` once reconnection has given up.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Returns the state name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
