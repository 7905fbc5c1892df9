//! Sequence bookkeeping shared by the receive loop and the heartbeat task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Last dispatch sequence number seen on this connection.
///
/// The receive loop is the only writer; the heartbeat task reads it. The
/// stored value never goes backwards: an older sequence arriving late leaves
/// the slot untouched. The full `u64` range is stored as received.
#[derive(Debug)]
pub struct SequenceTracker {
    value: AtomicU64,
    seen: AtomicBool,
}

impl SequenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            seen: AtomicBool::new(false),
        }
    }

    /// Current sequence, or `None` if no dispatch has been seen.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        self.seen
            .load(Ordering::Acquire)
            .then(|| self.value.load(Ordering::Acquire))
    }

    /// Record a sequence number from an inbound frame.
    ///
    /// Returns the value held before this call.
    pub fn observe(&self, sequence: u64) -> Option<u64> {
        let previous = self.value.fetch_max(sequence, Ordering::AcqRel);
        let was_seen = self.seen.swap(true, Ordering::AcqRel);
        was_seen.then_some(previous)
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection state created by the handshake and dropped on close.
#[derive(Debug)]
pub struct SessionState {
    sequence: SequenceTracker,
    heartbeat_interval: Duration,
}

impl SessionState {
    /// Create session state for the interval announced in hello.
    #[must_use]
    pub const fn new(heartbeat_interval: Duration) -> Self {
        Self {
            sequence: SequenceTracker::new(),
            heartbeat_interval,
        }
    }

    /// Sequence tracker for this connection.
    #[must_use]
    pub const fn sequence(&self) -> &SequenceTracker {
        &self.sequence
    }

    /// Heartbeat interval announced by the server.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
}
