//! Cancellation for blocked queue operations.
//!
//! Threads blocked in `add_cancellable` / `remove_cancellable` check the
//! token every `QueueConfig::cancel_poll_interval` and return
//! `QueueError::Cancelled` once it fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable, one-way cancellation flag.
///
/// Clones share the same flag: cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
