//! Queue configuration.

use std::time::Duration;

/// How often a blocked cancellable operation re-checks its token.
pub const DEFAULT_CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Construction parameters for `BoundedBlockingQueue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of buffered items. `0` means rendezvous: every `add`
    /// waits until a `remove` takes its value.
    pub capacity: usize,
    /// Upper bound on how long a cancelled waiter keeps sleeping before it
    /// notices its token.
    pub cancel_poll_interval: Duration,
}

impl QueueConfig {
    /// Config with the given capacity and default poll interval.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
        }
    }

    /// Set the cancel poll interval.
    #[must_use]
    pub fn with_cancel_poll_interval(mut self, interval: Duration) -> Self {
        debug_assert!(!interval.is_zero(), "Poll interval must be non-zero");
        self.cancel_poll_interval = interval;
        self
    }

    /// Number of values the buffer can physically hold. A rendezvous queue
    /// still needs one hand-off slot.
    pub(crate) fn slots(&self) -> usize {
        self.capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::new(8);
        assert_eq!(config.capacity, 8);
        assert_eq!(config.cancel_poll_interval, DEFAULT_CANCEL_POLL_INTERVAL);
        assert_eq!(config.slots(), 8);
    }

    #[test]
    fn test_rendezvous_has_one_slot() {
        assert_eq!(QueueConfig::new(0).slots(), 1);
    }

    #[test]
    fn test_builder() {
        let config = QueueConfig::new(1).with_cancel_poll_interval(Duration::from_millis(1));
        assert_eq!(config.cancel_poll_interval, Duration::from_millis(1));
    }
}
