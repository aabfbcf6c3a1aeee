//! Queue errors.
//!
//! Empty stacks and drained, terminated queues are not errors: they are
//! reported as `None`. The variants here cover the outcomes where a queue
//! operation could not do what it was asked.

/// Why a queue operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// `add` was called after `terminate`, or the queue terminated while the
    /// producer was waiting for a free slot. The value was not enqueued.
    #[error("queue is terminated")]
    Closed,

    /// The caller's cancel token fired while the operation was blocked.
    #[error("operation cancelled while blocked")]
    Cancelled,

    /// The deadline elapsed while the operation was blocked.
    #[error("operation timed out while blocked")]
    TimedOut,

    /// `try_add` found no free slot.
    #[error("queue is full")]
    Full,

    /// `try_remove` found the queue open and empty.
    #[error("queue is empty")]
    Empty,
}
