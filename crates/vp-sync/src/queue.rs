//! Bounded blocking queue - FIFO monitor with backpressure and termination.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostItems | unit tests, DST, stress |
//! | FIFO_Order | unit tests, DST, proptest |
//! | BoundedCapacity | DST, loom |
//! | EndOfStreamOnlyWhenDrained | unit tests, DST, loom |
//!
//! # Monitor
//!
//! One mutex guards the buffer, the termination flag and the hand-off
//! counters. Two condition variables carry the wake-ups:
//!
//! - `not_empty`: signalled once per successful `add`, and broadcast on
//!   `terminate`.
//! - `not_full`: broadcast by a `remove` that found the buffer at capacity,
//!   and on `terminate`.
//!
//! Every waiter re-checks its predicate after waking.
//!
//! # Lifecycle
//!
//! ```text
//! OPEN ──terminate()──> TERMINATED
//! ```
//!
//! Once terminated, `add` fails with `QueueError::Closed` (including
//! producers already blocked on a full buffer), and `remove` drains what is
//! left before reporting end of stream (`None`) forever after.
//!
//! # Rendezvous
//!
//! With capacity `0` the producer parks its value in a single hand-off slot
//! and stays blocked until a consumer takes it. A rendezvous producer that
//! times out or is cancelled pulls its value back out before returning.
//!
//! # Rejected values
//!
//! A failed `add`, `add_timeout`, `add_cancellable` or `try_add` drops the
//! value it was given before returning the error, including a retracted
//! rendezvous value. Callers that need the value back should keep a clone
//! (or an `Arc`) until the call succeeds.

use std::collections::VecDeque;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::sync::{Condvar, Mutex, MutexGuard};

/// A bounded FIFO queue whose producers block while it is full.
pub struct BoundedBlockingQueue<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    config: QueueConfig,
}

/// Monitor state.
struct State<T> {
    items: VecDeque<T>,
    terminated: bool,
    /// Values ever enqueued, minus rendezvous retractions.
    enqueued: u64,
    /// Values ever dequeued.
    dequeued: u64,
}

/// What a blocking call is prepared to wait for.
#[derive(Clone, Copy)]
struct WaitLimit<'a> {
    deadline: Option<Instant>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> WaitLimit<'a> {
    const FOREVER: Self = Self {
        deadline: None,
        cancel: None,
    };

    fn timeout(timeout: Duration) -> Self {
        Self {
            // A timeout too large to represent is treated as no deadline
            deadline: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    fn cancellable(token: &'a CancelToken) -> Self {
        Self {
            deadline: None,
            cancel: Some(token),
        }
    }
}

impl<T> BoundedBlockingQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// `capacity == 0` gives rendezvous semantics, not an unbounded queue.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_config(QueueConfig::new(capacity))
    }

    /// Create a queue from an explicit config.
    #[must_use]
    pub fn with_config(config: QueueConfig) -> Self {
        tracing::debug!(capacity = config.capacity, "bounded queue created");
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(config.slots()),
                terminated: false,
                enqueued: 0,
                dequeued: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            config,
        }
    }

    /// Capacity chosen at construction.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Append `value`, blocking while the queue is full.
    ///
    /// Wakes one blocked consumer. Fails with `QueueError::Closed` once the
    /// queue is terminated. On failure `value` is dropped.
    pub fn add(&self, value: T) -> Result<(), QueueError> {
        self.add_until(value, WaitLimit::FOREVER)
    }

    /// Like `add`, giving up with `QueueError::TimedOut` after `timeout`.
    /// On failure `value` is dropped.
    pub fn add_timeout(&self, value: T, timeout: Duration) -> Result<(), QueueError> {
        self.add_until(value, WaitLimit::timeout(timeout))
    }

    /// Like `add`, giving up with `QueueError::Cancelled` once `token` fires.
    /// On failure `value` is dropped.
    pub fn add_cancellable(&self, value: T, token: &CancelToken) -> Result<(), QueueError> {
        self.add_until(value, WaitLimit::cancellable(token))
    }

    /// Append `value` only if a slot is free right now.
    ///
    /// A rendezvous queue has no free slots to offer, so this always fails
    /// with `QueueError::Full` there; use `add` to hand a value off.
    pub fn try_add(&self, value: T) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.terminated {
            return Err(QueueError::Closed);
        }
        if self.config.capacity == 0 || state.items.len() >= self.config.capacity {
            return Err(QueueError::Full);
        }
        self.enqueue(&mut state, value);
        Ok(())
    }

    /// Remove the head item, blocking while the queue is open and empty.
    ///
    /// Returns `None` (end of stream) once the queue is terminated and
    /// drained.
    pub fn remove(&self) -> Option<T> {
        match self.remove_until(WaitLimit::FOREVER) {
            Ok(item) => item,
            // Unlimited waits only end when the predicate holds
            Err(_) => unreachable!("unbounded remove cannot time out or be cancelled"),
        }
    }

    /// Like `remove`, giving up with `QueueError::TimedOut` after `timeout`.
    pub fn remove_timeout(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        self.remove_until(WaitLimit::timeout(timeout))
    }

    /// Like `remove`, giving up with `QueueError::Cancelled` once `token`
    /// fires.
    pub fn remove_cancellable(&self, token: &CancelToken) -> Result<Option<T>, QueueError> {
        self.remove_until(WaitLimit::cancellable(token))
    }

    /// Remove the head item without blocking.
    ///
    /// Fails with `QueueError::Empty` if the queue is open and empty.
    pub fn try_remove(&self) -> Result<Option<T>, QueueError> {
        let mut state = self.lock();
        if state.items.is_empty() {
            return if state.terminated {
                Ok(None)
            } else {
                Err(QueueError::Empty)
            };
        }
        Ok(Some(self.dequeue(&mut state)))
    }

    /// Signal that no more items will arrive. Idempotent.
    ///
    /// Wakes every blocked consumer so it can drain or observe end of
    /// stream, and every producer blocked on a full buffer so it can fail
    /// with `QueueError::Closed`.
    pub fn terminate(&self) {
        let mut state = self.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        tracing::debug!(remaining = state.items.len(), "queue terminated");
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl<T: Clone> BoundedBlockingQueue<T> {
    /// Clone of the buffered items, head first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.iter().cloned().collect()
    }
}

impl<T> BoundedBlockingQueue<T> {
    fn add_until(&self, value: T, limit: WaitLimit<'_>) -> Result<(), QueueError> {
        let mut state = self.lock();
        loop {
            if state.terminated {
                return Err(QueueError::Closed);
            }
            if state.items.len() < self.config.slots() {
                break;
            }
            let (guard, interrupted) = self.wait(&self.not_full, state, limit);
            state = guard;
            if let Some(err) = interrupted {
                return Err(err);
            }
        }

        self.enqueue(&mut state, value);

        if self.config.capacity == 0 {
            self.await_handoff(state, limit)?;
        }
        Ok(())
    }

    /// Block a rendezvous producer until its value has been taken.
    ///
    /// Termination does not release it: the value was accepted while the
    /// queue was open and is still drained by consumers.
    fn await_handoff(
        &self,
        mut state: MutexGuard<'_, State<T>>,
        limit: WaitLimit<'_>,
    ) -> Result<(), QueueError> {
        let ticket = state.enqueued;
        while state.dequeued < ticket {
            let (guard, interrupted) = self.wait(&self.not_full, state, limit);
            state = guard;
            if state.dequeued >= ticket {
                break;
            }
            if let Some(err) = interrupted {
                // The single hand-off slot still holds our value
                debug_assert_eq!(state.items.len(), 1, "Rendezvous slot must hold one value");
                state.items.pop_back();
                state.enqueued -= 1;
                tracing::trace!(?err, "rendezvous add retracted");
                drop(state);
                self.not_full.notify_all();
                return Err(err);
            }
        }
        Ok(())
    }

    fn remove_until(&self, limit: WaitLimit<'_>) -> Result<Option<T>, QueueError> {
        let mut state = self.lock();
        loop {
            if !state.items.is_empty() {
                break;
            }
            if state.terminated {
                return Ok(None);
            }
            let (guard, interrupted) = self.wait(&self.not_empty, state, limit);
            state = guard;
            if let Some(err) = interrupted {
                return Err(err);
            }
        }
        Ok(Some(self.dequeue(&mut state)))
    }

    fn enqueue(&self, state: &mut State<T>, value: T) {
        state.items.push_back(value);
        state.enqueued += 1;
        debug_assert!(
            state.items.len() <= self.config.slots(),
            "Queue exceeded capacity"
        );
        self.not_empty.notify_one();
    }

    fn dequeue(&self, state: &mut State<T>) -> T {
        let was_full = state.items.len() == self.config.slots();
        let Some(item) = state.items.pop_front() else {
            unreachable!("dequeue called on an empty buffer");
        };
        state.dequeued += 1;
        tracing::trace!(len = state.items.len(), "queue item removed");
        if was_full {
            // One slot freed, but every producer re-checks for itself
            self.not_full.notify_all();
        }
        item
    }

    /// Wait once on `condvar`, honouring `limit`.
    ///
    /// Returns the reacquired guard and, if the limit was hit before
    /// waiting, the error to report. A normal (or spurious) wake returns
    /// `None`; the caller re-checks its predicate.
    fn wait<'g>(
        &self,
        condvar: &Condvar,
        state: MutexGuard<'g, State<T>>,
        limit: WaitLimit<'_>,
    ) -> (MutexGuard<'g, State<T>>, Option<QueueError>) {
        if limit.cancel.is_some_and(CancelToken::is_cancelled) {
            tracing::trace!("blocked queue operation cancelled");
            return (state, Some(QueueError::Cancelled));
        }

        let poll = limit.cancel.map(|_| self.config.cancel_poll_interval);
        let remaining = match limit.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    tracing::trace!("blocked queue operation timed out");
                    return (state, Some(QueueError::TimedOut));
                }
                Some(remaining)
            }
            None => None,
        };

        let timeout = match (remaining, poll) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let state = match timeout {
            Some(timeout) => {
                condvar
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => condvar.wait(state).unwrap_or_else(PoisonError::into_inner),
        };
        (state, None)
    }

    /// Lock the monitor. Every critical section leaves the state consistent
    /// before user code can run, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for BoundedBlockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedBlockingQueue")
            .field("capacity", &self.config.capacity)
            .field("len", &state.items.len())
            .field("terminated", &state.terminated)
            .finish()
    }
}
