//! Treiber Stack - Lock-free LIFO stack.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | unit tests, DST, stress |
//! | NoDuplicates | unit tests, DST, stress |
//! | LIFO_Order | unit tests, DST, proptest |
//! | ABA_Safety | epoch GC |
//!
//! # Memory Safety
//!
//! Nodes are reclaimed with crossbeam-epoch. A node unlinked by `pop` is
//! handed to `defer_destroy` and freed only once every thread that could
//! still hold a reference to it has unpinned, so no thread ever reads freed
//! memory and a node address cannot be reused while a stale CAS could still
//! compare against it.
//!
//! `peek` and `snapshot` clone values out of nodes that another thread may
//! be popping. Each node counts its in-flight readers; `pop` marks the node
//! taken and waits for that count to drain before moving the value out.
//! The two sides are ordered by a SeqCst fence each: either the reader sees
//! `taken`, or the popper sees the reader's increment. This handshake is
//! model-checked with loom (`RUSTFLAGS="--cfg loom"`).
//!
//! # Size
//!
//! `size()` is a hint. The counter is bumped before a push is installed and
//! dropped after a pop's CAS succeeds, so it never under-reports and is
//! exact whenever the stack is quiescent.

use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::{self as std_atomic, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::{Backoff, CachePadded};

use crate::sync::{fence, snooze, AtomicBool, AtomicUsize, UnsafeCell};

/// A lock-free Treiber stack.
///
/// Classic design by R. Kent Treiber (1986): a single atomically updated
/// top pointer. `push` and `pop` are linearizable at their successful CAS.
/// Failed CAS attempts back off by spinning, then yielding; they never sleep.
pub struct LockFreeStack<T> {
    /// Pointer to top node
    head: CachePadded<Atomic<Node<T>>>,
    /// Approximate element count
    len: CachePadded<std_atomic::AtomicUsize>,
}

/// Node in the stack.
struct Node<T> {
    /// Moved out exactly once, by the pop that unlinks the node.
    value: UnsafeCell<ManuallyDrop<T>>,
    next: Atomic<Node<T>>,
    /// Threads currently cloning `value`.
    readers: AtomicUsize,
    /// Set by the unlinking pop before it moves `value` out.
    taken: AtomicBool,
}

impl<T> Node<T> {
    fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(ManuallyDrop::new(value)),
            next: Atomic::null(),
            readers: AtomicUsize::new(0),
            taken: AtomicBool::new(false),
        }
    }

    /// Move the value out of an unlinked node.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, by the thread whose CAS unlinked the node.
    unsafe fn take(&self) -> T {
        self.taken.store(true, Ordering::Relaxed);
        // Pairs with the fence in `try_clone`
        fence(Ordering::SeqCst);
        let backoff = Backoff::new();
        // Acquire: every finished reader's clone happens before the move
        while self.readers.load(Ordering::Acquire) != 0 {
            snooze(&backoff);
        }
        self.value.with_mut(|value| ManuallyDrop::into_inner(ptr::read(value)))
    }
}

impl<T: Clone> Node<T> {
    /// Clone the value unless a pop has already claimed it.
    fn try_clone(&self) -> Option<T> {
        self.readers.fetch_add(1, Ordering::Relaxed);
        let _pin = ReaderPin(&self.readers);
        // Pairs with the fence in `take`
        fence(Ordering::SeqCst);
        if self.taken.load(Ordering::Relaxed) {
            return None;
        }
        // Safety: `taken` was clear after our increment was published, so
        // the popper waits for `_pin` before moving the value out.
        Some(self.value.with(|value| unsafe { T::clone(&*value) }))
    }
}

/// Releases a reader slot even if `Clone` panics.
struct ReaderPin<'a>(&'a AtomicUsize);

impl Drop for ReaderPin<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Release);
    }
}

impl<T> LockFreeStack<T> {
    /// Create a new empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(Atomic::null()),
            len: CachePadded::new(std_atomic::AtomicUsize::new(0)),
        }
    }

    /// Push a value onto the stack.
    ///
    /// Lock-free: retries only when another thread's CAS succeeded in
    /// between, so some thread always makes progress.
    pub fn push(&self, value: T) {
        let mut node = Owned::new(Node::new(value));
        self.len.fetch_add(1, Ordering::Relaxed);

        let backoff = Backoff::new();
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);

            match self.head.compare_exchange(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
                &guard,
            ) {
                Ok(_) => return,
                Err(e) => {
                    // CAS failed - retry with same node
                    node = e.new;
                    backoff.snooze();
                }
            }
        }
    }

    /// Pop the top value.
    ///
    /// Lock-free across threads, but a pop that has already unlinked its node
    /// waits for any `peek` or `snapshot` still cloning that node's value. A
    /// `Clone` impl that stalls therefore stalls that one popper; every other
    /// thread keeps making progress.
    ///
    /// Returns `None` if the stack is empty. A stored value that is itself
    /// "empty" (say `Option::None` in a `LockFreeStack<Option<_>>`) comes back
    /// as `Some(None)`.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // Safety: the guard keeps any node reachable at load time alive.
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Relaxed, &guard);

            match self.head.compare_exchange(
                head,
                next,
                Ordering::Acquire,
                Ordering::Relaxed,
                &guard,
            ) {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    // Safety: our CAS unlinked the node, so we are its only
                    // taker, and destruction waits for every pinned reader.
                    unsafe {
                        let value = node.take();
                        guard.defer_destroy(head);
                        return Some(value);
                    }
                }
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Check if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Approximate size.
    ///
    /// Exact after sequential use. Under concurrency it may briefly include
    /// pushes not yet installed and pops not yet accounted.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T: Clone> LockFreeStack<T> {
    /// Clone of the top value, or `None` if the stack is empty.
    pub fn peek(&self) -> Option<T> {
        let backoff = Backoff::new();
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let node = unsafe { head.as_ref() }?;
            match node.try_clone() {
                Some(value) => return Some(value),
                // Popped under us; the head has moved on.
                None => backoff.spin(),
            }
        }
    }

    /// Top-to-bottom copy of the contents.
    ///
    /// Memory safe under concurrent use, but only a consistent view of the
    /// stack when no other thread is mutating it.
    pub fn snapshot(&self) -> Vec<T> {
        let guard = epoch::pin();
        let mut result = Vec::new();
        let mut current = self.head.load(Ordering::Acquire, &guard);

        while let Some(node) = unsafe { current.as_ref() } {
            if let Some(value) = node.try_clone() {
                result.push(value);
            }
            current = node.next.load(Ordering::Acquire, &guard);
        }

        result
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

// Safety: values move between threads through push/pop. Sharing additionally
// needs `T: Sync` because peek clones through `&T` from any thread.
unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send + Sync> Sync for LockFreeStack<T> {}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        let mut dropped = 0_usize;
        // Safety: `&mut self` means no other thread can reach the nodes.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while let Some(node) = current.as_ref() {
                let next = node.next.load(Ordering::Relaxed, guard);
                let owned = current.into_owned();
                owned.value.with_mut(|value| ManuallyDrop::drop(&mut *value));
                dropped += 1;
                current = next;
            }
        }
        tracing::trace!(dropped, "lock-free stack dropped");
    }
}
