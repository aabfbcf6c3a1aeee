//! Invariant traits for verified concurrent primitives.
//!
//! ## Lock-free structures
//! - `stack`: Treiber stack invariants (NoLostElements, NoDuplicates, LIFO_Order)
//!
//! ## Lock-based structures
//! - `queue`: Bounded blocking queue invariants (NoLostItems, NoDuplicates,
//!   FIFO_Order, BoundedCapacity, EndOfStreamOnlyWhenDrained)

pub mod queue;
pub mod stack;

pub use queue::{QueueProperties, QueuePropertyChecker};
pub use stack::{StackHistory, StackOpType, StackOperation, StackProperties, StackPropertyChecker};
