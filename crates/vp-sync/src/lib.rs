//! # vp-sync
//!
//! Concurrent building blocks for producer/consumer code.
//!
//! # Lock-Free Modules
//!
//! - `stack`: Treiber stack with epoch-based reclamation
//!
//! # Lock-Based Modules
//!
//! - `queue`: Bounded FIFO monitor with backpressure and a one-way
//!   termination signal
//!
//! # Supporting Modules
//!
//! - `cancel`: Cancellation token observed by blocking queue operations
//! - `config`: Queue construction parameters
//! - `error`: Queue error taxonomy
//!
//! # Loom
//!
//! The queue's mutex and condition variables come from the `sync` shim,
//! which swaps in loom's versions when built with:
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p vp-sync --release
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod queue;
pub mod stack;

mod sync;

pub use cancel::CancelToken;
pub use config::QueueConfig;
pub use error::QueueError;
pub use queue::BoundedBlockingQueue;
pub use stack::LockFreeStack;
