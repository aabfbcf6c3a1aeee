//! # vp-dst
//!
//! Deterministic Simulation Testing for the `vp-sync` primitives.
//!
//! All randomness flows from a seed, so a failing run reproduces exactly.
//! Faults are injected at operation boundaries by the runners; the
//! structures under test carry no test hooks.
//!
//! ## Harnesses
//!
//! - `stack_harness`: lock-free stack (NoLostElements, NoDuplicates, LIFO_Order)
//! - `queue_harness`: bounded blocking queue (NoLostItems, NoDuplicates,
//!   FIFO_Order, BoundedCapacity, EndOfStreamOnlyWhenDrained)
//! - `stress`: real threads, `P` producers and `C` consumers
//!
//! ## Usage
//!
//! ```rust
//! use vp_dst::{generate_stack_ops, run_dst_scenario, DeterministicRng};
//! use vp_sync::LockFreeStack;
//!
//! let seed = 12345;
//! let ops = generate_stack_ops(&mut DeterministicRng::new(seed), 100);
//! let result = run_dst_scenario::<LockFreeStack<u64>>(seed, ops);
//! assert!(result.passed, "{}", result.format());
//! ```
//!
//! ## Reproducibility
//!
//! To reproduce a failing test:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod fault;
pub mod queue_harness;
pub mod random;
pub mod stack_harness;
pub mod stress;

pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use queue_harness::{
    generate_queue_ops, run_queue_scenario, DstTestableQueue, QueueDstOp, QueueDstResult,
    QueueDstRunner, QueueDstStats, QueueOutcome,
};
pub use random::DeterministicRng;
pub use stack_harness::{
    generate_stack_ops, run_dst_scenario, DstOp, DstResult, DstRunner, DstStats,
    DstTestableStack, FaultPoint, FaultType,
};
pub use stress::{stress_queue, stress_stack, StressConfig, StressResult};

/// Iterations used when `DST_ITERATIONS` is unset.
pub const DEFAULT_ITERATIONS: u64 = 100;

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED") {
        Ok(s) => {
            let seed: u64 = s.parse().expect("DST_SEED must be a valid u64");
            println!("DST_SEED={} (from environment)", seed);
            seed
        }
        Err(_) => {
            let seed = rand::random::<u64>();
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
    }
}

/// Number of seeded iterations to run, from `DST_ITERATIONS`.
#[must_use]
pub fn iterations() -> u64 {
    match std::env::var("DST_ITERATIONS") {
        Ok(s) => s.parse().expect("DST_ITERATIONS must be a valid u64"),
        Err(_) => DEFAULT_ITERATIONS,
    }
}
