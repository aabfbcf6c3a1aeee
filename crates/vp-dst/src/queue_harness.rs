//! Fault injection for bounded blocking queues.
//!
//! Same shape as the stack harness: the queue stays pure, the runner drives
//! non-blocking operations from one thread and injects faults between them.
//! Because a single observer records every add and remove, the runner's
//! history is the linearization order and FIFO_Order can be checked exactly.

use vp_core::invariants::queue::{QueueProperties, QueuePropertyChecker};
use vp_core::{PropertyChecker, PropertyResult};
use vp_sync::{BoundedBlockingQueue, QueueError};

use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::stack_harness::{FaultPoint, FaultType};

/// Trait for queues testable with DST.
pub trait DstTestableQueue: Send + Sync {
    fn with_capacity(capacity: usize) -> Self;
    fn try_add(&self, value: u64) -> Result<(), QueueError>;
    fn try_remove(&self) -> Result<Option<u64>, QueueError>;
    fn terminate(&self);
    fn is_terminated(&self) -> bool;
    fn capacity(&self) -> usize;
    /// Buffered items, head first.
    fn contents(&self) -> Vec<u64>;
}

impl DstTestableQueue for BoundedBlockingQueue<u64> {
    fn with_capacity(capacity: usize) -> Self {
        BoundedBlockingQueue::new(capacity)
    }

    fn try_add(&self, value: u64) -> Result<(), QueueError> {
        BoundedBlockingQueue::try_add(self, value)
    }

    fn try_remove(&self) -> Result<Option<u64>, QueueError> {
        BoundedBlockingQueue::try_remove(self)
    }

    fn terminate(&self) {
        BoundedBlockingQueue::terminate(self);
    }

    fn is_terminated(&self) -> bool {
        BoundedBlockingQueue::is_terminated(self)
    }

    fn capacity(&self) -> usize {
        BoundedBlockingQueue::capacity(self)
    }

    fn contents(&self) -> Vec<u64> {
        self.snapshot()
    }
}

/// DST operation against a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDstOp {
    Add(u64),
    Remove,
    Terminate,
}

/// What a completed operation returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Added,
    Removed(u64),
    EndOfStream,
    Rejected(QueueError),
    Terminated,
}

/// DST test runner for bounded queues.
pub struct QueueDstRunner<Q> {
    queue: Q,
    rng: DeterministicRng,
    fault_injector: FaultInjector,
    seed: u64,
    added: Vec<u64>,
    removed: Vec<u64>,
    end_of_stream: Vec<(bool, usize)>,
    operations_count: u64,
    faults_injected: u64,
    rejected_operations: u64,
}

impl<Q: DstTestableQueue> QueueDstRunner<Q> {
    pub fn new(seed: u64, capacity: usize) -> Self {
        Self::with_fault_config(seed, capacity, FaultConfig::default())
    }

    pub fn with_fault_config(seed: u64, capacity: usize, config: FaultConfig) -> Self {
        Self {
            queue: Q::with_capacity(capacity),
            rng: DeterministicRng::new(seed),
            fault_injector: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            seed,
            added: Vec::new(),
            removed: Vec::new(),
            end_of_stream: Vec::new(),
            operations_count: 0,
            faults_injected: 0,
            rejected_operations: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Run one operation with faults at its boundaries.
    ///
    /// A crash before the operation means it never ran. A crash after means
    /// it ran and its effect is recorded, but the caller never saw the result.
    pub fn apply(&mut self, op: QueueDstOp) -> Result<QueueOutcome, FaultType> {
        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            return Err(FaultType::ThreadCrash);
        }

        let outcome = match op {
            QueueDstOp::Add(value) => match self.queue.try_add(value) {
                Ok(()) => {
                    self.added.push(value);
                    QueueOutcome::Added
                }
                Err(err) => {
                    self.rejected_operations += 1;
                    QueueOutcome::Rejected(err)
                }
            },
            QueueDstOp::Remove => match self.queue.try_remove() {
                Ok(Some(value)) => {
                    self.removed.push(value);
                    QueueOutcome::Removed(value)
                }
                Ok(None) => {
                    self.end_of_stream
                        .push((self.queue.is_terminated(), self.queue.contents().len()));
                    QueueOutcome::EndOfStream
                }
                Err(err) => {
                    self.rejected_operations += 1;
                    QueueOutcome::Rejected(err)
                }
            },
            QueueDstOp::Terminate => {
                self.queue.terminate();
                QueueOutcome::Terminated
            }
        };
        self.operations_count += 1;

        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::AfterOperation) {
            return Err(FaultType::ThreadCrash);
        }
        Ok(outcome)
    }

    fn maybe_inject_fault(&mut self, point: FaultPoint) -> Option<FaultType> {
        if !self.fault_injector.should_fail() {
            return None;
        }
        let fault = if self.rng.gen_bool(0.5) {
            FaultType::ThreadCrash
        } else {
            FaultType::Delay
        };
        self.faults_injected += 1;
        tracing::trace!(?point, ?fault, "fault injected");

        if fault == FaultType::Delay {
            std::thread::yield_now();
        }
        Some(fault)
    }

    pub fn check(&self) -> Vec<PropertyResult> {
        QueuePropertyChecker::new(self).with_seed(self.seed).check_all()
    }

    pub fn stats(&self) -> QueueDstStats {
        QueueDstStats {
            seed: self.seed,
            operations_count: self.operations_count,
            faults_injected: self.faults_injected,
            rejected_operations: self.rejected_operations,
            items_added: self.added.len() as u64,
            items_removed: self.removed.len() as u64,
        }
    }
}

impl<Q: DstTestableQueue> QueueProperties for QueueDstRunner<Q> {
    fn added_items(&self) -> Vec<u64> {
        self.added.clone()
    }

    fn removed_items(&self) -> Vec<u64> {
        self.removed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.contents()
    }

    fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    fn end_of_stream_reports(&self) -> Vec<(bool, usize)> {
        self.end_of_stream.clone()
    }
}

/// Statistics from a queue DST run.
#[derive(Debug, Clone)]
pub struct QueueDstStats {
    pub seed: u64,
    pub operations_count: u64,
    pub faults_injected: u64,
    /// Full, Empty or Closed results; expected, not failures
    pub rejected_operations: u64,
    pub items_added: u64,
    pub items_removed: u64,
}

impl QueueDstStats {
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} rejected={} added={} removed={}",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.rejected_operations,
            self.items_added,
            self.items_removed
        )
    }
}

/// Queue DST result.
#[derive(Debug)]
pub struct QueueDstResult {
    pub passed: bool,
    pub violations: Vec<PropertyResult>,
    pub stats: QueueDstStats,
}

impl QueueDstResult {
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());
        for violation in &self.violations {
            result.push_str(&format!("\n  VIOLATION: {}", violation));
        }
        result
    }
}

/// Run a queue DST scenario and check invariants at the end.
pub fn run_queue_scenario<Q: DstTestableQueue>(
    seed: u64,
    capacity: usize,
    operations: Vec<QueueDstOp>,
) -> QueueDstResult {
    let mut runner: QueueDstRunner<Q> = QueueDstRunner::new(seed, capacity);
    for op in operations {
        // Crashes are part of the test
        let _ = runner.apply(op);
    }

    let violations: Vec<PropertyResult> = runner.check().into_iter().filter(|r| !r.holds).collect();
    QueueDstResult {
        passed: violations.is_empty(),
        violations,
        stats: runner.stats(),
    }
}

/// Random add/remove workload with unique values and a late terminate.
///
/// The terminate lands in the last quarter so most of the run exercises an
/// open queue; a few removes after it exercise end of stream.
pub fn generate_queue_ops(rng: &mut DeterministicRng, count: usize) -> Vec<QueueDstOp> {
    let terminate_at = if count == 0 {
        0
    } else {
        rng.gen_range(count * 3 / 4..count)
    };
    let mut next_value = 1_u64;
    let mut ops = Vec::with_capacity(count + 1);
    for i in 0..count {
        if i == terminate_at {
            ops.push(QueueDstOp::Terminate);
        }
        if rng.gen_bool(0.5) {
            ops.push(QueueDstOp::Add(next_value));
            next_value += 1;
        } else {
            ops.push(QueueDstOp::Remove);
        }
    }
    ops
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Evicts the oldest item instead of rejecting when full.
    struct OverwritingQueue {
        capacity: usize,
        items: Mutex<VecDeque<u64>>,
        terminated: Mutex<bool>,
    }

    impl DstTestableQueue for OverwritingQueue {
        fn with_capacity(capacity: usize) -> Self {
            Self {
                capacity,
                items: Mutex::new(VecDeque::new()),
                terminated: Mutex::new(false),
            }
        }

        fn try_add(&self, value: u64) -> Result<(), QueueError> {
            let mut items = self.items.lock().unwrap();
            if items.len() == self.capacity {
                items.pop_front();
            }
            items.push_back(value);
            Ok(())
        }

        fn try_remove(&self) -> Result<Option<u64>, QueueError> {
            match self.items.lock().unwrap().pop_front() {
                Some(v) => Ok(Some(v)),
                None if *self.terminated.lock().unwrap() => Ok(None),
                None => Err(QueueError::Empty),
            }
        }

        fn terminate(&self) {
            *self.terminated.lock().unwrap() = true;
        }

        fn is_terminated(&self) -> bool {
            *self.terminated.lock().unwrap()
        }

        fn capacity(&self) -> usize {
            self.capacity
        }

        fn contents(&self) -> Vec<u64> {
            self.items.lock().unwrap().iter().copied().collect()
        }
    }

    #[test]
    fn test_runner_records_outcomes() {
        let mut runner: QueueDstRunner<BoundedBlockingQueue<u64>> =
            QueueDstRunner::with_fault_config(7, 1, FaultConfig::none());

        assert_eq!(runner.apply(QueueDstOp::Remove), Ok(QueueOutcome::Rejected(QueueError::Empty)));
        assert_eq!(runner.apply(QueueDstOp::Add(1)), Ok(QueueOutcome::Added));
        assert_eq!(
            runner.apply(QueueDstOp::Add(2)),
            Ok(QueueOutcome::Rejected(QueueError::Full))
        );
        assert_eq!(runner.apply(QueueDstOp::Terminate), Ok(QueueOutcome::Terminated));
        assert_eq!(runner.apply(QueueDstOp::Remove), Ok(QueueOutcome::Removed(1)));
        assert_eq!(runner.apply(QueueDstOp::Remove), Ok(QueueOutcome::EndOfStream));

        assert!(runner.check().iter().all(|r| r.holds));
        let stats = runner.stats();
        assert_eq!(stats.items_added, 1);
        assert_eq!(stats.rejected_operations, 2);
    }

    #[test]
    fn test_scenario_bounded_queue() {
        let mut rng = DeterministicRng::new(99);
        let ops = generate_queue_ops(&mut rng, 400);
        let result = run_queue_scenario::<BoundedBlockingQueue<u64>>(99, 3, ops);
        assert!(result.passed, "DST failed: {}", result.format());
    }

    #[test]
    fn test_detects_overwriting_queue() {
        let mut runner: QueueDstRunner<OverwritingQueue> =
            QueueDstRunner::with_fault_config(1, 1, FaultConfig::none());
        runner.apply(QueueDstOp::Add(1)).unwrap();
        runner.apply(QueueDstOp::Add(2)).unwrap();

        let violations: Vec<_> = runner.check().into_iter().filter(|r| !r.holds).collect();
        assert!(violations.iter().any(|r| r.name == "NoLostItems"));
    }

    #[test]
    fn test_generated_ops_terminate_once() {
        let mut rng = DeterministicRng::new(5);
        let ops = generate_queue_ops(&mut rng, 100);
        let terminates = ops.iter().filter(|op| **op == QueueDstOp::Terminate).count();
        assert_eq!(terminates, 1);
        assert_eq!(ops.len(), 101);
    }

    #[test]
    fn test_determinism() {
        let mut rng = DeterministicRng::new(11);
        let ops = generate_queue_ops(&mut rng, 200);

        let result1 = run_queue_scenario::<BoundedBlockingQueue<u64>>(11, 2, ops.clone());
        let result2 = run_queue_scenario::<BoundedBlockingQueue<u64>>(11, 2, ops);
        assert_eq!(result1.stats.faults_injected, result2.stats.faults_injected);
        assert_eq!(result1.stats.items_removed, result2.stats.items_removed);
    }
}
