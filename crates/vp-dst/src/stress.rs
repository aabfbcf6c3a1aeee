//! Multi-threaded stress runs on real threads.
//!
//! DST runners see one linear history; these runs trade that for real
//! interleavings. Only multiset properties are checked: every produced item
//! is observed exactly once. For the queue, the per-producer order is also
//! checked, since a single producer's adds are totally ordered.
//!
//! Each thread draws its yield decisions from its own seeded RNG, so a seed
//! reproduces the workload (not the OS schedule).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::any::Any;
use std::thread::{self, ScopedJoinHandle};

use vp_sync::{BoundedBlockingQueue, LockFreeStack};

use crate::random::DeterministicRng;

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Producer threads
    pub producers: usize,
    /// Consumer threads
    pub consumers: usize,
    /// Items each producer emits
    pub items_per_producer: u64,
    /// Queue capacity (0 = rendezvous); ignored by the stack run
    pub capacity: usize,
    /// Probability of yielding between operations
    pub yield_probability: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            consumers: 4,
            items_per_producer: 1_000,
            capacity: 8,
            yield_probability: 0.1,
        }
    }
}

impl StressConfig {
    /// Configuration for heavy stress testing.
    pub fn stress() -> Self {
        Self {
            producers: 8,
            consumers: 8,
            items_per_producer: 10_000,
            capacity: 2,
            yield_probability: 0.2,
        }
    }

    /// Configuration for quick testing.
    pub fn quick() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            items_per_producer: 200,
            capacity: 1,
            yield_probability: 0.05,
        }
    }

    fn total_items(&self) -> u64 {
        self.producers as u64 * self.items_per_producer
    }
}

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Seed used for the per-thread RNGs
    pub seed: u64,
    pub items_produced: u64,
    pub items_consumed: u64,
    /// Items never observed by any consumer
    pub lost_count: u64,
    /// Items observed more than once
    pub duplicate_count: u64,
    /// Worker threads that panicked
    pub panicked_workers: u64,
    /// Whether every check held
    pub passed: bool,
    /// First violation (if any)
    pub first_violation: Option<String>,
}

impl StressResult {
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!(
            "[{}] DST_SEED={} produced={} consumed={} lost={} duplicated={} panicked={}",
            status,
            self.seed,
            self.items_produced,
            self.items_consumed,
            self.lost_count,
            self.duplicate_count,
            self.panicked_workers
        );
        if let Some(violation) = &self.first_violation {
            result.push_str(&format!("\n  VIOLATION: {}", violation));
        }
        result
    }
}

/// Items are tagged with their producer in the high bits.
fn encode(producer: usize, sequence: u64) -> u64 {
    debug_assert!(sequence < 1 << 32, "Sequence overflows its field");
    ((producer as u64) << 32) | sequence
}

fn decode(item: u64) -> (usize, u64) {
    ((item >> 32) as usize, item & 0xFFFF_FFFF)
}

fn maybe_yield(rng: &mut DeterministicRng, probability: f64) {
    if probability > 0.0 && rng.gen_bool(probability) {
        thread::yield_now();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Join a worker, recording a panic instead of losing it.
fn join_worker<T: Default>(
    handle: ScopedJoinHandle<'_, T>,
    role: &str,
    panics: &mut Vec<String>,
) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => {
            let message = format!("{} panicked: {}", role, panic_message(payload.as_ref()));
            tracing::warn!(%message, "stress worker panicked");
            panics.push(message);
            T::default()
        }
    }
}

/// A worker panic is the root cause of anything else that went wrong, so it
/// becomes the reported violation.
fn record_panics(result: &mut StressResult, panics: Vec<String>) {
    result.panicked_workers = panics.len() as u64;
    if let Some(first) = panics.into_iter().next() {
        result.passed = false;
        result.first_violation = Some(first);
    }
}

/// Compare what consumers observed against what producers emitted.
fn tally(seed: u64, config: &StressConfig, observed: &[u64]) -> StressResult {
    let mut counts: HashMap<u64, u64> = HashMap::with_capacity(observed.len());
    for &item in observed {
        *counts.entry(item).or_insert(0) += 1;
    }

    let mut lost_count = 0;
    let mut first_violation = None;
    for producer in 0..config.producers {
        for sequence in 0..config.items_per_producer {
            if !counts.contains_key(&encode(producer, sequence)) {
                lost_count += 1;
                first_violation.get_or_insert_with(|| {
                    format!("Item {} of producer {} was never observed", sequence, producer)
                });
            }
        }
    }

    let mut duplicate_count = 0;
    for (&item, &count) in &counts {
        let (producer, sequence) = decode(item);
        if producer >= config.producers || sequence >= config.items_per_producer {
            first_violation
                .get_or_insert_with(|| format!("Item {:#x} was never produced", item));
        }
        if count > 1 {
            duplicate_count += count - 1;
            first_violation.get_or_insert_with(|| {
                format!(
                    "Item {} of producer {} observed {} times",
                    sequence, producer, count
                )
            });
        }
    }

    StressResult {
        seed,
        items_produced: config.total_items(),
        items_consumed: observed.len() as u64,
        lost_count,
        duplicate_count,
        panicked_workers: 0,
        passed: first_violation.is_none(),
        first_violation,
    }
}

struct ProducerDone<'a>(&'a AtomicUsize);

impl Drop for ProducerDone<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Release);
    }
}

/// Producers push while consumers pop concurrently; one extra reader
/// peeks and snapshots throughout. Whatever is left is drained at the end.
pub fn stress_stack(seed: u64, config: &StressConfig) -> StressResult {
    debug_assert!(config.producers > 0, "Must have at least one producer");

    let stack: LockFreeStack<u64> = LockFreeStack::new();
    let producers_done = AtomicUsize::new(0);

    let mut panics = Vec::new();
    let mut observed: Vec<u64> = thread::scope(|s| {
        let producers: Vec<_> = (0..config.producers)
            .map(|producer| {
                let stack = &stack;
                let producers_done = &producers_done;
                s.spawn(move || {
                    // Counted even if the producer panics, so consumers still stop
                    let _done = ProducerDone(producers_done);
                    let mut rng = DeterministicRng::new(seed.wrapping_add(producer as u64));
                    for sequence in 0..config.items_per_producer {
                        stack.push(encode(producer, sequence));
                        maybe_yield(&mut rng, config.yield_probability);
                    }
                })
            })
            .collect();

        let reader = s.spawn(|| {
            while producers_done.load(Ordering::Acquire) < config.producers {
                let _ = stack.peek();
                let snapshot = stack.snapshot();
                debug_assert!(snapshot.len() as u64 <= config.total_items());
                thread::yield_now();
            }
        });

        let consumers: Vec<_> = (0..config.consumers)
            .map(|consumer| {
                let stack = &stack;
                let producers_done = &producers_done;
                s.spawn(move || {
                    let mut rng = DeterministicRng::new(seed.wrapping_add(1_000 + consumer as u64));
                    let mut popped = Vec::new();
                    loop {
                        match stack.pop() {
                            Some(item) => popped.push(item),
                            None if producers_done.load(Ordering::Acquire) == config.producers => {
                                break
                            }
                            None => thread::yield_now(),
                        }
                        maybe_yield(&mut rng, config.yield_probability);
                    }
                    popped
                })
            })
            .collect();

        for handle in producers {
            join_worker(handle, "stack producer", &mut panics);
        }

        let popped: Vec<u64> = consumers
            .into_iter()
            .flat_map(|handle| join_worker(handle, "stack consumer", &mut panics))
            .collect();
        join_worker(reader, "stack reader", &mut panics);
        popped
    });

    while let Some(item) = stack.pop() {
        observed.push(item);
    }

    let mut result = tally(seed, config, &observed);
    if stack.size() != 0 {
        result.passed = false;
        result
            .first_violation
            .get_or_insert_with(|| format!("Drained stack reports size {}", stack.size()));
    }
    record_panics(&mut result, panics);
    tracing::debug!(result = %result.format(), "stack stress finished");
    result
}

/// Producers `add` into a bounded queue (rendezvous when capacity is 0)
/// while consumers `remove` until end of stream. The queue is terminated
/// once every producer has finished.
pub fn stress_queue(seed: u64, config: &StressConfig) -> StressResult {
    debug_assert!(config.consumers > 0, "Must have at least one consumer");

    let queue: BoundedBlockingQueue<u64> = BoundedBlockingQueue::new(config.capacity);

    let mut panics = Vec::new();
    let per_consumer: Vec<Vec<u64>> = thread::scope(|s| {
        let consumers: Vec<_> = (0..config.consumers)
            .map(|consumer| {
                let queue = &queue;
                s.spawn(move || {
                    let mut rng = DeterministicRng::new(seed.wrapping_add(1_000 + consumer as u64));
                    let mut removed = Vec::new();
                    while let Some(item) = queue.remove() {
                        removed.push(item);
                        maybe_yield(&mut rng, config.yield_probability);
                    }
                    removed
                })
            })
            .collect();

        let producers: Vec<_> = (0..config.producers)
            .map(|producer| {
                let queue = &queue;
                s.spawn(move || {
                    let mut rng = DeterministicRng::new(seed.wrapping_add(producer as u64));
                    for sequence in 0..config.items_per_producer {
                        if queue.add(encode(producer, sequence)).is_err() {
                            return;
                        }
                        maybe_yield(&mut rng, config.yield_probability);
                    }
                })
            })
            .collect();

        for handle in producers {
            join_worker(handle, "queue producer", &mut panics);
        }
        queue.terminate();

        consumers
            .into_iter()
            .map(|handle| join_worker(handle, "queue consumer", &mut panics))
            .collect()
    });

    let observed: Vec<u64> = per_consumer.iter().flatten().copied().collect();
    let mut result = tally(seed, config, &observed);

    // Each consumer sees any one producer's items in increasing order
    'consumers: for removed in &per_consumer {
        let mut last_seen: HashMap<usize, u64> = HashMap::new();
        for &item in removed {
            let (producer, sequence) = decode(item);
            if let Some(previous) = last_seen.insert(producer, sequence) {
                if previous >= sequence {
                    result.passed = false;
                    result.first_violation.get_or_insert_with(|| {
                        format!(
                            "Producer {} items removed out of order: {} before {}",
                            producer, previous, sequence
                        )
                    });
                    break 'consumers;
                }
            }
        }
    }

    record_panics(&mut result, panics);
    tracing::debug!(result = %result.format(), "queue stress finished");
    result
}
