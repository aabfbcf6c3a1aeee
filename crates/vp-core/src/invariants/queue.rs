//! Bounded queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostItems | Every added item is buffered or was removed |
//! | NoDuplicates | No item is removed twice |
//! | FIFO_Order | Items are removed in the order they were added |
//! | BoundedCapacity | The buffer never holds more than its capacity |
//! | EndOfStreamOnlyWhenDrained | End of stream is only reported by a terminated, empty queue |
//!
//! FIFO_Order assumes a single observer recording adds and removes in their
//! linearization order (as the DST runner does). Multi-threaded harnesses
//! should only rely on the multiset properties.

use std::collections::HashSet;

use crate::counterexample::{Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

/// Properties that any bounded queue implementation must satisfy.
pub trait QueueProperties {
    /// Items that were accepted by `add`, in acceptance order.
    fn added_items(&self) -> Vec<u64>;

    /// Items returned by `remove`, in removal order.
    fn removed_items(&self) -> Vec<u64>;

    /// Current buffered items (head to tail).
    fn current_contents(&self) -> Vec<u64>;

    /// Configured capacity. A rendezvous queue (capacity 0) may still hold
    /// the single value being handed off.
    fn capacity(&self) -> usize;

    /// Observations made at each end-of-stream report:
    /// `(terminated, items_buffered)` as seen at that moment.
    fn end_of_stream_reports(&self) -> Vec<(bool, usize)>;
}

/// Property checker for bounded queue implementations.
pub struct QueuePropertyChecker<'a, Q: QueueProperties> {
    queue: &'a Q,
    dst_seed: Option<u64>,
}

impl<'a, Q: QueueProperties> QueuePropertyChecker<'a, Q> {
    #[must_use]
    pub fn new(queue: &'a Q) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dst_seed = Some(seed);
        self
    }

    /// NoLostItems
    fn check_no_lost_items(&self) -> PropertyResult {
        let added = self.queue.added_items();
        let removed: HashSet<u64> = self.queue.removed_items().into_iter().collect();
        let contents: HashSet<u64> = self.queue.current_contents().into_iter().collect();

        for item in &added {
            if !removed.contains(item) && !contents.contains(item) {
                let mut ce = match self.dst_seed {
                    Some(seed) => Counterexample::with_seed(seed),
                    None => Counterexample::new(),
                };
                ce.add_state(StateSnapshot {
                    step: 1,
                    description: format!("Item {} lost", item),
                    variables: vec![
                        ("added".to_string(), format!("{:?}", added)),
                        ("removed".to_string(), format!("{:?}", removed)),
                        ("contents".to_string(), format!("{:?}", contents)),
                    ],
                });
                return PropertyResult::fail(
                    "NoLostItems",
                    format!("Item {} was added but is neither buffered nor removed", item),
                    Some(ce),
                );
            }
        }

        PropertyResult::pass("NoLostItems")
    }

    /// NoDuplicates
    fn check_no_duplicates(&self) -> PropertyResult {
        let mut seen = HashSet::new();
        for item in self.queue.removed_items() {
            if !seen.insert(item) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Item {} was removed more than once", item),
                    None,
                );
            }
        }
        PropertyResult::pass("NoDuplicates")
    }

    /// FIFO_Order
    ///
    /// Removed items followed by buffered items must be exactly the added
    /// items, in order.
    fn check_fifo_order(&self) -> PropertyResult {
        let added = self.queue.added_items();
        let removed = self.queue.removed_items();
        let contents = self.queue.current_contents();

        for (i, item) in removed.iter().chain(contents.iter()).enumerate() {
            match added.get(i) {
                Some(expected) if expected == item => {}
                Some(expected) => {
                    return PropertyResult::fail(
                        "FIFO_Order",
                        format!(
                            "Item at position {} is {} but {} was added there",
                            i, item, expected
                        ),
                        None,
                    );
                }
                None => {
                    return PropertyResult::fail(
                        "FIFO_Order",
                        format!("Item {} at position {} was never added", item, i),
                        None,
                    );
                }
            }
        }

        PropertyResult::pass("FIFO_Order")
    }

    /// BoundedCapacity
    fn check_bounded_capacity(&self) -> PropertyResult {
        let len = self.queue.current_contents().len();
        let limit = self.queue.capacity().max(1);

        if len > limit {
            return PropertyResult::fail(
                "BoundedCapacity",
                format!(
                    "Queue holds {} items but capacity is {}",
                    len,
                    self.queue.capacity()
                ),
                None,
            );
        }
        PropertyResult::pass("BoundedCapacity")
    }

    /// EndOfStreamOnlyWhenDrained
    fn check_end_of_stream(&self) -> PropertyResult {
        for (terminated, buffered) in self.queue.end_of_stream_reports() {
            if !terminated {
                return PropertyResult::fail(
                    "EndOfStreamOnlyWhenDrained",
                    "End of stream reported by an open queue",
                    None,
                );
            }
            if buffered > 0 {
                return PropertyResult::fail(
                    "EndOfStreamOnlyWhenDrained",
                    format!("End of stream reported with {} items buffered", buffered),
                    None,
                );
            }
        }
        PropertyResult::pass("EndOfStreamOnlyWhenDrained")
    }
}

impl<Q: QueueProperties> PropertyChecker for QueuePropertyChecker<'_, Q> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_items(),
            self.check_no_duplicates(),
            self.check_fifo_order(),
            self.check_bounded_capacity(),
            self.check_end_of_stream(),
        ]
    }
}
