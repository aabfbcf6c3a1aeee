//! Stack invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every pushed element is in the stack or was popped |
//! | NoDuplicates | No element is in the stack twice, or popped twice |
//! | LIFO_Order | Replaying the history against a model stack matches every pop |

use std::collections::HashSet;

use crate::counterexample::{Counterexample, StateSnapshot, ThreadAction};
use crate::property::{PropertyChecker, PropertyResult};

/// Properties that any stack implementation must satisfy.
///
/// Implementations provide access to their observed state; the checker
/// verifies invariants against it. Elements are expected to be pushed at
/// most once.
pub trait StackProperties {
    /// Set of all elements that have been pushed.
    fn pushed_elements(&self) -> HashSet<u64>;

    /// Every element returned by a successful pop, in pop order.
    fn popped_elements(&self) -> Vec<u64>;

    /// Current contents of the stack (top to bottom).
    fn current_contents(&self) -> Vec<u64>;

    /// Operation history for LIFO order checking.
    /// Returns owned data to avoid lifetime issues with internal locks.
    fn history(&self) -> StackHistory;
}

/// History of stack operations in linearization order.
#[derive(Debug, Clone, Default)]
pub struct StackHistory {
    pub operations: Vec<StackOperation>,
}

/// A single stack operation.
#[derive(Debug, Clone)]
pub struct StackOperation {
    /// Thread that performed the operation
    pub thread_id: u64,
    pub op_type: StackOpType,
    /// Element involved (pushed value, or pop result)
    pub element: Option<u64>,
    /// Step number for ordering
    pub step: u64,
}

/// Type of stack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOpType {
    Push,
    Pop,
    PopEmpty,
}

impl StackHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a push operation.
    pub fn record_push(&mut self, thread_id: u64, element: u64, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(StackOperation {
            thread_id,
            op_type: StackOpType::Push,
            element: Some(element),
            step,
        });
    }

    /// Record a pop operation.
    pub fn record_pop(&mut self, thread_id: u64, element: Option<u64>, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(StackOperation {
            thread_id,
            op_type: if element.is_some() {
                StackOpType::Pop
            } else {
                StackOpType::PopEmpty
            },
            element,
            step,
        });
    }

    fn to_actions(&self) -> Vec<ThreadAction> {
        self.operations
            .iter()
            .map(|op| ThreadAction {
                thread_id: op.thread_id,
                step: op.step,
                action: match (op.op_type, op.element) {
                    (StackOpType::Push, Some(e)) => format!("push({})", e),
                    (StackOpType::Pop, Some(e)) => format!("pop()->{}", e),
                    _ => "pop()->None".to_string(),
                },
                success: true,
            })
            .collect()
    }
}

/// Property checker for stack implementations.
pub struct StackPropertyChecker<'a, T: StackProperties> {
    stack: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: StackProperties> StackPropertyChecker<'a, T> {
    /// Create a new checker for the given stack.
    #[must_use]
    pub fn new(stack: &'a T) -> Self {
        Self {
            stack,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dst_seed = Some(seed);
        self
    }

    fn counterexample(&self) -> Counterexample {
        match self.dst_seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        }
    }

    /// NoLostElements
    ///
    /// Every element that was pushed must either be in the stack
    /// or have been popped.
    fn check_no_lost_elements(&self) -> PropertyResult {
        let pushed = self.stack.pushed_elements();
        let popped: HashSet<u64> = self.stack.popped_elements().into_iter().collect();
        let contents: HashSet<u64> = self.stack.current_contents().into_iter().collect();

        let mut lost: Vec<u64> = pushed
            .iter()
            .filter(|e| !contents.contains(e) && !popped.contains(e))
            .copied()
            .collect();
        if lost.is_empty() {
            return PropertyResult::pass("NoLostElements");
        }
        lost.sort_unstable();

        let mut ce = self.counterexample();
        ce.add_state(StateSnapshot {
            step: 1,
            description: format!("Element {} lost", lost[0]),
            variables: vec![
                ("pushed".to_string(), format!("{:?}", pushed)),
                ("popped".to_string(), format!("{:?}", popped)),
                ("contents".to_string(), format!("{:?}", contents)),
            ],
        });
        PropertyResult::fail(
            "NoLostElements",
            format!(
                "Elements {:?} were pushed but are neither in stack nor popped",
                lost
            ),
            Some(ce),
        )
    }

    /// NoDuplicates
    ///
    /// No element appears twice in the stack, and no element is popped
    /// twice.
    fn check_no_duplicates(&self) -> PropertyResult {
        let mut seen = HashSet::new();
        for element in self.stack.current_contents() {
            if !seen.insert(element) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Element {} appears multiple times in stack", element),
                    None,
                );
            }
        }

        let mut popped = HashSet::new();
        for element in self.stack.popped_elements() {
            if !popped.insert(element) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Element {} was popped more than once", element),
                    None,
                );
            }
            if seen.contains(&element) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Element {} was popped but is still in the stack", element),
                    None,
                );
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    /// LIFO_Order
    ///
    /// Replays the recorded history against a model stack; every pop must
    /// return the model's top, and an empty pop needs an empty model.
    fn check_lifo_order(&self) -> PropertyResult {
        let history = self.stack.history();
        let mut model_stack: Vec<u64> = Vec::new();

        for op in &history.operations {
            let violation = match (op.op_type, op.element) {
                (StackOpType::Push, Some(e)) => {
                    model_stack.push(e);
                    None
                }
                (StackOpType::Pop, Some(expected)) => match model_stack.pop() {
                    Some(actual) if actual == expected => None,
                    Some(actual) => Some(format!(
                        "pop returned {} but model expected {} (step {})",
                        expected, actual, op.step
                    )),
                    None => Some(format!(
                        "pop returned {} but model stack was empty (step {})",
                        expected, op.step
                    )),
                },
                (StackOpType::PopEmpty, _) if !model_stack.is_empty() => Some(format!(
                    "pop returned None but model has {} elements (step {})",
                    model_stack.len(),
                    op.step
                )),
                _ => None,
            };

            if let Some(message) = violation {
                let mut ce = self.counterexample().with_description(message.clone());
                for action in history.to_actions() {
                    ce.add_action(action);
                }
                return PropertyResult::fail("LIFO_Order", message, Some(ce));
            }
        }

        PropertyResult::pass("LIFO_Order")
    }
}

impl<T: StackProperties> PropertyChecker for StackPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_elements(),
            self.check_no_duplicates(),
            self.check_lifo_order(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test implementation of StackProperties
    struct TestStack {
        pushed: HashSet<u64>,
        popped: Vec<u64>,
        contents: Vec<u64>,
        history: StackHistory,
    }

    impl TestStack {
        fn new() -> Self {
            Self {
                pushed: HashSet::new(),
                popped: Vec::new(),
                contents: Vec::new(),
                history: StackHistory::new(),
            }
        }

        fn next_step(&self) -> u64 {
            self.history.operations.len() as u64 + 1
        }

        fn push(&mut self, val: u64) {
            self.pushed.insert(val);
            self.contents.push(val);
            let step = self.next_step();
            self.history.record_push(0, val, step);
        }

        fn pop(&mut self) -> Option<u64> {
            let val = self.contents.pop();
            if let Some(v) = val {
                self.popped.push(v);
            }
            let step = self.next_step();
            self.history.record_pop(0, val, step);
            val
        }
    }

    impl StackProperties for TestStack {
        fn pushed_elements(&self) -> HashSet<u64> {
            self.pushed.clone()
        }

        fn popped_elements(&self) -> Vec<u64> {
            self.popped.clone()
        }

        fn current_contents(&self) -> Vec<u64> {
            self.contents.iter().rev().copied().collect()
        }

        fn history(&self) -> StackHistory {
            self.history.clone()
        }
    }

    #[test]
    fn test_correct_stack_passes() {
        let mut stack = TestStack::new();
        stack.push(1);
        stack.push(2);
        stack.pop();
        stack.push(3);
        stack.pop();
        stack.pop();
        stack.pop();

        let checker = StackPropertyChecker::new(&stack);
        assert!(checker.all_hold(), "{:?}", checker.violations());
    }

    #[test]
    fn test_detects_lost_element() {
        let mut stack = TestStack::new();
        stack.push(1);
        stack.push(2);
        // Drop 1 on the floor
        stack.contents.retain(|&v| v != 1);

        let checker = StackPropertyChecker::new(&stack).with_seed(7);
        let violations = checker.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "NoLostElements");
        let ce = violations[0].counterexample.as_ref().unwrap();
        assert_eq!(ce.dst_seed, Some(7));
    }

    #[test]
    fn test_detects_double_pop() {
        let mut stack = TestStack::new();
        stack.push(5);
        stack.pop();
        stack.popped.push(5);

        let checker = StackPropertyChecker::new(&stack);
        assert!(checker
            .violations()
            .iter()
            .any(|r| r.name == "NoDuplicates"));
    }

    #[test]
    fn test_detects_lifo_violation() {
        let mut stack = TestStack::new();
        stack.push(1);
        stack.push(2);
        stack.history.record_pop(0, Some(1), 3);

        let checker = StackPropertyChecker::new(&stack);
        let violations = checker.violations();
        assert!(violations.iter().any(|r| r.name == "LIFO_Order"));
    }

    #[test]
    fn test_detects_false_empty() {
        let mut stack = TestStack::new();
        stack.push(1);
        stack.history.record_pop(0, None, 2);

        let checker = StackPropertyChecker::new(&stack);
        assert!(checker.violations().iter().any(|r| r.name == "LIFO_Order"));
    }
}
