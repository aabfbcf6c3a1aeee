//! Model-based property tests.
//!
//! Random single-threaded operation sequences are applied to the real
//! structures and to a sequential model (`Vec` for the stack, `VecDeque`
//! for the queue); every observable result must match.

#![cfg(not(loom))]

use std::collections::VecDeque;

use proptest::prelude::*;
use vp_sync::{BoundedBlockingQueue, LockFreeStack, QueueError};

#[derive(Debug, Clone)]
enum StackOp {
    Push(u32),
    Pop,
    Peek,
}

fn stack_op() -> impl Strategy<Value = StackOp> {
    prop_oneof![
        3 => any::<u32>().prop_map(StackOp::Push),
        2 => Just(StackOp::Pop),
        1 => Just(StackOp::Peek),
    ]
}

#[derive(Debug, Clone)]
enum QueueOp {
    TryAdd(u32),
    TryRemove,
    Terminate,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        4 => any::<u32>().prop_map(QueueOp::TryAdd),
        3 => Just(QueueOp::TryRemove),
        1 => Just(QueueOp::Terminate),
    ]
}

proptest! {
    #[test]
    fn stack_matches_vec_model(ops in prop::collection::vec(stack_op(), 0..200)) {
        let stack = LockFreeStack::new();
        let mut model: Vec<u32> = Vec::new();

        for op in ops {
            match op {
                StackOp::Push(v) => {
                    stack.push(v);
                    model.push(v);
                }
                StackOp::Pop => prop_assert_eq!(stack.pop(), model.pop()),
                StackOp::Peek => prop_assert_eq!(stack.peek(), model.last().copied()),
            }
            prop_assert_eq!(stack.size(), model.len());
            prop_assert_eq!(stack.is_empty(), model.is_empty());
        }

        let mut expected = model.clone();
        expected.reverse();
        prop_assert_eq!(stack.snapshot(), expected);
    }

    #[test]
    fn queue_matches_deque_model(
        capacity in 1_usize..8,
        ops in prop::collection::vec(queue_op(), 0..200),
    ) {
        let queue = BoundedBlockingQueue::new(capacity);
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut terminated = false;

        for op in ops {
            match op {
                QueueOp::TryAdd(v) => {
                    let expected = if terminated {
                        Err(QueueError::Closed)
                    } else if model.len() == capacity {
                        Err(QueueError::Full)
                    } else {
                        model.push_back(v);
                        Ok(())
                    };
                    prop_assert_eq!(queue.try_add(v), expected);
                }
                QueueOp::TryRemove => {
                    let expected = match model.pop_front() {
                        Some(v) => Ok(Some(v)),
                        None if terminated => Ok(None),
                        None => Err(QueueError::Empty),
                    };
                    prop_assert_eq!(queue.try_remove(), expected);
                }
                QueueOp::Terminate => {
                    queue.terminate();
                    terminated = true;
                }
            }
            prop_assert!(queue.len() <= capacity);
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.is_terminated(), terminated);
        }

        // Blocking removes drain the remainder in order once terminated
        queue.terminate();
        for expected in model {
            prop_assert_eq!(queue.remove(), Some(expected));
        }
        prop_assert_eq!(queue.remove(), None);
    }
}
