//! End-to-end producer/consumer pipeline.
//!
//! Producers feed a bounded queue; consumers drain it into a shared
//! lock-free stack until the queue reports end of stream. Every item must
//! arrive exactly once.

#![cfg(not(loom))]

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vp_sync::{BoundedBlockingQueue, CancelToken, LockFreeStack, QueueConfig, QueueError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_queue_into_stack_pipeline() {
    init_tracing();

    const PRODUCERS: u64 = 3;
    const CONSUMERS: usize = 3;
    const ITEMS_PER_PRODUCER: u64 = 400;

    let queue = Arc::new(BoundedBlockingQueue::new(4));
    let sink = Arc::new(LockFreeStack::new());

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                while let Some(item) = queue.remove() {
                    sink.push(item);
                }
            })
        })
        .collect();

    thread::scope(|s| {
        for p in 0..PRODUCERS {
            let queue = &queue;
            s.spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    queue.add(p * ITEMS_PER_PRODUCER + i).unwrap();
                }
            });
        }
    });
    queue.terminate();

    for handle in consumers {
        handle.join().unwrap();
    }

    assert_eq!(sink.size() as u64, PRODUCERS * ITEMS_PER_PRODUCER);
    let mut seen = HashSet::new();
    while let Some(item) = sink.pop() {
        assert!(seen.insert(item), "Item {} delivered twice", item);
    }
    assert_eq!(seen.len() as u64, PRODUCERS * ITEMS_PER_PRODUCER);
}

#[test]
fn test_rendezvous_pipeline() {
    init_tracing();

    let queue = Arc::new(BoundedBlockingQueue::new(0));
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..50 {
                queue.add(i).unwrap();
            }
            queue.terminate();
        })
    };

    let received: Vec<i32> = std::iter::from_fn(|| queue.remove()).collect();
    producer.join().unwrap();
    assert_eq!(received, (0..50).collect::<Vec<_>>());
}

#[test]
fn test_shutdown_with_cancelled_consumers() {
    init_tracing();

    let config = QueueConfig::new(2).with_cancel_poll_interval(Duration::from_millis(2));
    let queue: Arc<BoundedBlockingQueue<u32>> =
        Arc::new(BoundedBlockingQueue::with_config(config));
    let token = CancelToken::new();

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let token = token.clone();
            thread::spawn(move || {
                let mut received = 0;
                loop {
                    match queue.remove_cancellable(&token) {
                        Ok(Some(_)) => received += 1,
                        Ok(None) => return Ok(received),
                        Err(err) => return Err((err, received)),
                    }
                }
            })
        })
        .collect();

    for i in 0..10 {
        queue.add(i).unwrap();
    }
    // Let consumers drain before cancelling; the queue stays open
    while !queue.is_empty() {
        thread::yield_now();
    }
    token.cancel();

    let mut total = 0;
    for handle in consumers {
        match handle.join().unwrap() {
            Err((QueueError::Cancelled, received)) => total += received,
            other => panic!("Unexpected consumer outcome: {:?}", other),
        }
    }
    assert_eq!(total, 10);
}
