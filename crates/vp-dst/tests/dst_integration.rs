//! DST integration tests.
//!
//! Runs the real `vp-sync` structures through the DST runners with fault
//! injection and verifies the `vp-core` invariants, then hands them to the
//! multi-threaded stress harness.
//!
//! `DST_SEED` fixes the base seed; `DST_ITERATIONS` sets how many derived
//! seeds each test walks through.

#![cfg(not(loom))]

use vp_core::PropertyChecker;
use vp_core::invariants::stack::StackPropertyChecker;
use vp_dst::{
    generate_queue_ops, generate_stack_ops, get_or_generate_seed, iterations, run_dst_scenario,
    run_queue_scenario, stress_queue, stress_stack, DeterministicRng, DstRunner, FaultConfig,
    QueueDstOp, QueueDstRunner, QueueOutcome, StressConfig,
};
use vp_sync::{BoundedBlockingQueue, LockFreeStack};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_stack_dst_many_seeds() {
    init_tracing();
    let base = get_or_generate_seed();

    for i in 0..iterations() {
        let seed = base.wrapping_add(i);
        let ops = generate_stack_ops(&mut DeterministicRng::new(seed), 200);
        let result = run_dst_scenario::<LockFreeStack<u64>>(seed, ops);
        assert!(result.passed, "DST failed: {}", result.format());
    }
}

#[test]
fn test_queue_dst_many_seeds() {
    init_tracing();
    let base = get_or_generate_seed();

    for i in 0..iterations() {
        let seed = base.wrapping_add(i);
        let mut rng = DeterministicRng::new(seed);
        let capacity = rng.gen_range(1..6_usize);
        let ops = generate_queue_ops(&mut rng, 200);
        let result = run_queue_scenario::<BoundedBlockingQueue<u64>>(seed, capacity, ops);
        assert!(result.passed, "DST failed: {}", result.format());
    }
}

#[test]
fn test_stack_runner_aggressive_faults() {
    init_tracing();
    let seed = get_or_generate_seed();
    let mut runner: DstRunner<LockFreeStack<u64>> =
        DstRunner::with_fault_config(seed, FaultConfig::aggressive());

    for value in 1..=300 {
        // Crashes and allocation failures are expected here
        let _ = runner.push(value);
        if runner.rng().gen_bool(0.4) {
            let _ = runner.pop();
        }
    }

    let checker = StackPropertyChecker::new(&runner).with_seed(seed);
    assert!(checker.all_hold(), "Violations: {:?}", checker.violations());
    assert!(runner.stats().faults_injected > 0, "{}", runner.stats().format());
}

#[test]
fn test_queue_runner_drains_after_terminate() {
    init_tracing();
    let seed = get_or_generate_seed();
    let mut runner: QueueDstRunner<BoundedBlockingQueue<u64>> =
        QueueDstRunner::with_fault_config(seed, 4, FaultConfig::none());

    for value in 1..=4 {
        assert_eq!(runner.apply(QueueDstOp::Add(value)), Ok(QueueOutcome::Added));
    }
    runner.apply(QueueDstOp::Terminate).unwrap();
    for value in 1..=4 {
        assert_eq!(runner.apply(QueueDstOp::Remove), Ok(QueueOutcome::Removed(value)));
    }
    assert_eq!(runner.apply(QueueDstOp::Remove), Ok(QueueOutcome::EndOfStream));

    let violations: Vec<_> = runner.check().into_iter().filter(|r| !r.holds).collect();
    assert!(violations.is_empty(), "Violations: {:?}", violations);
}

#[test]
fn test_stress_stack_default() {
    init_tracing();
    let result = stress_stack(get_or_generate_seed(), &StressConfig::default());
    assert!(result.passed, "{}", result.format());
}

#[test]
fn test_stress_queue_capacities() {
    init_tracing();
    let seed = get_or_generate_seed();

    for capacity in [0, 1, 2, 16] {
        let config = StressConfig {
            capacity,
            ..StressConfig::default()
        };
        let result = stress_queue(seed, &config);
        assert!(result.passed, "capacity {}: {}", capacity, result.format());
        assert_eq!(result.items_consumed, result.items_produced);
    }
}

#[test]
#[ignore = "long-running; run with --ignored"]
fn test_stress_heavy() {
    init_tracing();
    let seed = get_or_generate_seed();
    let config = StressConfig::stress();

    let result = stress_stack(seed, &config);
    assert!(result.passed, "{}", result.format());
    let result = stress_queue(seed, &config);
    assert!(result.passed, "{}", result.format());
}
