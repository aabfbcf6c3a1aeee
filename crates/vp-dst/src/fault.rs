//! Fault injection decisions.

use crate::random::DeterministicRng;

/// How often faults fire.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Probability that any single fault point fires
    pub failure_probability: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.05,
        }
    }
}

impl FaultConfig {
    /// Never inject faults.
    #[must_use]
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
        }
    }

    /// Inject faults frequently, for stress runs.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.25,
        }
    }
}

/// Counters for injected faults.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
}

/// Decides, deterministically, whether a fault point fires.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    #[must_use]
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.failure_probability),
            "Failure probability must be in [0, 1]"
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    /// Should the current fault point fire?
    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        let fail = self.config.failure_probability > 0.0
            && self.rng.gen_bool(self.config.failure_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}
