//! Counterexample representation and rendering.
//!
//! When a property violation is detected, a counterexample shows
//! the sequence of operations that led to the failure.

use std::fmt::Write as _;

/// A counterexample showing the failure path.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Sequence of state snapshots
    pub states: Vec<StateSnapshot>,
    /// Thread interleaving that caused the failure
    pub interleaving: Vec<ThreadAction>,
    /// DST seed for reproduction (if applicable)
    pub dst_seed: Option<u64>,
    /// Human-readable description of the failure
    pub description: Option<String>,
}

/// Snapshot of system state at a point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the execution
    pub step: u64,
    /// Description of the state
    pub description: String,
    /// Variable values at this point
    pub variables: Vec<(String, String)>,
}

/// Action taken by a thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    pub thread_id: u64,
    pub step: u64,
    /// e.g. `push(42)`, `remove() -> None`
    pub action: String,
    pub success: bool,
}

impl Counterexample {
    /// Create a new empty counterexample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counterexample with DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a state snapshot.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    /// Add a thread action.
    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Render the counterexample as a human-readable thread diagram.
    ///
    /// Format:
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0 | Thread 1 | State
    /// -----|----------|----------|------
    ///    1 | add(1)   |          | len=1
    ///    2 |          | remove() | len=0
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.dst_seed {
            let _ = writeln!(output, "DST_SEED={}\n", seed);
        }

        if let Some(desc) = &self.description {
            let _ = writeln!(output, "Failure: {}\n", desc);
        }

        for state in &self.states {
            let _ = writeln!(output, "State @ step {}: {}", state.step, state.description);
            for (name, value) in &state.variables {
                let _ = writeln!(output, "  {} = {}", name, value);
            }
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            output.push_str("(no thread actions recorded)\n");
            return output;
        }

        output.push_str("Step |");
        for tid in &threads {
            let _ = write!(output, " Thread {} |", tid);
        }
        output.push_str(" State\n-----|");
        for _ in &threads {
            output.push_str("----------|");
        }
        output.push_str("------\n");

        let max_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);
        for step in 1..=max_step {
            let _ = write!(output, "{:4} |", step);
            for tid in &threads {
                let action = self
                    .interleaving
                    .iter()
                    .find(|a| a.step == step && a.thread_id == *tid);
                match action {
                    Some(a) => {
                        let status = if a.success { "" } else { " [FAIL]" };
                        let _ = write!(output, " {}{} |", a.action, status);
                    }
                    None => output.push_str("          |"),
                }
            }
            if let Some(state) = self.states.iter().find(|s| s.step == step) {
                let _ = write!(output, " {}", state.description);
            }
            output.push('\n');
        }

        output
    }
}
