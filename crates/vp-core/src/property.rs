//! Property results and the checker trait.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking one invariant.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Invariant name (e.g. `NoLostElements`)
    pub name: &'static str,
    /// Whether the invariant held
    pub holds: bool,
    /// Why it failed
    pub message: Option<String>,
    /// Failure path, when one could be reconstructed
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A property that held.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            message: None,
            counterexample: None,
        }
    }

    /// A property that was violated.
    #[must_use]
    pub fn fail(
        name: &'static str,
        message: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        let message = message.into();
        debug_assert!(!message.is_empty(), "Failure message must not be empty");
        Self {
            name,
            holds: false,
            message: Some(message),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.holds {
            return write!(f, "[PASS] {}", self.name);
        }
        write!(f, "[FAIL] {}", self.name)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        if let Some(ce) = &self.counterexample {
            write!(f, "\n{}", ce.render_diagram())?;
        }
        Ok(())
    }
}

/// Checks every invariant of one structure.
pub trait PropertyChecker {
    /// Run all checks.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True if every invariant holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the violated invariants.
    fn violations(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }
}
