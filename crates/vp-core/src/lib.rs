//! # vp-core
//!
//! Core types and invariants for verified concurrent primitives.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for each primitive (`StackProperties`, `QueueProperties`)
//!
//! Implementations (or the harnesses driving them) expose what was put in,
//! what came out and what is still inside; the checkers decide whether the
//! invariants hold.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, StateSnapshot, ThreadAction};
pub use property::{PropertyChecker, PropertyResult};
