//! Declarative, chainable, asynchronous property validation.
//!
//! # Responsibility
//! - Let each entity type declare per-property rule chains once.
//! - Evaluate every chain of a candidate concurrently and aggregate failures.
//!
//! # Invariants
//! - Rule sets are immutable after registration and shared by `Arc`.
//! - Each chain stops at its first failing rule; other chains still run.
//! - Evaluation never writes; store lookups are reads only.

pub mod chain;
pub mod registry;
pub mod rule;
pub mod value;

pub use chain::{PropertyChain, PropertyRules, RuleSet};
pub use registry::RuleRegistry;
pub use rule::Rule;
pub use value::{KeyOf, Presence};
