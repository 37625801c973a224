//! Trait abstractions for substitutable collaborators
//!
//! Components depend on these interfaces rather than concrete implementations
//! so tests can swap in deterministic versions.

pub mod time;

pub use time::*;
