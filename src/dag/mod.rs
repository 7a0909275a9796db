// src/dag/mod.rs

//! Scheduling.
//!
//! - [`scheduler`] turns a workflow graph into a total execution order and
//!   detects cycles.

pub mod scheduler;

pub use scheduler::order;
