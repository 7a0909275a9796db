// src/exec/mod.rs

//! Node execution layer.
//!
//! - [`executor`] defines the `NodeExecutor` capability every node type
//!   implements.
//! - [`inputs`] assembles a node's inputs from upstream outputs.
//! - [`builtin`] holds the simulated executors of the built-in node types.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `LocalExecutorBackend` the runtime uses in production, which tests can
//!   replace with a fake implementation.

pub mod backend;
pub mod builtin;
pub mod executor;
pub mod inputs;

pub use backend::{ExecutorBackend, LocalExecutorBackend};
pub use builtin::SimulatedExecutor;
pub use executor::{ExecFuture, NodeExecutor, NodeInputs};
pub use inputs::resolve_inputs;
