// src/exec/executor.rs

//! The capability every node type implements.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::graph::Node;

/// Resolved inputs for one node, keyed by the consuming port id.
pub type NodeInputs = BTreeMap<String, Value>;

/// Future returned by [`NodeExecutor::execute`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>>;

/// Produces a node's output from its resolved inputs.
///
/// The scheduler and tracker only ever see this signature; which concrete
/// executor runs is decided by the node type registry. An `Err` becomes an
/// `ExecutorFailure` for the node; it never aborts the run.
pub trait NodeExecutor: Send + Sync {
    fn execute<'a>(&'a self, node: &'a Node, inputs: NodeInputs) -> ExecFuture<'a>;
}
