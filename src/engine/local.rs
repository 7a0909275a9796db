// src/engine/local.rs

//! Sequential local execution of a workflow.
//!
//! The plan walks the scheduler's order one node at a time. At most one node
//! is in flight; the next node is only considered once the previous one has
//! reported back, so every node's output is recorded before any dependent
//! node is dequeued.

use tracing::{debug, info, warn};

use crate::engine::step::{CoreCommand, ScheduledNode};
use crate::engine::tracker::ExecutionTracker;
use crate::engine::{NodeOutcome, RunId};
use crate::errors::TransitionError;
use crate::exec::resolve_inputs;
use crate::graph::Adjacency;
use crate::types::{NodeId, NodeStatus};

#[derive(Debug, Clone)]
pub struct LocalPlan {
    run_id: RunId,
    order: Vec<NodeId>,
    cursor: usize,
    in_flight: Option<NodeId>,
    adjacency: Adjacency,
}

/// Where the plan stands after advancing.
#[derive(Debug, Clone)]
pub enum Advance {
    /// Run this node next.
    Dispatch(CoreCommand),
    /// A node is still in flight.
    Waiting,
    /// Every node has been handled; the workflow reached a terminal status.
    Finished,
}

impl LocalPlan {
    pub fn new(run_id: RunId, order: Vec<NodeId>, adjacency: Adjacency) -> Self {
        Self {
            run_id,
            order,
            cursor: 0,
            in_flight: None,
            adjacency,
        }
    }

    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Move to the next runnable node.
    ///
    /// Nodes whose predecessors all failed or were skipped are skipped here;
    /// nodes whose required inputs cannot be resolved fail here without ever
    /// reaching an executor.
    pub fn advance(&mut self, tracker: &mut ExecutionTracker) -> Result<Advance, TransitionError> {
        if self.in_flight.is_some() {
            return Ok(Advance::Waiting);
        }

        while let Some(node_id) = self.order.get(self.cursor).cloned() {
            self.cursor += 1;

            if tracker.node_status(&node_id) != Some(NodeStatus::Pending) {
                continue;
            }

            if self.upstream_dead(tracker, &node_id) {
                debug!(node = %node_id, "all predecessors failed or skipped; skipping");
                tracker.skip_node(&node_id)?;
                continue;
            }

            tracker.begin_node(&node_id)?;

            let outputs = tracker
                .context()
                .map(|c| c.node_outputs.clone())
                .unwrap_or_default();
            let inputs = match resolve_inputs(tracker.workflow(), &node_id, &outputs) {
                Ok(inputs) => inputs,
                Err(failure) => {
                    warn!(node = %node_id, error = %failure, "cannot resolve node inputs");
                    tracker.fail_node(&node_id, failure.to_string())?;
                    continue;
                }
            };

            let Some(node) = tracker.workflow().node(&node_id).cloned() else {
                return Err(TransitionError::UnknownNode(node_id));
            };

            self.in_flight = Some(node_id);
            return Ok(Advance::Dispatch(CoreCommand::DispatchNode(ScheduledNode {
                run_id: self.run_id,
                node,
                inputs,
            })));
        }

        let success = !tracker.any_node_errored();
        tracker.complete_execution(success)?;
        info!(run_id = self.run_id, success, "local run finished");
        Ok(Advance::Finished)
    }

    /// Record the in-flight node's outcome.
    ///
    /// Returns `false` if `node_id` is not the node this plan is waiting on.
    pub fn finish(
        &mut self,
        tracker: &mut ExecutionTracker,
        node_id: &str,
        outcome: NodeOutcome,
    ) -> Result<bool, TransitionError> {
        if self.in_flight.as_deref() != Some(node_id) {
            warn!(node = %node_id, expected = ?self.in_flight, "completion for a node that is not in flight; ignoring");
            return Ok(false);
        }
        self.in_flight = None;

        match outcome {
            NodeOutcome::Success(output) => tracker.succeed_node(node_id, Some(output))?,
            NodeOutcome::Failed(message) => tracker.fail_node(node_id, message)?,
        }
        Ok(true)
    }

    fn upstream_dead(&self, tracker: &ExecutionTracker, node_id: &str) -> bool {
        let preds = self.adjacency.predecessors_of(node_id);
        !preds.is_empty()
            && preds.iter().all(|p| {
                tracker
                    .node_status(p)
                    .is_some_and(NodeStatus::is_failed_or_skipped)
            })
    }
}
