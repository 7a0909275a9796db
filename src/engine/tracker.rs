// src/engine/tracker.rs

//! Per-node and per-workflow state machine.
//!
//! The tracker owns the workflow, the current [`ExecutionContext`] and the
//! run's log. It is synchronous and performs no IO; every accepted transition
//! is published on the [`EventBus`] before the call returns. A rejected
//! transition returns a [`TransitionError`] and leaves all state untouched.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::context::{ExecutionContext, ExecutionErrorRecord};
use crate::engine::events::{EventBus, TrackerEvent};
use crate::errors::TransitionError;
use crate::graph::Workflow;
use crate::stream::LogEvent;
use crate::types::{NodeId, NodeStatus, NodeType, WorkflowStatus};

const FALLBACK_ERROR: &str = "node failed without an error message";

#[derive(Debug)]
pub struct ExecutionTracker {
    workflow: Workflow,
    context: Option<ExecutionContext>,
    log: Vec<LogEvent>,
    final_result: Option<Value>,
    progress: HashMap<NodeId, f64>,
    started: HashMap<NodeId, Instant>,
    bus: EventBus,
}

impl ExecutionTracker {
    pub fn new(workflow: Workflow, bus: EventBus) -> Self {
        Self {
            workflow,
            context: None,
            log: Vec::new(),
            final_result: None,
            progress: HashMap::new(),
            started: HashMap::new(),
            bus,
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub(crate) fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    pub fn status(&self) -> WorkflowStatus {
        self.workflow.status
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.workflow.node(node_id).map(|n| n.status)
    }

    /// Context of the current or most recent run.
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    pub fn log(&self) -> &[LogEvent] {
        &self.log
    }

    pub fn final_result(&self) -> Option<&Value> {
        self.final_result.as_ref()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn any_node_errored(&self) -> bool {
        self.workflow
            .nodes
            .iter()
            .any(|n| n.status == NodeStatus::Error)
    }

    // ---------------------------------------------------------------------
    // Workflow-level transitions
    // ---------------------------------------------------------------------

    fn set_workflow_status(&mut self, to: WorkflowStatus) -> Result<(), TransitionError> {
        let from = self.workflow.status;
        if !from.can_transition_to(to) {
            return Err(TransitionError::Workflow { from, to });
        }
        if from == to {
            return Ok(());
        }

        self.workflow.status = to;
        info!(workflow = %self.workflow.id, %from, %to, "workflow status changed");
        self.bus
            .publish(TrackerEvent::WorkflowStatusChanged { from, to });
        Ok(())
    }

    /// `draft -> ready`. Already-ready workflows are left as is.
    pub fn mark_ready(&mut self) -> Result<(), TransitionError> {
        if self.workflow.status == WorkflowStatus::Ready {
            return Ok(());
        }
        self.set_workflow_status(WorkflowStatus::Ready)
    }

    /// `ready -> running`: create a fresh context and schedule every node.
    pub fn start_execution(&mut self) -> Result<(), TransitionError> {
        if let Some(node) = self.workflow.nodes.iter().find(|n| n.status != NodeStatus::Idle) {
            return Err(TransitionError::Node {
                node_id: node.id.clone(),
                from: node.status,
                to: NodeStatus::Pending,
            });
        }
        self.set_workflow_status(WorkflowStatus::Running)?;

        self.context = Some(ExecutionContext::new(self.workflow.id.clone()));
        self.workflow.last_run_at = Some(Utc::now());
        self.log.clear();
        self.final_result = None;
        self.progress.clear();
        self.started.clear();

        let ids: Vec<NodeId> = self.workflow.nodes.iter().map(|n| n.id.clone()).collect();
        for id in ids {
            self.apply_node(&id, NodeStatus::Pending, None)?;
        }
        Ok(())
    }

    /// End the run: `running -> completed` if `success`, else `failed`.
    ///
    /// Nodes still `running` or `pending` are forced to `skipped`. The
    /// context is kept for read-only inspection.
    pub fn complete_execution(&mut self, success: bool) -> Result<(), TransitionError> {
        let to = if success {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        if !self.workflow.status.can_transition_to(to) {
            return Err(TransitionError::Workflow {
                from: self.workflow.status,
                to,
            });
        }

        self.skip_unfinished()?;
        if let Some(ctx) = self.context.as_mut() {
            ctx.current_node_id = None;
        }
        self.set_workflow_status(to)
    }

    /// Abort the run.
    ///
    /// `running` and `pending` nodes become `skipped`; finished nodes are
    /// left alone. The workflow ends `failed` if any node errored, otherwise
    /// it returns to `draft`. Returns the resulting status.
    pub fn stop_execution(&mut self) -> Result<WorkflowStatus, TransitionError> {
        if self.workflow.status != WorkflowStatus::Running {
            return Err(TransitionError::NoActiveExecution);
        }

        self.skip_unfinished()?;
        if let Some(ctx) = self.context.as_mut() {
            ctx.current_node_id = None;
        }

        let to = if self.any_node_errored() {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Draft
        };
        self.set_workflow_status(to)?;
        Ok(to)
    }

    /// Return every node to `idle`, drop the context and log, and go back to
    /// `draft`. Always succeeds.
    pub fn reset_execution(&mut self) {
        for node in self.workflow.nodes.iter_mut() {
            node.clear_execution();
        }
        self.context = None;
        self.log.clear();
        self.final_result = None;
        self.progress.clear();
        self.started.clear();

        let from = self.workflow.status;
        self.workflow.status = WorkflowStatus::Draft;

        debug!(workflow = %self.workflow.id, "execution reset");
        self.bus.publish(TrackerEvent::ExecutionReset);
        if from != WorkflowStatus::Draft {
            self.bus.publish(TrackerEvent::WorkflowStatusChanged {
                from,
                to: WorkflowStatus::Draft,
            });
        }
    }

    fn skip_unfinished(&mut self) -> Result<(), TransitionError> {
        let unfinished: Vec<NodeId> = self
            .workflow
            .nodes
            .iter()
            .filter(|n| matches!(n.status, NodeStatus::Running | NodeStatus::Pending))
            .map(|n| n.id.clone())
            .collect();

        for id in unfinished {
            self.skip_node(&id)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Node-level transitions
    // ---------------------------------------------------------------------

    /// Validate and apply one node transition, then notify observers.
    fn apply_node(
        &mut self,
        node_id: &str,
        to: NodeStatus,
        error: Option<String>,
    ) -> Result<NodeStatus, TransitionError> {
        if self.context.is_none() || self.workflow.status != WorkflowStatus::Running {
            return Err(TransitionError::NoActiveExecution);
        }

        let node = self
            .workflow
            .node_mut(node_id)
            .ok_or_else(|| TransitionError::UnknownNode(node_id.to_string()))?;

        let from = node.status;
        if !from.can_transition_to(to) {
            return Err(TransitionError::Node {
                node_id: node_id.to_string(),
                from,
                to,
            });
        }

        node.status = to;
        if error.is_some() {
            node.error = error.clone();
        }

        debug!(node = %node_id, %from, %to, "node status changed");
        self.bus.publish(TrackerEvent::NodeStatusChanged {
            node_id: node_id.to_string(),
            from,
            to,
            error,
        });
        Ok(from)
    }

    /// `pending -> running`; the node becomes the context's current node.
    pub fn begin_node(&mut self, node_id: &str) -> Result<(), TransitionError> {
        self.apply_node(node_id, NodeStatus::Running, None)?;
        self.started.insert(node_id.to_string(), Instant::now());
        if let Some(ctx) = self.context.as_mut() {
            ctx.current_node_id = Some(node_id.to_string());
        }
        Ok(())
    }

    /// `running -> success`, recording the output (if any) in the context.
    pub fn succeed_node(&mut self, node_id: &str, output: Option<Value>) -> Result<(), TransitionError> {
        self.apply_node(node_id, NodeStatus::Success, None)?;
        self.record_finish(node_id);

        if let Some(output) = output {
            if let Some(node) = self.workflow.node_mut(node_id) {
                node.output = Some(output.clone());
            }
            if let Some(ctx) = self.context.as_mut() {
                ctx.node_outputs.insert(node_id.to_string(), output);
            }
        }
        Ok(())
    }

    /// `running -> error`. An empty message is replaced so every errored
    /// node carries one.
    pub fn fail_node(&mut self, node_id: &str, message: impl Into<String>) -> Result<(), TransitionError> {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = FALLBACK_ERROR.to_string();
        }

        self.apply_node(node_id, NodeStatus::Error, Some(message.clone()))?;
        self.record_finish(node_id);

        warn!(node = %node_id, error = %message, "node failed");
        if let Some(ctx) = self.context.as_mut() {
            ctx.errors.push(ExecutionErrorRecord {
                node_id: node_id.to_string(),
                error: message,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// `idle | pending | running -> skipped`.
    pub fn skip_node(&mut self, node_id: &str) -> Result<(), TransitionError> {
        self.apply_node(node_id, NodeStatus::Skipped, None)?;
        self.started.remove(node_id);
        Ok(())
    }

    /// Move a node to `running` through legal steps. No-op if it already is.
    pub fn ensure_running(&mut self, node_id: &str) -> Result<(), TransitionError> {
        let status = self
            .node_status(node_id)
            .ok_or_else(|| TransitionError::UnknownNode(node_id.to_string()))?;

        match status {
            NodeStatus::Running => Ok(()),
            NodeStatus::Idle => {
                self.apply_node(node_id, NodeStatus::Pending, None)?;
                self.begin_node(node_id)
            }
            NodeStatus::Pending => self.begin_node(node_id),
            terminal => Err(TransitionError::Node {
                node_id: node_id.to_string(),
                from: terminal,
                to: NodeStatus::Running,
            }),
        }
    }

    /// Walk a node to `success` through legal steps.
    ///
    /// Returns `false` without changing anything if the node had already
    /// finished.
    pub fn settle_success(&mut self, node_id: &str, output: Option<Value>) -> Result<bool, TransitionError> {
        if self.is_finished(node_id)? {
            return Ok(false);
        }
        self.ensure_running(node_id)?;
        self.succeed_node(node_id, output)?;
        Ok(true)
    }

    /// Walk a node to `error` through legal steps.
    ///
    /// Returns `false` without changing anything if the node had already
    /// finished.
    pub fn settle_error(&mut self, node_id: &str, message: impl Into<String>) -> Result<bool, TransitionError> {
        if self.is_finished(node_id)? {
            return Ok(false);
        }
        self.ensure_running(node_id)?;
        self.fail_node(node_id, message)?;
        Ok(true)
    }

    fn is_finished(&self, node_id: &str) -> Result<bool, TransitionError> {
        self.node_status(node_id)
            .map(NodeStatus::is_terminal)
            .ok_or_else(|| TransitionError::UnknownNode(node_id.to_string()))
    }

    fn record_finish(&mut self, node_id: &str) {
        let duration = self.started.remove(node_id).map(|t| t.elapsed());
        if let Some(node) = self.workflow.node_mut(node_id) {
            node.executed_at = Some(Utc::now());
            node.duration_ms = duration.map(|d| d.as_millis() as u64);
        }
    }

    /// Re-announce a running node with a progress value.
    ///
    /// Returns `false` (and changes nothing) if the node is not running.
    pub fn report_progress(&mut self, node_id: &str, progress: f64) -> bool {
        if self.node_status(node_id) != Some(NodeStatus::Running) {
            debug!(node = %node_id, progress, "progress for node that is not running; ignoring");
            return false;
        }

        self.progress.insert(node_id.to_string(), progress);
        self.bus.publish(TrackerEvent::NodeProgress {
            node_id: node_id.to_string(),
            progress,
        });
        true
    }

    // ---------------------------------------------------------------------
    // Log and result
    // ---------------------------------------------------------------------

    pub fn append_log(&mut self, event: LogEvent) {
        self.log.push(event.clone());
        self.bus.publish(TrackerEvent::LogAppended { event });
    }

    pub fn set_final_result(&mut self, result: Option<Value>) {
        self.final_result = result;
    }

    // ---------------------------------------------------------------------
    // Read model
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let nodes = self
            .workflow
            .nodes
            .iter()
            .map(|n| NodeSnapshot {
                id: n.id.clone(),
                name: n.name.clone(),
                node_type: n.node_type,
                status: n.status,
                error: n.error.clone(),
                progress: self.progress.get(&n.id).copied(),
                duration_ms: n.duration_ms,
            })
            .collect();

        WorkflowSnapshot {
            workflow_id: self.workflow.id.clone(),
            version: self.workflow.version,
            status: self.workflow.status,
            current_node_id: self.context.as_ref().and_then(|c| c.current_node_id.clone()),
            nodes,
            errors: self
                .context
                .as_ref()
                .map(|c| c.errors.clone())
                .unwrap_or_default(),
            log_len: self.log.len(),
            final_result: self.final_result.clone(),
        }
    }
}

/// Serialisable view of one node for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Serialisable view of the whole store for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub version: u64,
    pub status: WorkflowStatus,
    pub current_node_id: Option<NodeId>,
    pub nodes: Vec<NodeSnapshot>,
    pub errors: Vec<ExecutionErrorRecord>,
    pub log_len: usize,
    pub final_result: Option<Value>,
}

impl WorkflowSnapshot {
    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.iter().find(|n| n.id == node_id).map(|n| n.status)
    }

    /// Status of the first node with the given name.
    pub fn status_by_name(&self, name: &str) -> Option<NodeStatus> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.status)
    }
}
