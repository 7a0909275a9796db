// src/stream/reconciler.rs

//! Maps a remote job's event stream onto tracker transitions.
//!
//! The remote job reports free text, not node ids. The reconciler keeps a
//! "current node" and moves it forward whenever a log message names an
//! operation the [`NodeCorrelation`] strategy recognises. The previous
//! current node is assumed finished at that point. This is best-effort: a
//! step the job never mentions stays under-reported until `complete`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::ExecutionTracker;
use crate::errors::{StreamError, TransitionError};
use crate::stream::correlate::NodeCorrelation;
use crate::stream::event::{LogEvent, LogEventKind};
use crate::types::{NodeId, NodeType};

const DEFAULT_STREAM_ERROR: &str = "remote job reported an error";

/// What the caller should do after an event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Keep reading the stream.
    Continue,
    /// The run ended `completed`.
    Completed,
    /// The run ended `failed`.
    Failed,
}

impl Reconciled {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Reconciled::Continue)
    }
}

#[derive(Debug, Clone)]
pub struct StreamReconciler {
    correlation: Arc<dyn NodeCorrelation>,
    current_node_id: Option<NodeId>,
}

impl StreamReconciler {
    pub fn new(correlation: Arc<dyn NodeCorrelation>) -> Self {
        Self {
            correlation,
            current_node_id: None,
        }
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    /// Put the workflow's start node into `running` and make it current.
    ///
    /// The tracker must already be executing.
    pub fn seed(&mut self, tracker: &mut ExecutionTracker) -> Result<(), TransitionError> {
        let Some(start) = tracker.workflow().start_node().map(|n| n.id.clone()) else {
            warn!("workflow has no unique start node; reconciler starts without a current node");
            return Ok(());
        };

        tracker.ensure_running(&start)?;
        self.current_node_id = Some(start);
        Ok(())
    }

    /// Apply one stream event. The event is always appended to the run log
    /// first, whatever its effect on node state.
    pub fn apply(
        &mut self,
        tracker: &mut ExecutionTracker,
        event: LogEvent,
    ) -> Result<Reconciled, TransitionError> {
        tracker.append_log(event.clone());

        match event.kind {
            LogEventKind::Log => {
                if let Some(message) = event.message.as_deref() {
                    if let Some(node_type) = self.correlation.correlate(message) {
                        self.advance_to(tracker, node_type)?;
                    }
                }
                Ok(Reconciled::Continue)
            }
            LogEventKind::Progress => {
                match (self.current_node_id.as_deref(), event.progress_value()) {
                    (Some(current), Some(progress)) => {
                        tracker.report_progress(current, progress);
                    }
                    (Some(_), None) => {
                        debug!("progress event without a numeric value; logged only");
                    }
                    (None, _) => {}
                }
                Ok(Reconciled::Continue)
            }
            LogEventKind::Complete => {
                self.finish_success(tracker, event.data)?;
                Ok(Reconciled::Completed)
            }
            LogEventKind::Error => {
                let message = event
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_STREAM_ERROR.to_string());
                self.finish_error(tracker, &message)?;
                Ok(Reconciled::Failed)
            }
            LogEventKind::Status | LogEventKind::Unknown => Ok(Reconciled::Continue),
        }
    }

    /// The stream ended or broke without a terminal event.
    pub fn disconnect(
        &mut self,
        tracker: &mut ExecutionTracker,
        reason: &StreamError,
    ) -> Result<Reconciled, TransitionError> {
        warn!(error = %reason, current = ?self.current_node_id, "remote stream ended without a terminal event");
        tracker.append_log(LogEvent::error(reason.to_string()));
        self.finish_error(tracker, &reason.to_string())?;
        Ok(Reconciled::Failed)
    }

    fn advance_to(
        &mut self,
        tracker: &mut ExecutionTracker,
        node_type: NodeType,
    ) -> Result<(), TransitionError> {
        // Prefer the current node if it already has this type.
        if let Some(current) = self.current_node_id.as_deref() {
            if tracker
                .workflow()
                .node(current)
                .is_some_and(|n| n.node_type == node_type && !n.status.is_terminal())
            {
                return Ok(());
            }
        }

        let Some(target) = tracker
            .workflow()
            .nodes
            .iter()
            .find(|n| n.node_type == node_type && !n.status.is_terminal())
            .map(|n| n.id.clone())
        else {
            debug!(%node_type, "no unfinished node of matched type; logged only");
            return Ok(());
        };

        if let Some(previous) = self.current_node_id.take() {
            if previous != target {
                tracker.settle_success(&previous, None)?;
            }
        }

        tracker.ensure_running(&target)?;
        debug!(node = %target, %node_type, "reconciler advanced current node");
        self.current_node_id = Some(target);
        Ok(())
    }

    fn finish_success(
        &mut self,
        tracker: &mut ExecutionTracker,
        result: Option<serde_json::Value>,
    ) -> Result<(), TransitionError> {
        let ids: Vec<NodeId> = tracker.workflow().nodes.iter().map(|n| n.id.clone()).collect();
        for id in ids {
            tracker.settle_success(&id, None)?;
        }

        tracker.set_final_result(result);
        self.current_node_id = None;
        tracker.complete_execution(true)?;
        info!("remote job completed");
        Ok(())
    }

    fn finish_error(
        &mut self,
        tracker: &mut ExecutionTracker,
        message: &str,
    ) -> Result<(), TransitionError> {
        if let Some(current) = self.current_node_id.take() {
            tracker.settle_error(&current, message)?;
        }
        tracker.complete_execution(false)?;
        info!(error = %message, "remote job failed");
        Ok(())
    }
}
