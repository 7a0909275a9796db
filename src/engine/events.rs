// src/engine/events.rs

//! Observer notifications.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::stream::LogEvent;
use crate::types::{NodeId, NodeStatus, WorkflowStatus};

/// Something observers should redraw.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackerEvent {
    NodeStatusChanged {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A running node reported progress; its status is unchanged.
    NodeProgress { node_id: NodeId, progress: f64 },
    WorkflowStatusChanged {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
    LogAppended { event: LogEvent },
    ExecutionReset,
}

/// Broadcast bus; every subscriber sees every event.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
