// src/engine/context.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::NodeId;

/// A node-level failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorRecord {
    pub node_id: NodeId,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Transient per-run state. Never persisted with the workflow.
///
/// `node_outputs` only ever holds entries for nodes that reached `success`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    pub current_node_id: Option<NodeId>,
    pub node_outputs: HashMap<NodeId, Value>,
    pub errors: Vec<ExecutionErrorRecord>,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            started_at: Utc::now(),
            current_node_id: None,
            node_outputs: HashMap::new(),
            errors: Vec::new(),
        }
    }
}
