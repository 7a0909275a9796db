// src/graph/model.rs

//! Persisted workflow shape.
//!
//! These types serialise to the camelCase JSON exchanged with the authoring
//! surface and any storage collaborator:
//!
//! ```json
//! {
//!   "id": "wf-1", "name": "Sales", "tableId": "tbl-9",
//!   "nodes": [{ "id": "n1", "type": "data_source", "name": "Load",
//!               "position": { "x": 0.0, "y": 0.0 },
//!               "ports": [{ "id": "data", "name": "Data",
//!                           "direction": "output", "required": false }],
//!               "config": {}, "status": "idle" }],
//!   "edges": [], "status": "draft", "version": 1,
//!   "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{NodeId, NodeStatus, NodeType, PortDirection, WorkflowStatus};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A typed connection point. Identity is `(node id, port id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: String,
    pub name: String,
    pub direction: PortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl Port {
    pub fn input(id: &str, name: &str, required: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            direction: PortDirection::Input,
            data_type: None,
            required,
        }
    }

    pub fn output(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            direction: PortDirection::Output,
            data_type: None,
            required: false,
        }
    }

    pub fn with_data_type(mut self, data_type: &str) -> Self {
        self.data_type = Some(data_type.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Node {
    pub fn port(&self, port_id: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == port_id)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Input)
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
    }

    /// Drop per-run fields and return to `idle`.
    pub(crate) fn clear_execution(&mut self) {
        self.status = NodeStatus::Idle;
        self.error = None;
        self.output = None;
        self.executed_at = None;
        self.duration_ms = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_node_id: NodeId,
    pub source_port_id: String,
    pub target_node_id: NodeId,
    pub target_port_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    /// Foreign reference to an external table; not owned.
    pub table_id: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default = "default_version")]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

fn default_version() -> u64 {
    1
}

impl Workflow {
    /// Empty draft workflow bound to `table_id`.
    pub fn new(name: impl Into<String>, table_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            table_id: table_id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            status: WorkflowStatus::Draft,
            version: 1,
            created_at: now,
            updated_at: now,
            last_run_at: None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Position of a node in creation order.
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// The unique start node, if exactly one exists.
    pub fn start_node(&self) -> Option<&Node> {
        let mut starts = self.nodes.iter().filter(|n| n.node_type.is_start());
        match (starts.next(), starts.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// First node (creation order) of the given type.
    pub fn first_node_of_type(&self, node_type: NodeType) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_type == node_type)
    }

    /// Record a successful edit.
    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
