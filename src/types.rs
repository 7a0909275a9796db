// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical node id type used throughout the engine.
pub type NodeId = String;

/// Kind of analysis step a node performs.
///
/// `DataSource` is the unique start type: a runnable workflow holds exactly
/// one node of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    DataSource,
    Transform,
    AiAnalysis,
    ChartGenerator,
    InsightExtractor,
    Output,
    Custom,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::DataSource,
        NodeType::Transform,
        NodeType::AiAnalysis,
        NodeType::ChartGenerator,
        NodeType::InsightExtractor,
        NodeType::Output,
        NodeType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::DataSource => "data_source",
            NodeType::Transform => "transform",
            NodeType::AiAnalysis => "ai_analysis",
            NodeType::ChartGenerator => "chart_generator",
            NodeType::InsightExtractor => "insight_extractor",
            NodeType::Output => "output",
            NodeType::Custom => "custom",
        }
    }

    /// Whether this is the designated start type.
    pub fn is_start(&self) -> bool {
        matches!(self, NodeType::DataSource)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown node type: {s}"))
    }
}

/// Direction of a port relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Per-node execution status.
///
/// Legal transitions:
///
/// ```text
/// idle    -> pending -> running -> success | error
/// idle    -> skipped
/// pending -> skipped
/// running -> skipped   (only when the run is aborted)
/// *       -> idle      (only through a reset)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

impl NodeStatus {
    /// Whether `self -> to` is an edge of the node state machine.
    ///
    /// Resets are handled separately and never go through this check.
    pub fn can_transition_to(self, to: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, to),
            (Idle, Pending)
                | (Pending, Running)
                | (Running, Success)
                | (Running, Error)
                | (Idle, Skipped)
                | (Pending, Skipped)
                | (Running, Skipped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Error | NodeStatus::Skipped)
    }

    /// Ended without producing an output.
    pub fn is_failed_or_skipped(self) -> bool {
        matches!(self, NodeStatus::Error | NodeStatus::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Workflow-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Ready,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Whether `self -> to` is a legal workflow transition.
    ///
    /// Any status may go back to `Draft` (reset).
    pub fn can_transition_to(self, to: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, to),
            (Draft, Ready)
                | (Ready, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (_, Draft)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Ready => "ready",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
