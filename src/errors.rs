// src/errors.rs

//! Crate-wide error types.
//!
//! Structural problems (`GraphError`, `CycleError`) stop a run before it
//! starts. Node-level problems (`NodeFailure`) are contained to the node and
//! its dependents. `TransitionError` marks a programming error in whoever
//! drives the tracker; the tracker rejects the call without mutating state.

use thiserror::Error;

use crate::types::{NodeId, NodeStatus, NodeType, PortDirection, WorkflowStatus};

/// Structural problems with a workflow graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("edge '{edge_id}' references missing node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: NodeId },

    #[error("edge '{edge_id}' references missing port '{port_id}' on node '{node_id}'")]
    UnknownPort {
        edge_id: String,
        node_id: NodeId,
        port_id: String,
    },

    #[error(
        "edge '{edge_id}': port '{port_id}' on node '{node_id}' is an {actual} port, expected {expected}"
    )]
    PortDirectionMismatch {
        edge_id: String,
        node_id: NodeId,
        port_id: String,
        expected: PortDirection,
        actual: PortDirection,
    },

    #[error("required input port '{port_id}' on node '{node_id}' has no incoming edge")]
    MissingRequiredPort { node_id: NodeId, port_id: String },

    #[error("workflow must contain exactly one data_source node (found {found})")]
    StartNodeCount { found: usize },

    #[error("data_source node '{node_id}' must expose only output ports")]
    StartNodeHasInputs { node_id: NodeId },

    #[error("output node '{node_id}' must expose only input ports")]
    OutputNodeHasOutputs { node_id: NodeId },

    #[error("no registered definition for node type '{0}'")]
    UnknownNodeType(NodeType),

    #[error("node not found: {0}")]
    UnknownNode(NodeId),

    #[error("edge not found: {0}")]
    UnknownEdge(String),
}

/// The scheduler found a cycle; `nodes` lists node ids on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cycle detected in workflow graph involving node(s) {}", nodes.join(", "))]
pub struct CycleError {
    pub nodes: Vec<NodeId>,
}

/// An attempted state change that the state machine does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition for node '{node_id}': {from} -> {to}")]
    Node {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    #[error("invalid workflow transition: {from} -> {to}")]
    Workflow {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("node not found: {0}")]
    UnknownNode(NodeId),

    #[error("no execution in progress")]
    NoActiveExecution,
}

/// Why a single node failed during a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeFailure {
    #[error("missing input '{port_id}' for node '{node_id}'")]
    MissingInput { node_id: NodeId, port_id: String },

    #[error("executor for node '{node_id}' failed: {message}")]
    ExecutorFailure { node_id: NodeId, message: String },
}

/// Problems with the remote event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("could not decode stream event: {0}")]
    Decode(String),

    #[error("stream transport error: {0}")]
    Transport(String),

    #[error("stream disconnected: {0}")]
    Disconnected(String),

    #[error("no stream event received for {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum InsightdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("a run is in progress; stop it before editing the workflow")]
    RunInProgress,

    #[error("workflow runtime is no longer running")]
    RuntimeClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, InsightdagError>;
