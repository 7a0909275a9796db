// src/graph/edit.rs

//! Graph mutations.
//!
//! Every edit is applied to a copy of the workflow, checked, and only then
//! committed, so a rejected edit leaves the original untouched.

use tracing::debug;

use crate::dag;
use crate::errors::{GraphError, Result};
use crate::graph::model::{Edge, Node, Position, Workflow};
use crate::graph::registry::NodeRegistry;
use crate::graph::validate::validate_draft;
use crate::types::{NodeId, NodeType};

/// A named mutation of the graph.
#[derive(Debug, Clone)]
pub enum GraphEdit {
    AddNode {
        node_type: NodeType,
        position: Position,
    },
    RemoveNode {
        node_id: NodeId,
    },
    AddEdge {
        source_node_id: NodeId,
        source_port_id: String,
        target_node_id: NodeId,
        target_port_id: String,
    },
    RemoveEdge {
        edge_id: String,
    },
}

/// What an applied edit produced.
#[derive(Debug, Clone)]
pub enum EditOutcome {
    NodeAdded(Node),
    /// The removed node and the edges removed with it.
    NodeRemoved(Node, Vec<Edge>),
    EdgeAdded(Edge),
    EdgeRemoved(Edge),
}

/// Apply `edit` to `workflow` atomically.
pub fn apply_edit(
    workflow: &mut Workflow,
    registry: &NodeRegistry,
    edit: GraphEdit,
) -> Result<EditOutcome> {
    match edit {
        GraphEdit::AddNode {
            node_type,
            position,
        } => add_node(workflow, registry, node_type, position).map(EditOutcome::NodeAdded),
        GraphEdit::RemoveNode { node_id } => remove_node(workflow, &node_id)
            .map(|(node, edges)| EditOutcome::NodeRemoved(node, edges)),
        GraphEdit::AddEdge {
            source_node_id,
            source_port_id,
            target_node_id,
            target_port_id,
        } => add_edge(
            workflow,
            registry,
            (&source_node_id, &source_port_id),
            (&target_node_id, &target_port_id),
        )
        .map(EditOutcome::EdgeAdded),
        GraphEdit::RemoveEdge { edge_id } => {
            remove_edge(workflow, &edge_id).map(EditOutcome::EdgeRemoved)
        }
    }
}

/// Add a node of `node_type` at `position`.
pub fn add_node(
    workflow: &mut Workflow,
    registry: &NodeRegistry,
    node_type: NodeType,
    position: Position,
) -> Result<Node> {
    let node = registry.instantiate(node_type, position)?;
    let mut candidate = workflow.clone();
    candidate.nodes.push(node.clone());
    commit(workflow, candidate, false)?;
    Ok(node)
}

/// Remove a node together with every edge touching it.
pub fn remove_node(workflow: &mut Workflow, node_id: &str) -> Result<(Node, Vec<Edge>)> {
    let mut candidate = workflow.clone();
    let idx = candidate
        .node_index(node_id)
        .ok_or_else(|| GraphError::UnknownNode(node_id.to_string()))?;
    let node = candidate.nodes.remove(idx);
    let (removed, kept): (Vec<Edge>, Vec<Edge>) = candidate
        .edges
        .into_iter()
        .partition(|e| e.source_node_id == node_id || e.target_node_id == node_id);
    candidate.edges = kept;
    commit(workflow, candidate, false)?;
    Ok((node, removed))
}

/// Connect `source.port -> target.port`. Rejected if it closes a cycle.
pub fn add_edge(
    workflow: &mut Workflow,
    _registry: &NodeRegistry,
    source: (&str, &str),
    target: (&str, &str),
) -> Result<Edge> {
    let edge = Edge {
        id: format!("edge-{}", uuid::Uuid::new_v4().simple()),
        source_node_id: source.0.to_string(),
        source_port_id: source.1.to_string(),
        target_node_id: target.0.to_string(),
        target_port_id: target.1.to_string(),
    };
    let mut candidate = workflow.clone();
    candidate.edges.push(edge.clone());
    commit(workflow, candidate, true)?;
    Ok(edge)
}

pub fn remove_edge(workflow: &mut Workflow, edge_id: &str) -> Result<Edge> {
    let mut candidate = workflow.clone();
    let idx = candidate
        .edges
        .iter()
        .position(|e| e.id == edge_id)
        .ok_or_else(|| GraphError::UnknownEdge(edge_id.to_string()))?;
    let edge = candidate.edges.remove(idx);
    commit(workflow, candidate, false)?;
    Ok(edge)
}

/// Check `candidate` and, if it holds, replace `workflow` with it.
fn commit(workflow: &mut Workflow, mut candidate: Workflow, check_cycles: bool) -> Result<()> {
    validate_draft(&candidate)?;
    if check_cycles {
        dag::order(&candidate)?;
    }

    candidate.touch();
    debug!(
        workflow = %candidate.id,
        version = candidate.version,
        nodes = candidate.nodes.len(),
        edges = candidate.edges.len(),
        "applied graph edit"
    );
    *workflow = candidate;
    Ok(())
}
