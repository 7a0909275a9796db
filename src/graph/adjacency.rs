// src/graph/adjacency.rs

use std::collections::HashMap;

use crate::graph::model::Workflow;
use crate::types::NodeId;

/// Immediate predecessors and successors of a node.
#[derive(Debug, Clone, Default)]
struct Links {
    predecessors: Vec<NodeId>,
    successors: Vec<NodeId>,
}

/// Lightweight adjacency view of a workflow, keyed by node id.
///
/// Neighbour lists are deduplicated and keep edge order, so two edges between
/// the same pair of nodes count once. Edges whose endpoints do not exist are
/// ignored; structural validation reports those.
#[derive(Debug, Clone)]
pub struct Adjacency {
    links: HashMap<NodeId, Links>,
}

impl Adjacency {
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut links: HashMap<NodeId, Links> = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Links::default()))
            .collect();

        for edge in &workflow.edges {
            if !links.contains_key(&edge.source_node_id)
                || !links.contains_key(&edge.target_node_id)
            {
                continue;
            }

            if let Some(source) = links.get_mut(&edge.source_node_id) {
                if !source.successors.contains(&edge.target_node_id) {
                    source.successors.push(edge.target_node_id.clone());
                }
            }
            if let Some(target) = links.get_mut(&edge.target_node_id) {
                if !target.predecessors.contains(&edge.source_node_id) {
                    target.predecessors.push(edge.source_node_id.clone());
                }
            }
        }

        Self { links }
    }

    /// Nodes with an edge into `id`.
    pub fn predecessors_of(&self, id: &str) -> &[NodeId] {
        self.links
            .get(id)
            .map(|l| l.predecessors.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes that `id` has an edge into.
    pub fn successors_of(&self, id: &str) -> &[NodeId] {
        self.links
            .get(id)
            .map(|l| l.successors.as_slice())
            .unwrap_or(&[])
    }
}
