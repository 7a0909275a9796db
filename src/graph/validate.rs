// src/graph/validate.rs

use std::collections::HashSet;

use crate::errors::GraphError;
use crate::graph::model::{Edge, Workflow};
use crate::types::{NodeType, PortDirection};

/// Structural validation of a complete workflow.
///
/// Checks unique ids, exactly one start node with output ports only, output
/// nodes with input ports only, and that every edge connects an existing
/// output port to an existing input port. Required-port coverage is left to
/// [`validate_for_run`] since drafts may be legitimately incomplete.
pub fn validate(workflow: &Workflow) -> Result<(), GraphError> {
    ensure_unique_ids(workflow)?;
    validate_start_node(workflow)?;
    validate_node_ports(workflow)?;
    for edge in &workflow.edges {
        validate_edge(workflow, edge)?;
    }
    Ok(())
}

/// Everything in [`validate`] plus: every required input port has at least
/// one incoming edge.
pub fn validate_for_run(workflow: &Workflow) -> Result<(), GraphError> {
    validate(workflow)?;
    validate_required_ports(workflow)?;
    Ok(())
}

/// Invariants every edit must keep, even on drafts: unique ids, at most one
/// start node, valid edges.
pub(crate) fn validate_draft(workflow: &Workflow) -> Result<(), GraphError> {
    ensure_unique_ids(workflow)?;

    let starts = count_start_nodes(workflow);
    if starts > 1 {
        return Err(GraphError::StartNodeCount { found: starts });
    }

    validate_node_ports(workflow)?;
    for edge in &workflow.edges {
        validate_edge(workflow, edge)?;
    }
    Ok(())
}

fn ensure_unique_ids(workflow: &Workflow) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateId {
                kind: "node",
                id: node.id.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for edge in &workflow.edges {
        if !seen.insert(edge.id.as_str()) {
            return Err(GraphError::DuplicateId {
                kind: "edge",
                id: edge.id.clone(),
            });
        }
    }

    Ok(())
}

fn count_start_nodes(workflow: &Workflow) -> usize {
    workflow
        .nodes
        .iter()
        .filter(|n| n.node_type.is_start())
        .count()
}

fn validate_start_node(workflow: &Workflow) -> Result<(), GraphError> {
    let found = count_start_nodes(workflow);
    if found != 1 {
        return Err(GraphError::StartNodeCount { found });
    }
    Ok(())
}

fn validate_node_ports(workflow: &Workflow) -> Result<(), GraphError> {
    for node in &workflow.nodes {
        let mut port_ids = HashSet::new();
        for port in &node.ports {
            if !port_ids.insert(port.id.as_str()) {
                return Err(GraphError::DuplicateId {
                    kind: "port",
                    id: format!("{}.{}", node.id, port.id),
                });
            }
        }

        if node.node_type.is_start() && node.input_ports().next().is_some() {
            return Err(GraphError::StartNodeHasInputs {
                node_id: node.id.clone(),
            });
        }
        if node.node_type == NodeType::Output && node.output_ports().next().is_some() {
            return Err(GraphError::OutputNodeHasOutputs {
                node_id: node.id.clone(),
            });
        }
    }
    Ok(())
}

/// Check one edge against the nodes of `workflow`.
pub(crate) fn validate_edge(workflow: &Workflow, edge: &Edge) -> Result<(), GraphError> {
    let endpoints = [
        (&edge.source_node_id, &edge.source_port_id, PortDirection::Output),
        (&edge.target_node_id, &edge.target_port_id, PortDirection::Input),
    ];

    for (node_id, port_id, expected) in endpoints {
        let node = workflow
            .node(node_id)
            .ok_or_else(|| GraphError::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: node_id.clone(),
            })?;

        let port = node.port(port_id).ok_or_else(|| GraphError::UnknownPort {
            edge_id: edge.id.clone(),
            node_id: node_id.clone(),
            port_id: port_id.clone(),
        })?;

        if port.direction != expected {
            return Err(GraphError::PortDirectionMismatch {
                edge_id: edge.id.clone(),
                node_id: node_id.clone(),
                port_id: port_id.clone(),
                expected,
                actual: port.direction,
            });
        }
    }

    Ok(())
}

fn validate_required_ports(workflow: &Workflow) -> Result<(), GraphError> {
    for node in &workflow.nodes {
        for port in node.input_ports().filter(|p| p.required) {
            let connected = workflow
                .edges
                .iter()
                .any(|e| e.target_node_id == node.id && e.target_port_id == port.id);
            if !connected {
                return Err(GraphError::MissingRequiredPort {
                    node_id: node.id.clone(),
                    port_id: port.id.clone(),
                });
            }
        }
    }
    Ok(())
}
