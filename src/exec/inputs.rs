// src/exec/inputs.rs

//! Assembling a node's inputs from upstream outputs.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::errors::NodeFailure;
use crate::exec::executor::NodeInputs;
use crate::graph::Workflow;
use crate::types::NodeId;

/// Collect inputs for `node_id` from the outputs of its predecessors.
///
/// Each incoming edge contributes the source node's output under the target
/// port id. One edge yields the value itself; several edges into the same
/// port yield an array in edge order. Sources without an output (failed or
/// skipped) contribute nothing, so a required port fed only by them fails
/// with `MissingInput`.
pub fn resolve_inputs(
    workflow: &Workflow,
    node_id: &str,
    outputs: &HashMap<NodeId, Value>,
) -> Result<NodeInputs, NodeFailure> {
    let mut collected: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for edge in workflow.edges.iter().filter(|e| e.target_node_id == node_id) {
        if let Some(value) = outputs.get(&edge.source_node_id) {
            collected
                .entry(edge.target_port_id.clone())
                .or_default()
                .push(value.clone());
        }
    }

    if let Some(node) = workflow.node(node_id) {
        if let Some(port) = node
            .input_ports()
            .find(|p| p.required && !collected.contains_key(&p.id))
        {
            return Err(NodeFailure::MissingInput {
                node_id: node_id.to_string(),
                port_id: port.id.clone(),
            });
        }
    }

    Ok(collected
        .into_iter()
        .map(|(port, mut values)| {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            (port, value)
        })
        .collect())
}
