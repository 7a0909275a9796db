// src/dag/scheduler.rs

//! Deterministic execution order for a workflow graph.

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::errors::CycleError;
use crate::graph::{Adjacency, Workflow};
use crate::types::NodeId;

/// Compute a total execution order with Kahn's algorithm.
///
/// Nodes are released in waves: every node whose in-degree is zero is emitted
/// in creation order (its position in `workflow.nodes`), then the in-degree of
/// its successors drops, and the next wave is collected. The result lists
/// every node exactly once, after all of its direct predecessors.
///
/// Fails with [`CycleError`] if some nodes can never be released; the error
/// names the nodes of at least one cycle. The workflow is never mutated.
pub fn order(workflow: &Workflow) -> Result<Vec<NodeId>, CycleError> {
    let adjacency = Adjacency::from_workflow(workflow);
    let count = workflow.nodes.len();

    let mut in_degree: Vec<usize> = workflow
        .nodes
        .iter()
        .map(|n| adjacency.predecessors_of(&n.id).len())
        .collect();

    let mut wave: Vec<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<NodeId> = Vec::with_capacity(count);

    while !wave.is_empty() {
        let mut next = Vec::new();

        for idx in wave {
            let id = &workflow.nodes[idx].id;
            sorted.push(id.clone());

            for succ in adjacency.successors_of(id) {
                let Some(succ_idx) = workflow.node_index(succ) else {
                    continue;
                };
                in_degree[succ_idx] -= 1;
                if in_degree[succ_idx] == 0 {
                    next.push(succ_idx);
                }
            }
        }

        next.sort_unstable();
        wave = next;
    }

    if sorted.len() < count {
        let nodes = cycle_members(workflow, &sorted);
        warn!(?nodes, "cycle detected while ordering workflow");
        return Err(CycleError { nodes });
    }

    debug!(order = ?sorted, "computed execution order");
    Ok(sorted)
}

/// Find the nodes of one cycle among those Kahn could not release.
///
/// Unreleased nodes are either on a cycle or downstream of one, so look for a
/// strongly connected component with more than one member (or a self loop).
fn cycle_members(workflow: &Workflow, released: &[NodeId]) -> Vec<NodeId> {
    let remaining: Vec<&str> = workflow
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| !released.iter().any(|r| r.as_str() == *id))
        .collect();

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for &id in &remaining {
        graph.add_node(id);
    }
    for edge in &workflow.edges {
        let (source, target) = (edge.source_node_id.as_str(), edge.target_node_id.as_str());
        if graph.contains_node(source) && graph.contains_node(target) {
            graph.add_edge(source, target, ());
        }
    }

    let mut members: Vec<NodeId> = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| scc.into_iter().map(str::to_string).collect())
        .unwrap_or_else(|| remaining.iter().map(|s| s.to_string()).collect());

    // Report in creation order so the message is stable.
    members.sort_by_key(|id| workflow.node_index(id));
    members
}
