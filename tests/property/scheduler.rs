use std::collections::BTreeSet;

use proptest::prelude::*;

use insightdag::dag;
use insightdag::errors::InsightdagError;
use insightdag::graph::edit::add_edge;
use insightdag::graph::{NodeRegistry, Workflow};
use insightdag::types::NodeType;
use insightdag_test_utils::builders::WorkflowBuilder;

/// A random acyclic workflow.
///
/// Label `n0` is the data source; every edge goes from a lower label index to
/// a higher one, so the graph is acyclic. Nodes are created in a shuffled
/// order so creation order and dependency order disagree.
fn workflow_strategy(max_nodes: usize) -> impl Strategy<Value = (Workflow, Vec<(usize, usize)>)> {
    (2..=max_nodes).prop_flat_map(|count| {
        let creation = Just((0..count).collect::<Vec<_>>()).prop_shuffle();
        let edges = proptest::collection::vec((0..count, 0..count), 0..count * 2);

        (creation, edges).prop_map(move |(creation, raw_edges)| {
            let edges: BTreeSet<(usize, usize)> = raw_edges
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect();

            let mut builder = WorkflowBuilder::new("random");
            for idx in &creation {
                let node_type = if *idx == 0 {
                    NodeType::DataSource
                } else {
                    NodeType::Custom
                };
                builder = builder.node(&format!("n{idx}"), node_type);
            }
            for (from, to) in &edges {
                builder = builder.connect(&format!("n{from}"), &format!("n{to}"));
            }

            (builder.build(), edges.into_iter().collect())
        })
    })
}

proptest! {
    #[test]
    fn order_lists_every_node_after_its_predecessors((workflow, _) in workflow_strategy(10)) {
        let order = dag::order(&workflow).unwrap();

        prop_assert_eq!(order.len(), workflow.nodes.len());
        let unique: BTreeSet<&String> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());

        let position = |id: &str| order.iter().position(|o| o == id).unwrap();
        for edge in &workflow.edges {
            prop_assert!(
                position(&edge.source_node_id) < position(&edge.target_node_id),
                "edge {} -> {} out of order in {:?}",
                edge.source_node_id,
                edge.target_node_id,
                order
            );
        }
    }

    #[test]
    fn order_is_deterministic((workflow, _) in workflow_strategy(10)) {
        let first = dag::order(&workflow).unwrap();
        let second = dag::order(&workflow.clone()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn reversed_edge_is_rejected_without_mutation((workflow, edges) in workflow_strategy(8)) {
        // Reverse an edge between two custom nodes; data sources have no input.
        let Some(&(from, to)) = edges.iter().find(|(from, _)| *from != 0) else {
            return Ok(());
        };
        let id_of = |label: usize| {
            workflow
                .nodes
                .iter()
                .find(|n| n.name == format!("n{label}"))
                .map(|n| n.id.clone())
                .unwrap()
        };
        let (source, target) = (id_of(to), id_of(from));

        let mut candidate = workflow.clone();
        let registry = NodeRegistry::builtin(std::time::Duration::ZERO);
        let err = add_edge(&mut candidate, &registry, (&source, "output"), (&target, "input"))
            .unwrap_err();

        prop_assert!(matches!(err, InsightdagError::Cycle(_)), "{:?}", err);
        prop_assert_eq!(candidate, workflow);
    }
}
