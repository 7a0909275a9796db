#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use insightdag::graph::edit::{add_edge, add_node};
use insightdag::graph::{NodeRegistry, Position, Workflow};
use insightdag::types::{NodeId, NodeType};

/// Builder for `Workflow` to simplify test setup.
///
/// Nodes are addressed by a label, which also becomes the node's `name`, so
/// tests can refer to nodes without knowing their generated ids.
pub struct WorkflowBuilder {
    workflow: Workflow,
    registry: NodeRegistry,
    labels: HashMap<String, NodeId>,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            workflow: Workflow::new(name, "table-1"),
            registry: NodeRegistry::builtin(Duration::ZERO),
            labels: HashMap::new(),
        }
    }

    /// Add a node of `node_type` named `label`.
    pub fn node(mut self, label: &str, node_type: NodeType) -> Self {
        let x = self.workflow.nodes.len() as f64 * 200.0;
        let node = add_node(&mut self.workflow, &self.registry, node_type, Position::new(x, 0.0))
            .expect("builder: add node");

        if let Some(n) = self.workflow.nodes.iter_mut().find(|n| n.id == node.id) {
            n.name = label.to_string();
        }
        self.labels.insert(label.to_string(), node.id);
        self
    }

    /// Set a config entry on a labelled node.
    pub fn config(mut self, label: &str, key: &str, value: Value) -> Self {
        let id = self.id(label);
        if let Some(n) = self.workflow.nodes.iter_mut().find(|n| n.id == id) {
            n.config.insert(key.to_string(), value);
        }
        self
    }

    /// Connect the first output port of `from` to the first input port of `to`.
    pub fn connect(mut self, from: &str, to: &str) -> Self {
        let source = self.id(from);
        let target = self.id(to);

        let source_port = self
            .workflow
            .node(&source)
            .and_then(|n| n.output_ports().next())
            .map(|p| p.id.clone())
            .expect("builder: source has an output port");
        let target_port = self
            .workflow
            .node(&target)
            .and_then(|n| n.input_ports().next())
            .map(|p| p.id.clone())
            .expect("builder: target has an input port");

        add_edge(
            &mut self.workflow,
            &self.registry,
            (&source, &source_port),
            (&target, &target_port),
        )
        .expect("builder: add edge");
        self
    }

    /// Generated id of a labelled node.
    pub fn id(&self, label: &str) -> NodeId {
        self.labels
            .get(label)
            .cloned()
            .unwrap_or_else(|| panic!("builder: unknown node label '{label}'"))
    }

    pub fn build(self) -> Workflow {
        self.workflow
    }

    /// The workflow together with its label -> id map.
    pub fn build_with_ids(self) -> (Workflow, HashMap<String, NodeId>) {
        (self.workflow, self.labels)
    }
}

/// `A (data_source) -> B (transform) -> C (output)`.
pub fn chain_abc() -> WorkflowBuilder {
    WorkflowBuilder::new("chain")
        .node("A", NodeType::DataSource)
        .node("B", NodeType::Transform)
        .node("C", NodeType::Output)
        .connect("A", "B")
        .connect("B", "C")
}

/// `profile_table (data_source) -> generate_insights (insight_extractor)`.
pub fn profile_and_insights() -> WorkflowBuilder {
    WorkflowBuilder::new("insights")
        .node("profile_table", NodeType::DataSource)
        .node("generate_insights", NodeType::InsightExtractor)
        .connect("profile_table", "generate_insights")
}
