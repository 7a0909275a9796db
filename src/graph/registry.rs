// src/graph/registry.rs

//! Node type registry: type tag -> default ports, default config, executor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::errors::GraphError;
use crate::exec::{NodeExecutor, SimulatedExecutor};
use crate::graph::model::{Node, Port, Position};
use crate::types::NodeType;

/// Everything needed to instantiate and execute one node type.
#[derive(Clone)]
pub struct NodeDefinition {
    pub node_type: NodeType,
    pub display_name: String,
    pub ports: Vec<Port>,
    pub config: Map<String, Value>,
    pub executor: Arc<dyn NodeExecutor>,
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("node_type", &self.node_type)
            .field("display_name", &self.display_name)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    definitions: HashMap<NodeType, NodeDefinition>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in types, backed by simulated executors that
    /// wait `delay` before answering.
    pub fn builtin(delay: Duration) -> Self {
        let mut registry = Self::new();
        for node_type in NodeType::ALL {
            let executor: Arc<dyn NodeExecutor> =
                Arc::new(SimulatedExecutor::new(node_type, delay));
            registry.register(builtin_definition(node_type, executor));
        }
        registry
    }

    /// Add or replace the definition for `def.node_type`.
    pub fn register(&mut self, def: NodeDefinition) {
        self.definitions.insert(def.node_type, def);
    }

    /// Swap the executor of an already-registered type.
    pub fn with_executor(mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> Self {
        if let Some(def) = self.definitions.get_mut(&node_type) {
            def.executor = executor;
        }
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<&NodeDefinition> {
        self.definitions.get(&node_type)
    }

    pub fn executor_for(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.definitions.get(&node_type).map(|d| Arc::clone(&d.executor))
    }

    /// Instantiate a fresh node of `node_type` with a new unique id.
    pub fn instantiate(&self, node_type: NodeType, position: Position) -> Result<Node, GraphError> {
        let def = self
            .get(node_type)
            .ok_or(GraphError::UnknownNodeType(node_type))?;

        Ok(Node {
            id: format!("{}-{}", node_type, uuid::Uuid::new_v4().simple()),
            node_type,
            name: def.display_name.clone(),
            position,
            ports: def.ports.clone(),
            config: def.config.clone(),
            status: Default::default(),
            error: None,
            output: None,
            executed_at: None,
            duration_ms: None,
        })
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Default shape of each built-in node type.
pub fn builtin_definition(node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> NodeDefinition {
    let (display_name, ports, config) = match node_type {
        NodeType::DataSource => (
            "Data Source",
            vec![Port::output("data", "Data").with_data_type("table")],
            json!({ "tableId": null, "sampleSize": 1000 }),
        ),
        NodeType::Transform => (
            "Transform",
            vec![
                Port::input("data", "Data", true).with_data_type("table"),
                Port::output("result", "Result").with_data_type("table"),
            ],
            json!({ "operation": "passthrough" }),
        ),
        NodeType::AiAnalysis => (
            "AI Analysis",
            vec![
                Port::input("data", "Data", true).with_data_type("table"),
                Port::output("analysis", "Analysis").with_data_type("analysis"),
            ],
            json!({ "model": "default", "prompt": null }),
        ),
        NodeType::ChartGenerator => (
            "Chart Generator",
            vec![
                Port::input("data", "Data", true),
                Port::output("chart", "Chart").with_data_type("chart"),
            ],
            json!({ "chartType": "bar" }),
        ),
        NodeType::InsightExtractor => (
            "Insight Extractor",
            vec![
                Port::input("data", "Data", true),
                Port::output("insights", "Insights").with_data_type("insights"),
            ],
            json!({ "maxInsights": 3 }),
        ),
        NodeType::Output => (
            "Output",
            vec![Port::input("result", "Result", true)],
            json!({ "format": "json" }),
        ),
        NodeType::Custom => (
            "Custom",
            vec![
                Port::input("input", "Input", false),
                Port::output("output", "Output"),
            ],
            json!({}),
        ),
    };

    NodeDefinition {
        node_type,
        display_name: display_name.to_string(),
        ports,
        config: object(config),
        executor,
    }
}
