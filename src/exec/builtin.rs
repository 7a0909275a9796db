// src/exec/builtin.rs

//! Simulated executors for the built-in node types.
//!
//! The real analytic work (AI calls, chart rendering) happens remotely; these
//! executors only shape plausible outputs and sleep for a configurable delay
//! so observers see nodes move through `running`.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::exec::executor::{ExecFuture, NodeExecutor, NodeInputs};
use crate::graph::Node;
use crate::types::NodeType;

/// Local stand-in for one node type.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    node_type: NodeType,
    delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(node_type: NodeType, delay: Duration) -> Self {
        Self { node_type, delay }
    }
}

impl NodeExecutor for SimulatedExecutor {
    fn execute<'a>(&'a self, node: &'a Node, inputs: NodeInputs) -> ExecFuture<'a> {
        Box::pin(async move {
            debug!(
                node = %node.id,
                node_type = %self.node_type,
                delay_ms = self.delay.as_millis() as u64,
                "simulating node execution"
            );

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if let Some(Value::String(message)) = node.config.get("failWith") {
                anyhow::bail!("{message}");
            }

            Ok(synthesize(self.node_type, node, inputs))
        })
    }
}

fn config_str<'a>(config: &'a Map<String, Value>, key: &str, fallback: &'a str) -> &'a str {
    config.get(key).and_then(Value::as_str).unwrap_or(fallback)
}

fn synthesize(node_type: NodeType, node: &Node, mut inputs: NodeInputs) -> Value {
    let cfg = &node.config;
    let data = inputs.remove("data").unwrap_or(Value::Null);

    match node_type {
        NodeType::DataSource => json!({
            "tableId": cfg.get("tableId").cloned().unwrap_or(Value::Null),
            "sampleSize": cfg.get("sampleSize").cloned().unwrap_or(Value::Null),
            "loadedAt": Utc::now().to_rfc3339(),
        }),
        NodeType::Transform => json!({
            "operation": config_str(cfg, "operation", "passthrough"),
            "data": data,
        }),
        NodeType::AiAnalysis => json!({
            "model": config_str(cfg, "model", "default"),
            "prompt": cfg.get("prompt").cloned().unwrap_or(Value::Null),
            "summary": format!("analysis of {}", node.name),
            "input": data,
        }),
        NodeType::ChartGenerator => json!({
            "chartType": config_str(cfg, "chartType", "bar"),
            "series": data,
        }),
        NodeType::InsightExtractor => {
            let max = cfg.get("maxInsights").and_then(Value::as_u64).unwrap_or(3);
            let insights: Vec<Value> = (1..=max)
                .map(|i| json!({ "rank": i, "text": format!("insight {i} from {}", node.name) }))
                .collect();
            json!({ "insights": insights, "source": data })
        }
        NodeType::Output => json!({
            "format": config_str(cfg, "format", "json"),
            "result": inputs.remove("result").unwrap_or(Value::Null),
        }),
        NodeType::Custom => {
            let mut all: Map<String, Value> = inputs.into_iter().collect();
            if !data.is_null() {
                all.insert("data".to_string(), data);
            }
            Value::Object(all)
        }
    }
}
