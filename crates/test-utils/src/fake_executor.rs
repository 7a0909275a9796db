use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use insightdag::engine::{NodeOutcome, RunId, RuntimeEvent, ScheduledNode};
use insightdag::errors::Result;
use insightdag::exec::{ExecFuture, ExecutorBackend, NodeExecutor, NodeInputs};
use insightdag::graph::Node;

/// Shared log of node names, in the order they ran.
pub type Executed = Arc<Mutex<Vec<String>>>;

/// A node executor that records each call and echoes its inputs.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: Executed,
}

impl RecordingExecutor {
    pub fn new(executed: Executed) -> Self {
        Self { executed }
    }
}

impl NodeExecutor for RecordingExecutor {
    fn execute<'a>(&'a self, node: &'a Node, inputs: NodeInputs) -> ExecFuture<'a> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(node.name.clone());
            Ok(json!({ "node": node.name, "inputs": inputs }))
        })
    }
}

/// A node executor that always rejects with `message`.
#[derive(Debug)]
pub struct FailingExecutor {
    message: String,
}

impl FailingExecutor {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl NodeExecutor for FailingExecutor {
    fn execute<'a>(&'a self, _node: &'a Node, _inputs: NodeInputs) -> ExecFuture<'a> {
        Box::pin(async move { Err(anyhow::anyhow!("{}", self.message)) })
    }
}

/// A node executor that signals `started` and then waits for `release`.
#[derive(Debug, Default)]
pub struct BlockingExecutor {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl NodeExecutor for BlockingExecutor {
    fn execute<'a>(&'a self, node: &'a Node, _inputs: NodeInputs) -> ExecFuture<'a> {
        Box::pin(async move {
            self.started.notify_one();
            self.release.notified().await;
            Ok(Value::String(format!("{} released", node.name)))
        })
    }
}

/// A fake executor backend that:
/// - records which nodes were dispatched
/// - immediately reports `NodeFinished(Success)` for each of them.
pub struct FakeBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Executed,
    cancelled: Arc<Mutex<Vec<RunId>>>,
}

impl FakeBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Executed) -> Self {
        Self {
            runtime_tx,
            executed,
            cancelled: Arc::default(),
        }
    }

    pub fn cancelled(&self) -> Arc<Mutex<Vec<RunId>>> {
        Arc::clone(&self.cancelled)
    }
}

impl ExecutorBackend for FakeBackend {
    fn dispatch(
        &mut self,
        node: ScheduledNode,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            executed.lock().unwrap().push(node.node.name.clone());

            let tx_event = RuntimeEvent::NodeFinished {
                run_id: node.run_id,
                node_id: node.node.id.clone(),
                outcome: NodeOutcome::Success(json!({ "node": node.node.name })),
            };
            // Report from a separate task: the runtime is busy executing
            // this very command and cannot drain the channel yet.
            tokio::spawn(async move {
                let _ = tx.send(tx_event).await;
            });
            Ok(())
        })
    }

    fn cancel(&mut self, run_id: RunId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let cancelled = Arc::clone(&self.cancelled);
        Box::pin(async move {
            cancelled.lock().unwrap().push(run_id);
            Ok(())
        })
    }
}
