// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of calling node
//! executors itself. This makes it easy to swap in a fake backend in tests
//! while keeping the production implementation here.
//!
//! - `LocalExecutorBackend` is the default implementation. It runs the
//!   registry's executor for the node on its own tokio task and reports back
//!   with a `NodeFinished` event.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which nodes were dispatched and emits `NodeFinished` directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{NodeOutcome, RunId, RuntimeEvent, ScheduledNode};
use crate::errors::Result;
use crate::graph::NodeRegistry;

/// Trait abstracting how scheduled nodes are executed.
pub trait ExecutorBackend: Send {
    /// Start executing `node`. The outcome arrives later as a
    /// `RuntimeEvent::NodeFinished`.
    fn dispatch(
        &mut self,
        node: ScheduledNode,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Abandon the node running for `run_id`, if any. A cancelled node must
    /// not report an outcome.
    fn cancel(&mut self, run_id: RunId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// A node executor running on its own task.
#[derive(Debug)]
struct ActiveNode {
    run_id: RunId,
    node_id: String,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Runs node executors from a [`NodeRegistry`] on tokio tasks.
///
/// Execution is sequential, so at most one node is tracked at a time.
pub struct LocalExecutorBackend {
    registry: Arc<NodeRegistry>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    active: Option<ActiveNode>,
}

impl LocalExecutorBackend {
    pub fn new(registry: Arc<NodeRegistry>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            registry,
            runtime_tx,
            active: None,
        }
    }

    fn reap_finished(&mut self) {
        if self.active.as_ref().is_some_and(|a| a.handle.is_finished()) {
            self.active = None;
        }
    }
}

impl ExecutorBackend for LocalExecutorBackend {
    fn dispatch(
        &mut self,
        scheduled: ScheduledNode,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.reap_finished();
            if let Some(previous) = &self.active {
                warn!(
                    run_id = previous.run_id,
                    node = %previous.node_id,
                    "dispatching while another node is still tracked"
                );
            }

            let ScheduledNode {
                run_id,
                node,
                inputs,
            } = scheduled;
            let node_id = node.id.clone();
            let executor = self.registry.executor_for(node.node_type);
            let runtime_tx = self.runtime_tx.clone();
            let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

            info!(run_id, node = %node.id, node_type = %node.node_type, "starting node");

            let handle = tokio::spawn(async move {
                let outcome = match executor {
                    None => NodeOutcome::Failed(format!(
                        "no executor registered for node type '{}'",
                        node.node_type
                    )),
                    Some(executor) => {
                        tokio::select! {
                            biased;
                            cancel = &mut cancel_rx => {
                                match cancel {
                                    Ok(()) => info!(run_id, node = %node.id, "node execution cancelled"),
                                    Err(_) => debug!(run_id, node = %node.id, "cancel channel closed; abandoning node"),
                                }
                                // A cancelled node never reports an outcome.
                                return;
                            }
                            result = executor.execute(&node, inputs) => match result {
                                Ok(output) => NodeOutcome::Success(output),
                                Err(e) => NodeOutcome::Failed(format!("{e:#}")),
                            },
                        }
                    }
                };

                debug!(run_id, node = %node.id, ?outcome, "node finished");
                let finished = RuntimeEvent::NodeFinished {
                    run_id,
                    node_id: node.id.clone(),
                    outcome,
                };
                // `cancel` awaits this task from the runtime loop, so a send
                // blocked on a full channel has to yield to the cancel.
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        info!(run_id, node = %node.id, "node cancelled before reporting; dropping outcome");
                    }
                    sent = runtime_tx.send(finished) => {
                        if sent.is_err() {
                            debug!(run_id, node = %node.id, "runtime gone; dropping node outcome");
                        }
                    }
                }
            });

            self.active = Some(ActiveNode {
                run_id,
                node_id,
                cancel: Some(cancel_tx),
                handle,
            });
            Ok(())
        })
    }

    fn cancel(&mut self, run_id: RunId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let Some(mut active) = self.active.take() else {
                return Ok(());
            };
            if active.run_id != run_id {
                debug!(run_id, tracked = active.run_id, "no node of this run is executing");
                self.active = Some(active);
                return Ok(());
            }

            if let Some(cancel) = active.cancel.take() {
                let _ = cancel.send(());
            }
            if let Err(e) = active.handle.await {
                if !e.is_cancelled() {
                    warn!(run_id, node = %active.node_id, error = %e, "node task failed");
                }
            }
            Ok(())
        })
    }
}
