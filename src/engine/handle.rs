// src/engine/handle.rs

//! Cloneable front door to a running workflow store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::core::CoreRuntime;
use crate::engine::events::{EventBus, TrackerEvent};
use crate::engine::runtime::Runtime;
use crate::engine::tracker::{ExecutionTracker, WorkflowSnapshot};
use crate::engine::{RunId, RunMode, RuntimeEvent, RuntimeOptions};
use crate::errors::{InsightdagError, Result};
use crate::exec::{ExecutorBackend, LocalExecutorBackend};
use crate::graph::{EditOutcome, GraphEdit, NodeRegistry, Workflow};
use crate::stream::{JobClient, KeywordCorrelation, NodeCorrelation};

/// Issues named actions to the runtime and waits for their answers.
///
/// All mutation goes through the runtime's event loop, so any number of
/// handles can be used concurrently without racing each other.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    tx: mpsc::Sender<RuntimeEvent>,
    bus: EventBus,
}

impl WorkflowHandle {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>, bus: EventBus) -> Self {
        Self { tx, bus }
    }

    /// Observe every tracker transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.bus.subscribe()
    }

    /// Start a run. Any run in progress is torn down first.
    pub async fn run(&self, mode: RunMode) -> Result<RunId> {
        self.request(|reply| RuntimeEvent::RunRequested {
            mode,
            reply: Some(reply),
        })
        .await
    }

    /// Abort the active run. Answers once the run's executor is cancelled
    /// and its stream subscription closed.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| RuntimeEvent::StopRequested { reply: Some(reply) })
            .await
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| RuntimeEvent::ResetRequested { reply: Some(reply) })
            .await
    }

    pub async fn mark_ready(&self) -> Result<()> {
        self.request(|reply| RuntimeEvent::MarkReady { reply: Some(reply) })
            .await
    }

    pub async fn edit(&self, edit: GraphEdit) -> Result<EditOutcome> {
        self.request(|reply| RuntimeEvent::EditRequested {
            edit,
            reply: Some(reply),
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<WorkflowSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeEvent::SnapshotRequested { reply }).await?;
        rx.await.map_err(|_| InsightdagError::RuntimeClosed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(RuntimeEvent::ShutdownRequested).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> RuntimeEvent,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| InsightdagError::RuntimeClosed)?
    }

    async fn send(&self, event: RuntimeEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| InsightdagError::RuntimeClosed)
    }
}

/// Assembles a tracker, core and runtime and spawns the runtime loop.
pub struct StoreBuilder {
    workflow: Workflow,
    registry: Arc<NodeRegistry>,
    correlation: Arc<dyn NodeCorrelation>,
    job_client: Option<Arc<dyn JobClient>>,
    options: RuntimeOptions,
    event_buffer: usize,
    stream_idle_timeout: Duration,
}

impl StoreBuilder {
    pub fn new(workflow: Workflow, registry: Arc<NodeRegistry>) -> Self {
        Self {
            workflow,
            registry,
            correlation: Arc::new(KeywordCorrelation::builtin()),
            job_client: None,
            options: RuntimeOptions::default(),
            event_buffer: 256,
            stream_idle_timeout: Duration::from_secs(120),
        }
    }

    pub fn correlation(mut self, correlation: Arc<dyn NodeCorrelation>) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn job_client(mut self, client: Arc<dyn JobClient>) -> Self {
        self.job_client = Some(client);
        self
    }

    pub fn options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Spawn with the registry-backed [`LocalExecutorBackend`].
    pub fn spawn(self) -> (WorkflowHandle, JoinHandle<Result<CoreRuntime>>) {
        let registry = Arc::clone(&self.registry);
        self.spawn_with(move |tx| LocalExecutorBackend::new(registry, tx))
    }

    /// Spawn with a custom executor backend built from the runtime sender.
    pub fn spawn_with<E, F>(self, make_executor: F) -> (WorkflowHandle, JoinHandle<Result<CoreRuntime>>)
    where
        E: ExecutorBackend + 'static,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let (tx, rx) = mpsc::channel(self.event_buffer.max(1));
        let bus = EventBus::new(self.event_buffer);

        let tracker = ExecutionTracker::new(self.workflow, bus.clone());
        let core = CoreRuntime::new(tracker, self.registry, self.correlation, self.options);

        let mut runtime = Runtime::new(core, rx, tx.clone(), make_executor(tx.clone()))
            .with_stream_idle_timeout(self.stream_idle_timeout);
        if let Some(client) = self.job_client {
            runtime = runtime.with_job_client(client);
        }

        let join = tokio::spawn(runtime.run());
        (WorkflowHandle::new(tx, bus), join)
    }
}
