// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::{Result, StreamError};
use crate::exec::ExecutorBackend;
use crate::stream::{JobClient, RunRequest, Subscription};

use super::core::CoreRuntime;
use super::{CoreCommand, Reply, RunId, RuntimeEvent, ScheduledNode};

/// Drives the workflow store in response to `RuntimeEvent`s, and delegates
/// node execution to an `ExecutorBackend` and remote jobs to a `JobClient`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. Being the only consumer of the event channel makes it
/// the single writer of the store.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    job_client: Option<Arc<dyn JobClient>>,
    subscription: Option<Subscription>,
    stream_idle_timeout: Duration,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    /// `event_tx` must feed `event_rx`; stream pumps report through it.
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            job_client: None,
            subscription: None,
            stream_idle_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_job_client(mut self, client: Arc<dyn JobClient>) -> Self {
        self.job_client = Some(client);
        self
    }

    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (run nodes, open/close
    ///   streams, exit).
    ///
    /// Returns the core so callers can inspect the final state.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!(workflow = %self.core.tracker().workflow().id, "insightdag runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let (event, deferred) = defer_teardown_reply(event);
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if let Some(deferred) = deferred {
                deferred.deliver();
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchNode(node) => self.dispatch(node).await?,
            CoreCommand::CancelNode { run_id } => self.executor.cancel(run_id).await?,
            CoreCommand::OpenStream { run_id, request } => self.open_stream(run_id, request).await,
            CoreCommand::CloseStream { run_id } => self.close_stream(run_id).await,
            CoreCommand::RequestExit => {
                // keep_running is already false for this step.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, node: ScheduledNode) -> Result<()> {
        debug!(
            run_id = node.run_id,
            node = %node.node.id,
            inputs = ?node.inputs.keys().collect::<Vec<_>>(),
            "dispatching node"
        );
        self.executor.dispatch(node).await
    }

    async fn open_stream(&mut self, run_id: RunId, request: RunRequest) {
        // A new run always replaces the previous subscription.
        if let Some(previous) = self.subscription.take() {
            previous.close().await;
        }

        let Some(client) = self.job_client.clone() else {
            warn!(run_id, "remote run requested but no job client is configured");
            let tx = self.event_tx.clone();
            tokio::spawn(async move {
                let _ = tx
                    .send(RuntimeEvent::StreamEnded {
                        run_id,
                        error: StreamError::Transport("no job client configured".to_string()),
                    })
                    .await;
            });
            return;
        };

        info!(run_id, table = %request.table_asset_id, "opening remote stream");
        self.subscription = Some(Subscription::open(
            run_id,
            client,
            request,
            self.event_tx.clone(),
            self.stream_idle_timeout,
        ));
    }

    async fn close_stream(&mut self, run_id: RunId) {
        match self.subscription.take() {
            Some(sub) if sub.run_id() == run_id => {
                debug!(run_id, "closing remote stream");
                sub.close().await;
            }
            other => self.subscription = other,
        }
    }
}

/// Answer to a stop or reset, held until the core's teardown commands ran.
///
/// A caller that sees `Ok` can rely on the old run's executor being
/// cancelled and its stream subscription being closed.
struct DeferredReply {
    answer: oneshot::Receiver<Result<()>>,
    caller: Reply<()>,
}

impl DeferredReply {
    fn deliver(mut self) {
        match self.answer.try_recv() {
            Ok(result) => {
                let _ = self.caller.send(result);
            }
            Err(e) => debug!(error = %e, "core left a teardown request unanswered"),
        }
    }
}

fn defer_teardown_reply(event: RuntimeEvent) -> (RuntimeEvent, Option<DeferredReply>) {
    match event {
        RuntimeEvent::StopRequested {
            reply: Some(caller),
        } => {
            let (answer_tx, answer) = oneshot::channel();
            let deferred = DeferredReply { answer, caller };
            (RuntimeEvent::StopRequested { reply: Some(answer_tx) }, Some(deferred))
        }
        RuntimeEvent::ResetRequested {
            reply: Some(caller),
        } => {
            let (answer_tx, answer) = oneshot::channel();
            let deferred = DeferredReply { answer, caller };
            (RuntimeEvent::ResetRequested { reply: Some(answer_tx) }, Some(deferred))
        }
        other => (other, None),
    }
}
