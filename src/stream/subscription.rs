// src/stream/subscription.rs

//! Background task that pumps a remote event stream into the runtime.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{RunId, RuntimeEvent};
use crate::errors::StreamError;
use crate::stream::client::{EventStream, JobClient, RunRequest};

/// Handle on a running stream pump.
///
/// Closing (or dropping) the subscription stops the pump; nothing it read
/// after that point reaches the runtime.
#[derive(Debug)]
pub struct Subscription {
    run_id: RunId,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Start a remote job and forward its events tagged with `run_id`.
    ///
    /// Starting the job happens inside the spawned task, so a slow endpoint
    /// never blocks the caller and can still be cancelled.
    pub fn open(
        run_id: RunId,
        client: Arc<dyn JobClient>,
        request: RunRequest,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        idle_timeout: Duration,
    ) -> Self {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let started = tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    info!(run_id, "stream subscription closed before the job started");
                    return;
                }
                started = client.start_job(request) => started,
            };

            match started {
                Ok(stream) => pump(run_id, stream, runtime_tx, idle_timeout, cancel_rx).await,
                Err(error) => {
                    warn!(run_id, %error, "could not start remote job");
                    let ended = RuntimeEvent::StreamEnded { run_id, error };
                    forward(run_id, &runtime_tx, ended, &mut cancel_rx).await;
                }
            }
        });
        Self {
            run_id,
            cancel: Some(cancel_tx),
            handle,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Stop the pump and wait for it to exit.
    pub async fn close(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                warn!(run_id = self.run_id, error = %e, "stream pump task failed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn pump(
    run_id: RunId,
    mut stream: EventStream,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    idle_timeout: Duration,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    debug!(run_id, "stream pump started");

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut cancel_rx => {
                info!(run_id, "stream subscription closed");
                return;
            }
            next = tokio::time::timeout(idle_timeout, stream.next()) => next,
        };

        let ended = match next {
            Err(_) => RuntimeEvent::StreamEnded {
                run_id,
                error: StreamError::Timeout(idle_timeout.as_secs()),
            },
            Ok(None) => RuntimeEvent::StreamEnded {
                run_id,
                error: StreamError::Disconnected(
                    "stream ended without a terminal event".to_string(),
                ),
            },
            Ok(Some(Err(StreamError::Decode(reason)))) => {
                warn!(run_id, %reason, "skipping undecodable stream event");
                continue;
            }
            Ok(Some(Err(error))) => RuntimeEvent::StreamEnded { run_id, error },
            Ok(Some(Ok(event))) => {
                let terminal = event.is_terminal();
                let event = RuntimeEvent::StreamEvent { run_id, event };
                if !forward(run_id, &runtime_tx, event, &mut cancel_rx).await {
                    return;
                }
                if terminal {
                    debug!(run_id, "terminal stream event forwarded");
                    return;
                }
                continue;
            }
        };

        forward(run_id, &runtime_tx, ended, &mut cancel_rx).await;
        return;
    }
}

/// Send one event to the runtime unless the subscription is closed first.
///
/// The runtime awaits the pump while closing it and is the only reader of
/// the channel, so a send on a full channel must give way to the cancel.
/// Returns false when the pump should stop.
async fn forward(
    run_id: RunId,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    event: RuntimeEvent,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel_rx => {
            info!(run_id, "stream subscription closed; dropping pending event");
            false
        }
        sent = runtime_tx.send(event) => {
            if sent.is_err() {
                debug!(run_id, "runtime gone; stopping stream pump");
            }
            sent.is_ok()
        }
    }
}
