use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use insightdag::errors::StreamError;
use insightdag::stream::{EventStream, JobClient, LogEvent, RunRequest};

pub type StreamSender = mpsc::UnboundedSender<Result<LogEvent, StreamError>>;

/// A job client whose stream is fed by the test through a channel.
///
/// Only one job can be started; later calls fail with a transport error.
/// Dropping the sender ends the stream without a terminal event.
pub struct ChannelJobClient {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<LogEvent, StreamError>>>>,
    requests: Arc<Mutex<Vec<RunRequest>>>,
}

impl ChannelJobClient {
    pub fn new() -> (Self, StreamSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            receiver: Mutex::new(Some(rx)),
            requests: Arc::default(),
        };
        (client, tx)
    }

    /// Every request this client was asked to start.
    pub fn requests(&self) -> Arc<Mutex<Vec<RunRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl JobClient for ChannelJobClient {
    fn start_job(&self, request: RunRequest) -> BoxFuture<'_, Result<EventStream, StreamError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);

            let rx = self
                .receiver
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| StreamError::Transport("job already started".to_string()))?;

            let stream = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(stream.boxed())
        })
    }
}

/// Send a scripted sequence of events.
pub fn send_all(tx: &StreamSender, events: impl IntoIterator<Item = LogEvent>) {
    for event in events {
        tx.send(Ok(event)).expect("stream receiver alive");
    }
}
