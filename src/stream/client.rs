// src/stream/client.rs

//! Remote job collaborators.
//!
//! A [`JobClient`] starts a remote analysis job and hands back its live event
//! stream. The runtime only ever sees the boxed stream, so the HTTP client,
//! the file replay client and test doubles are interchangeable.

use std::collections::VecDeque;
use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::StreamError;
use crate::stream::codec::NdjsonDecoder;
use crate::stream::event::LogEvent;

/// Body of the request that starts a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub table_asset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_intent: Option<String>,
    pub workflow_type: String,
}

impl RunRequest {
    pub fn new(table_asset_id: impl Into<String>, workflow_type: impl Into<String>) -> Self {
        Self {
            table_asset_id: table_asset_id.into(),
            user_intent: None,
            workflow_type: workflow_type.into(),
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.user_intent = Some(intent.into());
        self
    }
}

/// Live events of one remote job. Ends after the source closes.
pub type EventStream = BoxStream<'static, Result<LogEvent, StreamError>>;

pub trait JobClient: Send + Sync {
    /// Start a job and return its event stream.
    fn start_job(&self, request: RunRequest) -> BoxFuture<'_, Result<EventStream, StreamError>>;
}

/// Starts jobs over HTTP and reads the response body as NDJSON.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpJobClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl JobClient for HttpJobClient {
    fn start_job(&self, request: RunRequest) -> BoxFuture<'_, Result<EventStream, StreamError>> {
        Box::pin(async move {
            info!(endpoint = %self.endpoint, table = %request.table_asset_id, "starting remote job");

            let response = self
                .http
                .post(&self.endpoint)
                .header("accept", "application/x-ndjson")
                .json(&request)
                .send()
                .await
                .map_err(|e| StreamError::Transport(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(StreamError::Transport(format!("HTTP {status}: {body}")));
            }

            let bytes = response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| StreamError::Transport(e.to_string())))
                .boxed();

            Ok(decode_ndjson(bytes))
        })
    }
}

/// Replays a recorded NDJSON event file as if it were a live job.
#[derive(Debug, Clone)]
pub struct ReplayJobClient {
    path: PathBuf,
}

impl ReplayJobClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl JobClient for ReplayJobClient {
    fn start_job(&self, request: RunRequest) -> BoxFuture<'_, Result<EventStream, StreamError>> {
        Box::pin(async move {
            debug!(path = %self.path.display(), table = %request.table_asset_id, "replaying recorded job");

            let content = tokio::fs::read(&self.path)
                .await
                .map_err(|e| StreamError::Transport(format!("{}: {e}", self.path.display())))?;

            Ok(decode_ndjson(stream::iter(vec![Ok(content)])))
        })
    }
}

struct DecodeState<S> {
    source: Option<S>,
    decoder: NdjsonDecoder,
    utf8_tail: Vec<u8>,
    ready: VecDeque<Result<LogEvent, StreamError>>,
}

/// Turn a stream of raw byte chunks into decoded events.
///
/// Chunks may split lines and multi-byte characters anywhere.
pub fn decode_ndjson<S>(source: S) -> EventStream
where
    S: futures::Stream<Item = Result<Vec<u8>, StreamError>> + Send + Unpin + 'static,
{
    let state = DecodeState {
        source: Some(source),
        decoder: NdjsonDecoder::new(),
        utf8_tail: Vec::new(),
        ready: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }

            let source = state.source.as_mut()?;
            match source.next().await {
                Some(Ok(chunk)) => {
                    state.utf8_tail.extend_from_slice(&chunk);
                    let text = take_valid_utf8(&mut state.utf8_tail);
                    state.ready.extend(state.decoder.feed(&text));
                }
                Some(Err(e)) => {
                    state.source = None;
                    return Some((Err(e), state));
                }
                None => {
                    state.source = None;
                    if !state.utf8_tail.is_empty() {
                        let rest = String::from_utf8_lossy(&state.utf8_tail).into_owned();
                        state.utf8_tail.clear();
                        state.ready.extend(state.decoder.feed(&rest));
                    }
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

/// Split off the longest valid UTF-8 prefix, keeping an incomplete trailing
/// character for the next chunk.
fn take_valid_utf8(buf: &mut Vec<u8>) -> String {
    match std::str::from_utf8(buf) {
        Ok(text) => {
            let text = text.to_string();
            buf.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let rest = buf.split_off(valid);
            let text = String::from_utf8_lossy(buf).into_owned();
            *buf = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            text
        }
    }
}
