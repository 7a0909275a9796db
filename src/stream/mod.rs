// src/stream/mod.rs

//! Remote job stream handling.
//!
//! - [`event`]: wire shape of stream events.
//! - [`codec`]: newline-delimited JSON decoding.
//! - [`correlate`]: replaceable log-message to node-type strategy.
//! - [`reconciler`]: applies events to the execution tracker.
//! - [`client`]: job clients that start a remote job and return its stream.
//! - [`subscription`]: background task feeding a stream into the runtime.

pub mod client;
pub mod codec;
pub mod correlate;
pub mod event;
pub mod reconciler;
pub mod subscription;

pub use client::{EventStream, HttpJobClient, JobClient, ReplayJobClient, RunRequest};
pub use codec::NdjsonDecoder;
pub use correlate::{KeywordCorrelation, NodeCorrelation, BUILTIN_KEYWORDS};
pub use event::{LogEvent, LogEventKind};
pub use reconciler::{Reconciled, StreamReconciler};
pub use subscription::Subscription;
