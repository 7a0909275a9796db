// src/engine/mod.rs

//! Execution engine for insightdag.
//!
//! This module ties together:
//! - the execution tracker (per-node and per-workflow state machine)
//! - the local sequential plan that walks the scheduler's order
//! - the stream reconciler for remote runs
//! - the runtime event loop that reacts to:
//!   - named store actions (run, stop, reset, edit, ...)
//!   - node executor completions
//!   - remote stream events and disconnects
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`], and [`handle`] is the cloneable front door.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::{Result, StreamError};
use crate::graph::GraphEdit;
use crate::graph::edit::EditOutcome;
use crate::stream::{LogEvent, RunRequest};
use crate::types::NodeId;

/// Monotonic run number. Events carrying an older id are stale.
pub type RunId = u64;

/// Result of one local node execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Success(Value),
    Failed(String),
}

/// Where a run's computation happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Node executors are called one at a time in scheduler order.
    Local,
    /// A remote job runs the whole workflow; its stream drives node state.
    Remote(RunRequest),
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once a run reaches a terminal status
    /// (used by the CLI).
    pub exit_when_idle: bool,
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Events flowing into the runtime from handles, executors and streams.
#[derive(Debug)]
pub enum RuntimeEvent {
    RunRequested {
        mode: RunMode,
        reply: Option<Reply<RunId>>,
    },
    StopRequested {
        reply: Option<Reply<()>>,
    },
    ResetRequested {
        reply: Option<Reply<()>>,
    },
    MarkReady {
        reply: Option<Reply<()>>,
    },
    EditRequested {
        edit: GraphEdit,
        reply: Option<Reply<EditOutcome>>,
    },
    SnapshotRequested {
        reply: oneshot::Sender<WorkflowSnapshot>,
    },
    /// A local node executor finished.
    NodeFinished {
        run_id: RunId,
        node_id: NodeId,
        outcome: NodeOutcome,
    },
    /// The remote stream delivered an event.
    StreamEvent { run_id: RunId, event: LogEvent },
    /// The remote stream ended without a terminal event.
    StreamEnded { run_id: RunId, error: StreamError },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod context;
pub mod core;
pub mod events;
pub mod handle;
pub mod local;
pub mod runtime;
pub mod step;
pub mod tracker;

pub use context::{ExecutionContext, ExecutionErrorRecord};
pub use core::CoreRuntime;
pub use events::{EventBus, TrackerEvent};
pub use handle::{StoreBuilder, WorkflowHandle};
pub use runtime::Runtime;
pub use step::{CoreCommand, CoreStep, ScheduledNode};
pub use tracker::{ExecutionTracker, NodeSnapshot, WorkflowSnapshot};
