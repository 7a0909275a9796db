// src/engine/step.rs

//! Commands the pure core hands to the IO shell.

use crate::engine::RunId;
use crate::exec::NodeInputs;
use crate::graph::Node;
use crate::stream::RunRequest;

/// A node ready to run, with its inputs already resolved.
#[derive(Debug, Clone)]
pub struct ScheduledNode {
    pub run_id: RunId,
    pub node: Node,
    pub inputs: NodeInputs,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Run this node's executor.
    DispatchNode(ScheduledNode),
    /// Abandon whatever node executor is running for this run.
    CancelNode { run_id: RunId },
    /// Start a remote job and subscribe to its stream.
    OpenStream { run_id: RunId, request: RunRequest },
    /// Close the stream subscription of this run.
    CloseStream { run_id: RunId },
    /// Request that the process exits (the CLI's single run finished).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    /// Run `commands`; the loop stops after them if one is `RequestExit`.
    pub fn proceed(commands: Vec<CoreCommand>) -> Self {
        let keep_running = !commands
            .iter()
            .any(|c| matches!(c, CoreCommand::RequestExit));
        Self {
            commands,
            keep_running,
        }
    }

    pub fn idle() -> Self {
        Self::proceed(Vec::new())
    }
}
