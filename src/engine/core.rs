// src/engine/core.rs

//! Pure core of the workflow store.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - updated tracker state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell ([`crate::engine::runtime::Runtime`]) is responsible for:
//! - reading events from the channel
//! - running node executors
//! - opening and closing remote stream subscriptions
//!
//! Request events carry a oneshot reply; the core answers them directly.
//! Every other effect goes out as a [`CoreCommand`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dag;
use crate::engine::local::{Advance, LocalPlan};
use crate::engine::step::{CoreCommand, CoreStep};
use crate::engine::tracker::{ExecutionTracker, WorkflowSnapshot};
use crate::engine::{NodeOutcome, RunId, RunMode, RuntimeEvent, RuntimeOptions};
use crate::errors::{InsightdagError, Result, StreamError, TransitionError};
use crate::graph::edit::{apply_edit, EditOutcome, GraphEdit};
use crate::graph::{validate, validate_for_run, Adjacency, NodeRegistry};
use crate::stream::{LogEvent, NodeCorrelation, Reconciled, StreamReconciler};
use crate::types::WorkflowStatus;

#[derive(Debug)]
enum RunKind {
    Local(LocalPlan),
    Remote(StreamReconciler),
}

#[derive(Debug)]
struct ActiveRun {
    run_id: RunId,
    kind: RunKind,
}

/// Pure core state.
///
/// This owns:
/// - the execution tracker (and through it the workflow)
/// - the node registry and correlation strategy
/// - the active run, if any
///
/// It performs no IO and never awaits.
#[derive(Debug)]
pub struct CoreRuntime {
    tracker: ExecutionTracker,
    registry: Arc<NodeRegistry>,
    correlation: Arc<dyn NodeCorrelation>,
    options: RuntimeOptions,
    last_run_id: RunId,
    active: Option<ActiveRun>,
}

impl CoreRuntime {
    pub fn new(
        tracker: ExecutionTracker,
        registry: Arc<NodeRegistry>,
        correlation: Arc<dyn NodeCorrelation>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            tracker,
            registry,
            correlation,
            options,
            last_run_id: 0,
            active: None,
        }
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// True when no run is in progress.
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn active_run_id(&self) -> Option<RunId> {
        self.active.as_ref().map(|a| a.run_id)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.tracker.snapshot()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::RunRequested { mode, reply } => match self.start_run(mode) {
                Ok((run_id, step)) => {
                    respond(reply, Ok(run_id));
                    step
                }
                Err(e) => {
                    warn!(error = %e, "run rejected");
                    respond(reply, Err(e));
                    CoreStep::idle()
                }
            },
            RuntimeEvent::StopRequested { reply } => match self.stop() {
                Ok(step) => {
                    respond(reply, Ok(()));
                    step
                }
                Err(e) => {
                    respond(reply, Err(e));
                    CoreStep::idle()
                }
            },
            RuntimeEvent::ResetRequested { reply } => {
                let step = self.reset();
                respond(reply, Ok(()));
                step
            }
            RuntimeEvent::MarkReady { reply } => {
                respond(reply, self.mark_ready());
                CoreStep::idle()
            }
            RuntimeEvent::EditRequested { edit, reply } => {
                respond(reply, self.edit(edit));
                CoreStep::idle()
            }
            RuntimeEvent::SnapshotRequested { reply } => {
                let _ = reply.send(self.tracker.snapshot());
                CoreStep::idle()
            }
            RuntimeEvent::NodeFinished {
                run_id,
                node_id,
                outcome,
            } => self.handle_node_finished(run_id, &node_id, outcome),
            RuntimeEvent::StreamEvent { run_id, event } => self.handle_stream_event(run_id, event),
            RuntimeEvent::StreamEnded { run_id, error } => self.handle_stream_ended(run_id, error),
            RuntimeEvent::ShutdownRequested => {
                let commands = self.terminate_active();
                if self.tracker.status() == WorkflowStatus::Running {
                    if let Err(e) = self.tracker.stop_execution() {
                        warn!(error = %e, "could not stop run during shutdown");
                    }
                }
                CoreStep {
                    commands,
                    keep_running: false,
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Named actions
    // ---------------------------------------------------------------------

    /// Start a new run.
    ///
    /// Structural problems are reported before anything changes. An in-flight
    /// run is torn down (its stream closed, its executor cancelled) before the
    /// tracker is reset, so two runs never write at once.
    pub fn start_run(&mut self, mode: RunMode) -> Result<(RunId, CoreStep)> {
        validate_for_run(self.tracker.workflow())?;
        let order = dag::order(self.tracker.workflow())?;

        let mut commands = self.terminate_active();
        self.tracker.reset_execution();
        self.tracker.mark_ready()?;
        self.tracker.start_execution()?;

        self.last_run_id += 1;
        let run_id = self.last_run_id;
        info!(run_id, workflow = %self.tracker.workflow().id, ?mode, "run started");

        match mode {
            RunMode::Local => {
                let adjacency = Adjacency::from_workflow(self.tracker.workflow());
                let mut plan = LocalPlan::new(run_id, order, adjacency);
                match plan.advance(&mut self.tracker)? {
                    Advance::Dispatch(cmd) => {
                        commands.push(cmd);
                        self.active = Some(ActiveRun {
                            run_id,
                            kind: RunKind::Local(plan),
                        });
                    }
                    Advance::Waiting => {
                        self.active = Some(ActiveRun {
                            run_id,
                            kind: RunKind::Local(plan),
                        });
                    }
                    Advance::Finished => {
                        commands.extend(self.exit_if_done());
                    }
                }
            }
            RunMode::Remote(request) => {
                let mut reconciler = StreamReconciler::new(Arc::clone(&self.correlation));
                reconciler.seed(&mut self.tracker)?;
                commands.push(CoreCommand::OpenStream { run_id, request });
                self.active = Some(ActiveRun {
                    run_id,
                    kind: RunKind::Remote(reconciler),
                });
            }
        }

        Ok((run_id, CoreStep::proceed(commands)))
    }

    /// Abort the active run.
    ///
    /// Running and pending nodes become `skipped`; finished nodes keep their
    /// status. Anything the aborted run's executor or stream reports later is
    /// dropped as stale.
    pub fn stop(&mut self) -> Result<CoreStep> {
        if self.active.is_none() {
            return Err(TransitionError::NoActiveExecution.into());
        }

        let mut commands = self.terminate_active();
        let status = self.tracker.stop_execution()?;
        info!(%status, "run stopped");
        commands.extend(self.exit_if_done());
        Ok(CoreStep::proceed(commands))
    }

    /// Tear down any active run and return every node to `idle`.
    pub fn reset(&mut self) -> CoreStep {
        let commands = self.terminate_active();
        self.tracker.reset_execution();
        CoreStep::proceed(commands)
    }

    /// Check the graph and move `draft -> ready`.
    pub fn mark_ready(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(InsightdagError::RunInProgress);
        }
        validate(self.tracker.workflow())?;
        self.tracker.mark_ready()?;
        Ok(())
    }

    /// Apply a graph edit. Rejected while a run is active.
    ///
    /// A successful edit invalidates previous results, so a workflow that
    /// was not a draft is reset back to one.
    pub fn edit(&mut self, edit: GraphEdit) -> Result<EditOutcome> {
        if self.active.is_some() {
            return Err(InsightdagError::RunInProgress);
        }

        let registry = Arc::clone(&self.registry);
        let outcome = apply_edit(self.tracker.workflow_mut(), &registry, edit)?;
        if self.tracker.status() != WorkflowStatus::Draft {
            self.tracker.reset_execution();
        }
        Ok(outcome)
    }

    // ---------------------------------------------------------------------
    // Run progress
    // ---------------------------------------------------------------------

    fn handle_node_finished(&mut self, run_id: RunId, node_id: &str, outcome: NodeOutcome) -> CoreStep {
        let Some(active) = self.active.as_mut().filter(|a| a.run_id == run_id) else {
            debug!(run_id, node = %node_id, "dropping node completion from a stale run");
            return CoreStep::idle();
        };
        let RunKind::Local(plan) = &mut active.kind else {
            warn!(run_id, node = %node_id, "node completion during a remote run; ignoring");
            return CoreStep::idle();
        };

        let progressed = plan
            .finish(&mut self.tracker, node_id, outcome)
            .and_then(|_| plan.advance(&mut self.tracker));

        match progressed {
            Ok(Advance::Dispatch(cmd)) => CoreStep::proceed(vec![cmd]),
            Ok(Advance::Waiting) => CoreStep::idle(),
            Ok(Advance::Finished) => {
                self.active = None;
                CoreStep::proceed(self.exit_if_done().into_iter().collect())
            }
            Err(e) => self.abort_on_fault(e),
        }
    }

    fn handle_stream_event(&mut self, run_id: RunId, event: LogEvent) -> CoreStep {
        let Some(active) = self.active.as_mut().filter(|a| a.run_id == run_id) else {
            debug!(run_id, kind = ?event.kind, "dropping stream event from a stale run");
            return CoreStep::idle();
        };
        let RunKind::Remote(reconciler) = &mut active.kind else {
            warn!(run_id, "stream event during a local run; ignoring");
            return CoreStep::idle();
        };

        match reconciler.apply(&mut self.tracker, event) {
            Ok(Reconciled::Continue) => CoreStep::idle(),
            Ok(_) => self.finish_remote(run_id),
            Err(e) => self.abort_on_fault(e),
        }
    }

    fn handle_stream_ended(&mut self, run_id: RunId, error: StreamError) -> CoreStep {
        let Some(active) = self.active.as_mut().filter(|a| a.run_id == run_id) else {
            debug!(run_id, %error, "dropping stream end from a stale run");
            return CoreStep::idle();
        };
        let RunKind::Remote(reconciler) = &mut active.kind else {
            return CoreStep::idle();
        };

        match reconciler.disconnect(&mut self.tracker, &error) {
            Ok(_) => self.finish_remote(run_id),
            Err(e) => self.abort_on_fault(e),
        }
    }

    fn finish_remote(&mut self, run_id: RunId) -> CoreStep {
        self.active = None;
        let mut commands = vec![CoreCommand::CloseStream { run_id }];
        commands.extend(self.exit_if_done());
        CoreStep::proceed(commands)
    }

    /// Commands that stop whatever the active run has in flight.
    fn terminate_active(&mut self) -> Vec<CoreCommand> {
        match self.active.take() {
            None => Vec::new(),
            Some(ActiveRun {
                run_id,
                kind: RunKind::Local(plan),
            }) => {
                debug!(run_id, in_flight = ?plan.in_flight(), "terminating local run");
                vec![CoreCommand::CancelNode { run_id }]
            }
            Some(ActiveRun {
                run_id,
                kind: RunKind::Remote(_),
            }) => {
                debug!(run_id, "terminating remote run");
                vec![CoreCommand::CloseStream { run_id }]
            }
        }
    }

    /// A tracker transition was rejected mid-run. The run cannot continue
    /// consistently, so it is torn down and the workflow marked failed.
    fn abort_on_fault(&mut self, fault: TransitionError) -> CoreStep {
        error!(error = %fault, "invalid transition during run; aborting run");
        let mut commands = self.terminate_active();
        if self.tracker.status() == WorkflowStatus::Running {
            if let Err(e) = self.tracker.complete_execution(false) {
                error!(error = %e, "could not mark aborted run as failed");
            }
        }
        commands.extend(self.exit_if_done());
        CoreStep::proceed(commands)
    }

    fn exit_if_done(&self) -> Option<CoreCommand> {
        (self.options.exit_when_idle && self.active.is_none()).then_some(CoreCommand::RequestExit)
    }
}

fn respond<T>(reply: Option<tokio::sync::oneshot::Sender<Result<T>>>, result: Result<T>) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}
