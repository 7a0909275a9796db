// tests/stream_reconcile.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde_json::json;

use insightdag::engine::{EventBus, ExecutionTracker, RunMode, RuntimeOptions, StoreBuilder};
use insightdag::errors::StreamError;
use insightdag::graph::NodeRegistry;
use insightdag::stream::{
    EventStream, JobClient, KeywordCorrelation, LogEvent, Reconciled, RunRequest, StreamReconciler,
};
use insightdag::types::{NodeStatus, NodeType, WorkflowStatus};
use insightdag_test_utils::builders::{profile_and_insights, WorkflowBuilder};
use insightdag_test_utils::job_client::{send_all, ChannelJobClient};
use insightdag_test_utils::{init_tracing, wait_for_workflow_status, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn started(builder: WorkflowBuilder) -> Result<(ExecutionTracker, StreamReconciler), Box<dyn Error>> {
    let mut tracker = ExecutionTracker::new(builder.build(), EventBus::default());
    tracker.mark_ready()?;
    tracker.start_execution()?;
    let mut reconciler = StreamReconciler::new(Arc::new(KeywordCorrelation::builtin()));
    reconciler.seed(&mut tracker)?;
    Ok((tracker, reconciler))
}

#[test]
fn fixed_sequence_completes_both_nodes() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let (profile, insights) = (builder.id("profile_table"), builder.id("generate_insights"));
    let (mut tracker, mut reconciler) = started(builder)?;

    let events = [
        LogEvent::log("profile_table started"),
        LogEvent::progress(40.0),
        LogEvent::log("generate_insights started"),
        LogEvent::complete(None),
    ];
    let mut last = Reconciled::Continue;
    for event in events {
        last = reconciler.apply(&mut tracker, event)?;
    }

    assert_eq!(last, Reconciled::Completed);
    assert_eq!(tracker.node_status(&profile), Some(NodeStatus::Success));
    assert_eq!(tracker.node_status(&insights), Some(NodeStatus::Success));
    assert_eq!(tracker.status(), WorkflowStatus::Completed);
    assert_eq!(tracker.log().len(), 4);
    Ok(())
}

#[test]
fn keyword_moves_current_node_and_settles_previous() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let (profile, insights) = (builder.id("profile_table"), builder.id("generate_insights"));
    let (mut tracker, mut reconciler) = started(builder)?;

    assert_eq!(reconciler.current_node_id(), Some(profile.as_str()));
    assert_eq!(tracker.node_status(&profile), Some(NodeStatus::Running));

    reconciler.apply(&mut tracker, LogEvent::log("Running generate_insights on 1200 rows"))?;

    assert_eq!(tracker.node_status(&profile), Some(NodeStatus::Success));
    assert_eq!(tracker.node_status(&insights), Some(NodeStatus::Running));
    assert_eq!(reconciler.current_node_id(), Some(insights.as_str()));
    Ok(())
}

#[test]
fn progress_is_attached_to_current_node_without_state_change() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let profile = builder.id("profile_table");
    let (mut tracker, mut reconciler) = started(builder)?;

    reconciler.apply(&mut tracker, LogEvent::progress(40.0))?;

    let snapshot = tracker.snapshot();
    let node = snapshot.nodes.iter().find(|n| n.id == profile).unwrap();
    assert_eq!(node.status, NodeStatus::Running);
    assert_eq!(node.progress, Some(40.0));
    Ok(())
}

#[test]
fn unmatched_and_status_events_only_reach_the_log() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let insights = builder.id("generate_insights");
    let (mut tracker, mut reconciler) = started(builder)?;
    let before = tracker.snapshot();

    reconciler.apply(&mut tracker, LogEvent::log("warming up the cluster"))?;
    reconciler.apply(&mut tracker, LogEvent::status("queued"))?;

    assert_eq!(tracker.log().len(), 2);
    assert_eq!(tracker.node_status(&insights), Some(NodeStatus::Pending));
    assert_eq!(tracker.snapshot().nodes, before.nodes);
    Ok(())
}

#[test]
fn error_event_fails_current_node_and_workflow() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let (profile, insights) = (builder.id("profile_table"), builder.id("generate_insights"));
    let (mut tracker, mut reconciler) = started(builder)?;

    let outcome = reconciler.apply(&mut tracker, LogEvent::error("table not found"))?;

    assert_eq!(outcome, Reconciled::Failed);
    let node = tracker.workflow().node(&profile).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(node.error.as_deref(), Some("table not found"));
    assert_eq!(tracker.node_status(&insights), Some(NodeStatus::Skipped));
    assert_eq!(tracker.status(), WorkflowStatus::Failed);
    Ok(())
}

#[test]
fn complete_stores_final_result() -> TestResult {
    init_tracing();
    let (mut tracker, mut reconciler) = started(profile_and_insights())?;

    reconciler.apply(&mut tracker, LogEvent::complete(Some(json!({"insights": 3}))))?;

    assert_eq!(tracker.final_result(), Some(&json!({"insights": 3})));
    assert_eq!(tracker.status(), WorkflowStatus::Completed);
    Ok(())
}

#[test]
fn custom_keywords_replace_builtin_table() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let insights = builder.id("generate_insights");
    let mut tracker = ExecutionTracker::new(builder.build(), EventBus::default());
    tracker.mark_ready()?;
    tracker.start_execution()?;
    let correlation = KeywordCorrelation::new([("summarise", NodeType::InsightExtractor)]);
    let mut reconciler = StreamReconciler::new(Arc::new(correlation));
    reconciler.seed(&mut tracker)?;

    reconciler.apply(&mut tracker, LogEvent::log("generate_insights started"))?;
    assert_eq!(tracker.node_status(&insights), Some(NodeStatus::Pending));

    reconciler.apply(&mut tracker, LogEvent::log("SUMMARISE step"))?;
    assert_eq!(tracker.node_status(&insights), Some(NodeStatus::Running));
    Ok(())
}

fn remote_request() -> RunMode {
    RunMode::Remote(RunRequest::new("table-1", "full_analysis").with_intent("find outliers"))
}

#[tokio::test]
async fn runtime_follows_remote_stream_to_completion() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let (profile, insights) = (builder.id("profile_table"), builder.id("generate_insights"));
    let (client, tx) = ChannelJobClient::new();
    let requests = client.requests();

    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(NodeRegistry::builtin(Duration::ZERO)))
        .job_client(Arc::new(client))
        .options(RuntimeOptions {
            exit_when_idle: true,
        })
        .spawn();

    handle.run(remote_request()).await?;
    send_all(
        &tx,
        [
            LogEvent::log("profile_table started"),
            LogEvent::progress(40.0),
            LogEvent::log("generate_insights started"),
            LogEvent::complete(Some(json!({"ok": true}))),
        ],
    );

    let core = with_timeout(join).await??;
    let snapshot = core.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.node_status(&profile), Some(NodeStatus::Success));
    assert_eq!(snapshot.node_status(&insights), Some(NodeStatus::Success));
    assert_eq!(snapshot.final_result, Some(json!({"ok": true})));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_intent.as_deref(), Some("find outliers"));
    Ok(())
}

#[tokio::test]
async fn stream_ending_without_terminal_event_fails_the_run() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let profile = builder.id("profile_table");
    let (client, tx) = ChannelJobClient::new();

    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(NodeRegistry::builtin(Duration::ZERO)))
        .job_client(Arc::new(client))
        .options(RuntimeOptions {
            exit_when_idle: true,
        })
        .spawn();

    handle.run(remote_request()).await?;
    send_all(&tx, [LogEvent::log("profile_table started")]);
    drop(tx);

    let core = with_timeout(join).await??;
    let snapshot = core.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    let node = snapshot.nodes.iter().find(|n| n.id == profile).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert!(node.error.as_deref().unwrap().contains("disconnected"));
    Ok(())
}

#[tokio::test]
async fn transport_error_fails_the_run() -> TestResult {
    init_tracing();
    let (client, tx) = ChannelJobClient::new();

    let (handle, join) = StoreBuilder::new(profile_and_insights().build(), Arc::new(NodeRegistry::builtin(Duration::ZERO)))
        .job_client(Arc::new(client))
        .options(RuntimeOptions {
            exit_when_idle: true,
        })
        .spawn();

    handle.run(remote_request()).await?;
    tx.send(Err(StreamError::Transport("connection reset".into())))?;

    let core = with_timeout(join).await??;
    assert_eq!(core.snapshot().status, WorkflowStatus::Failed);
    assert_eq!(core.snapshot().errors.len(), 1);
    Ok(())
}

#[tokio::test]
async fn silent_stream_times_out() -> TestResult {
    init_tracing();
    let (client, _tx) = ChannelJobClient::new();

    let (handle, join) = StoreBuilder::new(profile_and_insights().build(), Arc::new(NodeRegistry::builtin(Duration::ZERO)))
        .job_client(Arc::new(client))
        .stream_idle_timeout(Duration::from_millis(50))
        .options(RuntimeOptions {
            exit_when_idle: true,
        })
        .spawn();

    handle.run(remote_request()).await?;

    let core = with_timeout(join).await??;
    let snapshot = core.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.errors.len(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_closes_stream_and_ignores_late_events() -> TestResult {
    init_tracing();
    let builder = profile_and_insights();
    let profile = builder.id("profile_table");
    let (client, tx) = ChannelJobClient::new();

    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(NodeRegistry::builtin(Duration::ZERO)))
        .job_client(Arc::new(client))
        .spawn();
    let mut events = handle.subscribe();

    handle.run(remote_request()).await?;
    assert_eq!(handle.snapshot().await?.node_status(&profile), Some(NodeStatus::Running));

    handle.stop().await?;
    let stopped = handle.snapshot().await?;
    assert_eq!(stopped.node_status(&profile), Some(NodeStatus::Skipped));
    assert_eq!(stopped.status, WorkflowStatus::Draft);

    // The subscription is closed; these must not change anything.
    let _ = tx.send(Ok(LogEvent::log("generate_insights started")));
    let _ = tx.send(Ok(LogEvent::complete(None)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.snapshot().await?, stopped);
    while let Ok(event) = events.try_recv() {
        if let insightdag::engine::TrackerEvent::WorkflowStatusChanged { to, .. } = event {
            assert_ne!(to, WorkflowStatus::Completed);
        }
    }

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

#[tokio::test]
async fn remote_run_without_job_client_fails() -> TestResult {
    init_tracing();
    let (handle, join) = StoreBuilder::new(profile_and_insights().build(), Arc::new(NodeRegistry::builtin(Duration::ZERO)))
        .spawn();
    let mut events = handle.subscribe();

    handle.run(remote_request()).await?;
    wait_for_workflow_status(&mut events, WorkflowStatus::Failed).await;

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

/// A job that never finishes and never goes quiet.
struct EndlessStatusClient;

impl JobClient for EndlessStatusClient {
    fn start_job(&self, _request: RunRequest) -> BoxFuture<'_, Result<EventStream, StreamError>> {
        Box::pin(async { Ok(stream::repeat_with(|| Ok(LogEvent::status("tick"))).boxed()) })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_is_answered_while_a_busy_stream_fills_the_channel() -> TestResult {
    init_tracing();

    for _ in 0..5 {
        let (handle, join) = StoreBuilder::new(
            profile_and_insights().build(),
            Arc::new(NodeRegistry::builtin(Duration::ZERO)),
        )
        .job_client(Arc::new(EndlessStatusClient))
        .event_buffer(1)
        .spawn();

        handle.run(remote_request()).await?;

        let pollers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        if handle.snapshot().await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        with_timeout(handle.stop()).await?;
        let stopped = with_timeout(handle.snapshot()).await?;
        assert_eq!(stopped.status, WorkflowStatus::Draft);
        assert!(stopped.nodes.iter().all(|n| n.status == NodeStatus::Skipped));

        for poller in pollers {
            with_timeout(poller).await?;
        }
        handle.shutdown().await?;
        with_timeout(join).await??;
    }
    Ok(())
}
