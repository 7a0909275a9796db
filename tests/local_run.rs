// tests/local_run.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use insightdag::engine::{RunMode, RuntimeOptions, StoreBuilder};
use insightdag::errors::{GraphError, InsightdagError};
use insightdag::graph::{Edge, GraphEdit, NodeRegistry, Position};
use insightdag::types::{NodeStatus, NodeType, WorkflowStatus};
use insightdag_test_utils::builders::{chain_abc, WorkflowBuilder};
use insightdag_test_utils::fake_executor::{
    BlockingExecutor, FailingExecutor, FakeBackend, RecordingExecutor,
};
use insightdag_test_utils::{init_tracing, wait_for_workflow_status, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn once() -> RuntimeOptions {
    RuntimeOptions {
        exit_when_idle: true,
    }
}

fn registry() -> NodeRegistry {
    NodeRegistry::builtin(Duration::ZERO)
}

#[tokio::test]
async fn chain_runs_in_order_and_passes_outputs_downstream() -> TestResult {
    init_tracing();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::new(RecordingExecutor::new(Arc::clone(&executed)));
    let registry = registry()
        .with_executor(NodeType::DataSource, recorder.clone())
        .with_executor(NodeType::Transform, recorder.clone())
        .with_executor(NodeType::Output, recorder);

    let builder = chain_abc();
    let c = builder.id("C");
    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(registry))
        .options(once())
        .spawn();

    handle.run(RunMode::Local).await?;
    let core = with_timeout(join).await??;

    assert_eq!(*executed.lock().unwrap(), vec!["A", "B", "C"]);
    let snapshot = core.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert!(snapshot.nodes.iter().all(|n| n.status == NodeStatus::Success));

    // C received B's output on its `result` port, which itself wrapped A's.
    let c_output = core.tracker().context().unwrap().node_outputs[&c].clone();
    assert_eq!(c_output["inputs"]["result"]["node"], json!("B"));
    assert_eq!(c_output["inputs"]["result"]["inputs"]["data"]["node"], json!("A"));
    Ok(())
}

#[tokio::test]
async fn failing_middle_node_skips_dependents() -> TestResult {
    init_tracing();
    let registry = registry()
        .with_executor(NodeType::Transform, Arc::new(FailingExecutor::new("bad transform")));

    let builder = chain_abc();
    let (a, b, c) = (builder.id("A"), builder.id("B"), builder.id("C"));
    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(registry))
        .options(once())
        .spawn();

    handle.run(RunMode::Local).await?;
    let core = with_timeout(join).await??;

    let snapshot = core.snapshot();
    assert_eq!(snapshot.node_status(&a), Some(NodeStatus::Success));
    assert_eq!(snapshot.node_status(&b), Some(NodeStatus::Error));
    assert_eq!(snapshot.node_status(&c), Some(NodeStatus::Skipped));
    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.errors.len(), 1);
    assert!(snapshot.errors[0].error.contains("bad transform"));
    Ok(())
}

#[tokio::test]
async fn independent_branch_still_runs_after_a_failure() -> TestResult {
    init_tracing();
    let registry = registry()
        .with_executor(NodeType::AiAnalysis, Arc::new(FailingExecutor::new("model offline")));

    let builder = WorkflowBuilder::new("branches")
        .node("src", NodeType::DataSource)
        .node("ai", NodeType::AiAnalysis)
        .node("chart", NodeType::ChartGenerator)
        .node("insights", NodeType::InsightExtractor)
        .connect("src", "ai")
        .connect("src", "chart")
        .connect("ai", "insights");
    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(registry))
        .options(once())
        .spawn();

    handle.run(RunMode::Local).await?;
    let snapshot = with_timeout(join).await??.snapshot();

    assert_eq!(snapshot.status_by_name("ai"), Some(NodeStatus::Error));
    assert_eq!(snapshot.status_by_name("chart"), Some(NodeStatus::Success));
    assert_eq!(snapshot.status_by_name("insights"), Some(NodeStatus::Skipped));
    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn fake_backend_sees_topological_order() -> TestResult {
    init_tracing();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let exec_clone = Arc::clone(&executed);

    // Created out of dependency order on purpose.
    let builder = WorkflowBuilder::new("diamond")
        .node("out", NodeType::Output)
        .node("merge", NodeType::Custom)
        .node("src", NodeType::DataSource)
        .node("left", NodeType::Transform)
        .node("right", NodeType::ChartGenerator)
        .connect("src", "left")
        .connect("src", "right")
        .connect("left", "merge")
        .connect("right", "merge")
        .connect("merge", "out");

    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(registry()))
        .options(once())
        .spawn_with(move |tx| FakeBackend::new(tx, exec_clone));

    handle.run(RunMode::Local).await?;
    let snapshot = with_timeout(join).await??.snapshot();

    assert_eq!(
        *executed.lock().unwrap(),
        vec!["src", "left", "right", "merge", "out"]
    );
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn cyclic_workflow_is_rejected_before_running() -> TestResult {
    init_tracing();
    let builder = WorkflowBuilder::new("cycle")
        .node("src", NodeType::DataSource)
        .node("x", NodeType::Custom)
        .node("y", NodeType::Custom)
        .connect("src", "x")
        .connect("x", "y");
    let (x, y) = (builder.id("x"), builder.id("y"));
    let mut workflow = builder.build();
    workflow.edges.push(Edge {
        id: "back".to_string(),
        source_node_id: y,
        source_port_id: "output".to_string(),
        target_node_id: x,
        target_port_id: "input".to_string(),
    });

    let (handle, join) = StoreBuilder::new(workflow, Arc::new(registry())).spawn();

    let err = handle.run(RunMode::Local).await.unwrap_err();
    assert!(matches!(err, InsightdagError::Cycle(_)), "{err:?}");

    let snapshot = handle.snapshot().await?;
    assert_eq!(snapshot.status, WorkflowStatus::Draft);
    assert!(snapshot.nodes.iter().all(|n| n.status == NodeStatus::Idle));

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

#[tokio::test]
async fn unconnected_required_port_blocks_the_run() -> TestResult {
    init_tracing();
    let builder = WorkflowBuilder::new("incomplete")
        .node("src", NodeType::DataSource)
        .node("out", NodeType::Output);
    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(registry())).spawn();

    let err = handle.run(RunMode::Local).await.unwrap_err();
    assert!(
        matches!(err, InsightdagError::Graph(GraphError::MissingRequiredPort { .. })),
        "{err:?}"
    );

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

#[tokio::test]
async fn stop_skips_running_node_and_drops_its_late_result() -> TestResult {
    init_tracing();
    let blocking = Arc::new(BlockingExecutor::default());
    let registry = registry().with_executor(NodeType::Transform, blocking.clone());

    let builder = chain_abc();
    let (a, b, c) = (builder.id("A"), builder.id("B"), builder.id("C"));
    let (handle, join) = StoreBuilder::new(builder.build(), Arc::new(registry)).spawn();

    handle.run(RunMode::Local).await?;
    with_timeout(blocking.started.notified()).await;

    handle.stop().await?;
    blocking.release.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = handle.snapshot().await?;
    assert_eq!(snapshot.node_status(&a), Some(NodeStatus::Success));
    assert_eq!(snapshot.node_status(&b), Some(NodeStatus::Skipped));
    assert_eq!(snapshot.node_status(&c), Some(NodeStatus::Skipped));
    assert_eq!(snapshot.status, WorkflowStatus::Draft);

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

#[tokio::test]
async fn edits_are_rejected_while_running_and_reset_finished_runs() -> TestResult {
    init_tracing();
    let blocking = Arc::new(BlockingExecutor::default());
    let registry = registry().with_executor(NodeType::Transform, blocking.clone());

    let (handle, join) = StoreBuilder::new(chain_abc().build(), Arc::new(registry)).spawn();
    let mut events = handle.subscribe();

    handle.run(RunMode::Local).await?;
    with_timeout(blocking.started.notified()).await;

    let add = GraphEdit::AddNode {
        node_type: NodeType::ChartGenerator,
        position: Position::new(10.0, 10.0),
    };
    let err = handle.edit(add.clone()).await.unwrap_err();
    assert!(matches!(err, InsightdagError::RunInProgress), "{err:?}");

    blocking.release.notify_one();
    wait_for_workflow_status(&mut events, WorkflowStatus::Completed).await;

    let before = handle.snapshot().await?;
    handle.edit(add).await?;
    let after = handle.snapshot().await?;

    assert_eq!(after.version, before.version + 1);
    assert_eq!(after.status, WorkflowStatus::Draft);
    assert_eq!(after.nodes.len(), 4);
    assert!(after.nodes.iter().all(|n| n.status == NodeStatus::Idle));

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

#[tokio::test]
async fn new_run_replaces_the_one_in_flight() -> TestResult {
    init_tracing();
    let blocking = Arc::new(BlockingExecutor::default());
    let registry = registry().with_executor(NodeType::Transform, blocking.clone());

    let (handle, join) = StoreBuilder::new(chain_abc().build(), Arc::new(registry)).spawn();
    let mut events = handle.subscribe();

    let first = handle.run(RunMode::Local).await?;
    with_timeout(blocking.started.notified()).await;

    let second = handle.run(RunMode::Local).await?;
    assert!(second > first);
    with_timeout(blocking.started.notified()).await;

    // Only the second run's node is still waiting; release it.
    blocking.release.notify_one();
    wait_for_workflow_status(&mut events, WorkflowStatus::Completed).await;

    let snapshot = handle.snapshot().await?;
    assert!(snapshot.nodes.iter().all(|n| n.status == NodeStatus::Success));

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}

#[tokio::test]
async fn mark_ready_and_reset_round_trip() -> TestResult {
    init_tracing();
    let (handle, join) = StoreBuilder::new(chain_abc().build(), Arc::new(registry())).spawn();

    handle.mark_ready().await?;
    assert_eq!(handle.snapshot().await?.status, WorkflowStatus::Ready);

    handle.reset().await?;
    assert_eq!(handle.snapshot().await?.status, WorkflowStatus::Draft);

    assert!(handle.stop().await.is_err());

    handle.shutdown().await?;
    with_timeout(join).await??;
    Ok(())
}
