// tests/graph_validation.rs

use std::collections::HashMap;
use std::error::Error;

use serde_json::json;

use insightdag::dag;
use insightdag::errors::{GraphError, InsightdagError, NodeFailure};
use insightdag::exec::resolve_inputs;
use insightdag::graph::edit::{add_edge, add_node, remove_edge};
use insightdag::graph::{
    apply_edit, load_workflow, save_workflow, validate, validate_for_run, Edge, EditOutcome,
    GraphEdit, NodeRegistry, Port, Position, Workflow,
};
use insightdag::types::{NodeType, PortDirection};
use insightdag_test_utils::builders::{chain_abc, WorkflowBuilder};
use insightdag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn registry() -> NodeRegistry {
    NodeRegistry::builtin(std::time::Duration::ZERO)
}

#[test]
fn complete_chain_is_valid_for_run() -> TestResult {
    init_tracing();
    let workflow = chain_abc().build();

    validate(&workflow)?;
    validate_for_run(&workflow)?;
    // Three node adds and two edge adds, each a committed edit.
    assert_eq!(workflow.version, 6);
    Ok(())
}

#[test]
fn edge_from_an_input_port_is_a_direction_mismatch() {
    init_tracing();
    let builder = chain_abc();
    let (b, c) = (builder.id("B"), builder.id("C"));
    let mut workflow = builder.build();
    let before = workflow.clone();

    let err = add_edge(&mut workflow, &registry(), (&b, "data"), (&c, "result")).unwrap_err();

    match err {
        InsightdagError::Graph(GraphError::PortDirectionMismatch {
            node_id,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(node_id, b);
            assert_eq!(expected, PortDirection::Output);
            assert_eq!(actual, PortDirection::Input);
        }
        other => panic!("expected PortDirectionMismatch, got {other:?}"),
    }
    assert_eq!(workflow, before);
}

#[test]
fn edge_to_unknown_port_is_rejected() {
    init_tracing();
    let builder = chain_abc();
    let (a, c) = (builder.id("A"), builder.id("C"));
    let mut workflow = builder.build();

    let err = add_edge(&mut workflow, &registry(), (&a, "data"), (&c, "nope")).unwrap_err();

    assert!(
        matches!(err, InsightdagError::Graph(GraphError::UnknownPort { ref port_id, .. }) if port_id == "nope"),
        "{err:?}"
    );
}

#[test]
fn workflow_needs_exactly_one_data_source() {
    init_tracing();
    let none = WorkflowBuilder::new("no-source")
        .node("out", NodeType::Output)
        .build();
    assert_eq!(validate(&none), Err(GraphError::StartNodeCount { found: 0 }));

    let mut one = chain_abc().build();
    let version = one.version;
    let err = add_node(
        &mut one,
        &registry(),
        NodeType::DataSource,
        Position::new(0.0, 300.0),
    )
    .unwrap_err();

    assert!(
        matches!(err, InsightdagError::Graph(GraphError::StartNodeCount { found: 2 })),
        "{err:?}"
    );
    assert_eq!(one.version, version);
    assert_eq!(one.nodes.len(), 3);
}

#[test]
fn data_source_with_inputs_is_rejected() {
    init_tracing();
    let builder = chain_abc();
    let a = builder.id("A");
    let mut workflow = builder.build();
    let source = workflow.nodes.iter_mut().find(|n| n.id == a).unwrap();
    source.ports.push(Port::input("extra", "Extra", false));

    assert_eq!(
        validate(&workflow),
        Err(GraphError::StartNodeHasInputs { node_id: a })
    );
}

#[test]
fn duplicate_node_ids_are_rejected() {
    init_tracing();
    let mut workflow = chain_abc().build();
    let copy = workflow.nodes[1].clone();
    let id = copy.id.clone();
    workflow.nodes.push(copy);

    assert_eq!(
        validate(&workflow),
        Err(GraphError::DuplicateId { kind: "node", id })
    );
}

#[test]
fn dangling_edge_is_rejected() {
    init_tracing();
    let builder = chain_abc();
    let a = builder.id("A");
    let mut workflow = builder.build();
    workflow.edges.push(Edge {
        id: "to-ghost".to_string(),
        source_node_id: a,
        source_port_id: "data".to_string(),
        target_node_id: "ghost".to_string(),
        target_port_id: "data".to_string(),
    });

    assert_eq!(
        validate(&workflow),
        Err(GraphError::DanglingEdge {
            edge_id: "to-ghost".to_string(),
            node_id: "ghost".to_string()
        })
    );
}

#[test]
fn unconnected_required_port_only_fails_for_run() -> TestResult {
    init_tracing();
    let builder = WorkflowBuilder::new("draft")
        .node("src", NodeType::DataSource)
        .node("ai", NodeType::AiAnalysis);
    let ai = builder.id("ai");
    let workflow = builder.build();

    validate(&workflow)?;
    assert_eq!(
        validate_for_run(&workflow),
        Err(GraphError::MissingRequiredPort {
            node_id: ai,
            port_id: "data".to_string()
        })
    );
    Ok(())
}

#[test]
fn unregistered_node_type_cannot_be_added() {
    init_tracing();
    let mut workflow = Workflow::new("empty", "table-1");

    let err = add_node(
        &mut workflow,
        &NodeRegistry::new(),
        NodeType::Transform,
        Position::default(),
    )
    .unwrap_err();

    assert!(
        matches!(err, InsightdagError::Graph(GraphError::UnknownNodeType(NodeType::Transform))),
        "{err:?}"
    );
    assert!(workflow.nodes.is_empty());
}

#[test]
fn edge_closing_a_cycle_is_rejected_atomically() -> TestResult {
    init_tracing();
    let builder = WorkflowBuilder::new("loop")
        .node("src", NodeType::DataSource)
        .node("x", NodeType::Custom)
        .node("y", NodeType::Custom)
        .connect("src", "x")
        .connect("x", "y");
    let (x, y) = (builder.id("x"), builder.id("y"));
    let mut workflow = builder.build();
    let before = workflow.clone();

    let err = add_edge(&mut workflow, &registry(), (&y, "output"), (&x, "input")).unwrap_err();

    match err {
        InsightdagError::Cycle(cycle) => {
            assert_eq!(cycle.nodes, vec![x, y]);
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    assert_eq!(workflow, before);
    assert!(dag::order(&workflow).is_ok());
    Ok(())
}

#[test]
fn removing_a_node_removes_its_edges() -> TestResult {
    init_tracing();
    let builder = chain_abc();
    let b = builder.id("B");
    let mut workflow = builder.build();
    let version = workflow.version;

    let outcome = apply_edit(
        &mut workflow,
        &registry(),
        GraphEdit::RemoveNode { node_id: b.clone() },
    )?;

    let EditOutcome::NodeRemoved(node, removed) = outcome else {
        panic!("expected NodeRemoved");
    };
    assert_eq!(node.id, b);
    assert_eq!(removed.len(), 2);
    assert!(workflow.edges.is_empty());
    assert_eq!(workflow.nodes.len(), 2);
    assert_eq!(workflow.version, version + 1);
    Ok(())
}

#[test]
fn removing_unknown_edge_fails() {
    init_tracing();
    let mut workflow = chain_abc().build();

    let err = apply_edit(
        &mut workflow,
        &registry(),
        GraphEdit::RemoveEdge {
            edge_id: "missing".to_string(),
        },
    )
    .unwrap_err();

    assert!(
        matches!(err, InsightdagError::Graph(GraphError::UnknownEdge(ref id)) if id == "missing"),
        "{err:?}"
    );
}

#[test]
fn workflow_json_round_trips_through_disk() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("workflow.json");
    let workflow = chain_abc().config("B", "operation", json!("dedupe")).build();

    save_workflow(&path, &workflow)?;
    let loaded = load_workflow(&path)?;

    assert_eq!(loaded, workflow);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert!(raw["tableId"].is_string());
    assert_eq!(raw["nodes"][0]["type"], json!("data_source"));
    Ok(())
}

#[test]
fn missing_required_input_fails_the_node() {
    init_tracing();
    let builder = chain_abc();
    let b = builder.id("B");
    let workflow = builder.build();

    let err = resolve_inputs(&workflow, &b, &HashMap::new()).unwrap_err();

    assert_eq!(
        err,
        NodeFailure::MissingInput {
            node_id: b,
            port_id: "data".to_string()
        }
    );
}

#[test]
fn several_edges_into_one_port_merge_in_edge_order() -> TestResult {
    init_tracing();
    let builder = WorkflowBuilder::new("fan-in")
        .node("src", NodeType::DataSource)
        .node("left", NodeType::Transform)
        .node("right", NodeType::Transform)
        .node("merge", NodeType::Custom)
        .connect("src", "left")
        .connect("src", "right")
        .connect("left", "merge")
        .connect("right", "merge");
    let (left, right, merge) = (builder.id("left"), builder.id("right"), builder.id("merge"));
    let workflow = builder.build();

    let outputs = HashMap::from([(left, json!("L")), (right, json!("R"))]);
    let inputs = resolve_inputs(&workflow, &merge, &outputs)?;

    assert_eq!(inputs.get("input"), Some(&json!(["L", "R"])));
    Ok(())
}

#[test]
fn edge_edits_report_what_they_changed() -> TestResult {
    init_tracing();
    let builder = WorkflowBuilder::new("edges")
        .node("src", NodeType::DataSource)
        .node("chart", NodeType::ChartGenerator);
    let (src, chart) = (builder.id("src"), builder.id("chart"));
    let mut workflow = builder.build();
    let version = workflow.version;

    let outcome = apply_edit(
        &mut workflow,
        &registry(),
        GraphEdit::AddEdge {
            source_node_id: src.clone(),
            source_port_id: "data".to_string(),
            target_node_id: chart.clone(),
            target_port_id: "data".to_string(),
        },
    )?;
    let EditOutcome::EdgeAdded(edge) = outcome else {
        panic!("expected EdgeAdded");
    };
    assert_eq!((edge.source_node_id.as_str(), edge.target_node_id.as_str()), (src.as_str(), chart.as_str()));
    assert_eq!(workflow.version, version + 1);

    let removed = remove_edge(&mut workflow, &edge.id)?;
    assert_eq!(removed, edge);
    assert!(workflow.edges.is_empty());
    assert_eq!(workflow.version, version + 2);

    let err = remove_edge(&mut workflow, &edge.id).unwrap_err();
    assert!(matches!(err, InsightdagError::Graph(GraphError::UnknownEdge(_))), "{err:?}");
    assert_eq!(workflow.version, version + 2);
    Ok(())
}
