// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod stream;
pub mod types;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_or_default, ConfigFile};
use crate::engine::{RunMode, RuntimeOptions, StoreBuilder};
use crate::graph::{load_workflow, validate_for_run, NodeRegistry, Workflow};
use crate::stream::{
    HttpJobClient, JobClient, KeywordCorrelation, NodeCorrelation, ReplayJobClient, RunRequest,
};
use crate::types::WorkflowStatus;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and workflow loading
/// - node registry, correlation strategy and job client
/// - the workflow store runtime
/// - Ctrl-C handling
///
/// A single run is executed; the final snapshot is printed as JSON on stdout.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(args.config.as_deref()).context("loading configuration")?;
    let workflow = load_workflow(&args.workflow)
        .with_context(|| format!("loading workflow {}", args.workflow.display()))?;

    if args.dry_run {
        return print_dry_run(&workflow);
    }

    let registry = Arc::new(NodeRegistry::builtin(cfg.simulated_delay()));
    let (mode, job_client) = run_mode(&args, &cfg, &workflow)?;

    let mut builder = StoreBuilder::new(workflow, registry)
        .correlation(correlation_from_config(&cfg))
        .options(RuntimeOptions {
            exit_when_idle: true,
        })
        .event_buffer(cfg.event_buffer())
        .stream_idle_timeout(cfg.stream_idle_timeout());
    if let Some(client) = job_client {
        builder = builder.job_client(client);
    }

    let (handle, join) = builder.spawn();

    // Ctrl-C → graceful shutdown.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = handle.shutdown().await;
        });
    }

    if let Err(e) = handle.run(mode).await {
        let _ = handle.shutdown().await;
        let _ = join.await;
        return Err(e).context("workflow could not start");
    }

    let core = join.await.context("runtime task panicked")??;
    let snapshot = core.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    info!(status = %snapshot.status, "workflow finished");
    if snapshot.status == WorkflowStatus::Failed {
        bail!("workflow finished with status failed");
    }
    Ok(())
}

fn run_mode(
    args: &CliArgs,
    cfg: &ConfigFile,
    workflow: &Workflow,
) -> Result<(RunMode, Option<Arc<dyn JobClient>>)> {
    let client: Arc<dyn JobClient> = match (&args.replay, args.remote) {
        (Some(path), _) => Arc::new(ReplayJobClient::new(path)),
        (None, true) => {
            let Some(endpoint) = cfg.endpoint() else {
                bail!("--remote needs [remote].endpoint in the config file");
            };
            Arc::new(HttpJobClient::new(endpoint))
        }
        (None, false) => return Ok((RunMode::Local, None)),
    };

    let table = args
        .table_asset_id
        .clone()
        .unwrap_or_else(|| workflow.table_id.clone());
    let mut request = RunRequest::new(table, cfg.workflow_type());
    if let Some(intent) = &args.intent {
        request = request.with_intent(intent.clone());
    }
    debug!(?request, "remote run request");

    Ok((RunMode::Remote(request), Some(client)))
}

fn correlation_from_config(cfg: &ConfigFile) -> Arc<dyn NodeCorrelation> {
    match cfg.keywords() {
        Some(bindings) => Arc::new(KeywordCorrelation::new(
            bindings.iter().map(|(k, t)| (k.clone(), *t)),
        )),
        None => Arc::new(KeywordCorrelation::builtin()),
    }
}

/// Validate and print the execution order without running anything.
fn print_dry_run(workflow: &Workflow) -> Result<()> {
    validate_for_run(workflow)?;
    let order = dag::order(workflow)?;

    println!("insightdag dry-run");
    println!("  workflow: {} ({})", workflow.name, workflow.id);
    println!("  table: {}", workflow.table_id);
    println!("  version: {}", workflow.version);
    println!();

    println!("execution order ({} nodes):", order.len());
    for (i, id) in order.iter().enumerate() {
        if let Some(node) = workflow.node(id) {
            println!("  {:>2}. {} [{}] {}", i + 1, node.name, node.node_type, node.id);
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
