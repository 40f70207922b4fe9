//! AuditFlow command-line host
//!
//! Loads a graph file, configures the engine from `auditflow.json` plus
//! `AUDITFLOW_*` environment variables, and prints plans or run results.

mod cli;

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use auditflow_engine::{
    ChannelEventSink, Engine, EngineConfig, ExecutionContext, Graph, Manifest, NodeInputs,
    Registry, RunEvent,
};
use clap::Parser;
use tokio::task::JoinHandle;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(error) = run(Cli::parse()).await {
        log::error!("{:#}", error);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let registry = Arc::new(Registry::with_builtins());
    log::debug!(
        "{} node types registered ({} built in)",
        registry.len(),
        auditflow_nodes::BUILTIN_NODE_TYPES.len()
    );

    match cli.command {
        Command::Nodes { json } => list_nodes(&registry, json),
        Command::Plan { graph } => {
            let graph = read_graph(&graph).await?;
            let engine = Engine::local(registry);
            print_plan(&engine, &graph)
        }
        Command::Run {
            graph,
            inputs,
            mode,
            endpoint,
        } => {
            let mut config = EngineConfig::load(&cli.config)
                .await
                .with_context(|| format!("failed to load config {}", cli.config.display()))?;
            config
                .apply_env_overrides()
                .context("invalid environment override")?;
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if let Some(endpoint) = endpoint {
                config.remote.endpoint = endpoint;
            }

            let graph = read_graph(&graph).await?;
            let initial = match inputs {
                Some(path) => read_json::<NodeInputs>(&path).await?,
                None => NodeInputs::new(),
            };
            let engine = Engine::from_config(registry, &config).context("failed to build engine")?;
            run_graph(&engine, &graph, &initial).await
        }
    }
}

fn list_nodes(registry: &Registry, json: bool) -> anyhow::Result<()> {
    if json {
        let manifests = registry.manifests();
        let manifests: Vec<&Manifest> = manifests.iter().map(|m| m.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(());
    }
    for (category, manifests) in registry.by_category() {
        println!("{:?}", category);
        for manifest in manifests {
            let inputs: Vec<String> = manifest
                .inputs
                .iter()
                .map(|p| format!("{}: {}", p.name, p.port_type))
                .collect();
            let outputs: Vec<String> = manifest
                .outputs
                .iter()
                .map(|p| format!("{}: {}", p.name, p.port_type))
                .collect();
            println!(
                "  {:<20} ({}) -> ({})",
                manifest.node_type,
                inputs.join(", "),
                outputs.join(", ")
            );
        }
    }
    Ok(())
}

fn print_plan(engine: &Engine, graph: &Graph) -> anyhow::Result<()> {
    let report = engine.diagnose(graph);
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    let plan = engine.compile(graph).context("graph does not compile")?;

    for (index, phase) in plan.phases().iter().enumerate() {
        println!(
            "phase {}{}: {}",
            index,
            if phase.parallel { " (parallel)" } else { "" },
            phase.node_ids.join(", ")
        );
    }
    println!("{}", plan.summary());
    Ok(())
}

async fn run_graph(engine: &Engine, graph: &Graph, initial: &NodeInputs) -> anyhow::Result<()> {
    let (sink, mut events) = ChannelEventSink::channel();
    let ctx = ExecutionContext::new(&graph.id).with_event_sink(Arc::new(sink));

    let cancel = ctx.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling after the current phase");
            cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let results = engine.run(graph, initial, &ctx).await;
    drop(ctx);
    join_printer(printer).await;
    let results = results.context("run failed")?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    if !results.is_success() {
        anyhow::bail!(
            "{} of {} nodes failed{}",
            results.failed(),
            results.summary.total_nodes,
            if results.cancelled {
                " (cancelled)"
            } else if results.stopped_on_error {
                " (stopped on error)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

/// Wait for the event printer; false when it panicked or was aborted
async fn join_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Event printer task failed: {}", e);
            false
        }
    }
}

fn log_event(event: &RunEvent) {
    match event {
        RunEvent::NodeFailed { node_id, code, message, .. } => {
            log::warn!("{} failed [{}]: {}", node_id, code, message)
        }
        RunEvent::NodeRetrying { node_id, attempt, delay_ms, .. } => {
            log::info!("{} retrying (attempt {}) in {}ms", node_id, attempt, delay_ms)
        }
        RunEvent::RunStopped { completed_phases, failed, .. } => {
            log::warn!(
                "Run stopped after {} phases: {} failed",
                completed_phases,
                failed.join(", ")
            )
        }
        other => log::debug!("{:?}", other),
    }
}

async fn read_graph(path: &Path) -> anyhow::Result<Graph> {
    let mut graph: Graph = read_json(path).await?;
    if graph.id.is_empty() {
        graph.id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graph".to_string());
    }
    Ok(graph)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_printer_reports_failed_task() {
        assert!(join_printer(tokio::spawn(async {})).await);

        let panicked = tokio::spawn(async {
            panic!("event printer crashed");
        });
        assert!(!join_printer(panicked).await);

        let aborted = tokio::spawn(std::future::pending::<()>());
        aborted.abort();
        assert!(!join_printer(aborted).await);
    }
}
