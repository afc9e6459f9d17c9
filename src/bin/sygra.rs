//! Batch orchestrator binary: load a task's graph/model config, run it over
//! a batch of input records, write results and a checkpoint.
//!
//! No teacher analog — the teacher ships as a library with no binary.
//! Grounded in `elevatelaw-prompt-scaler`'s `main.rs` for the
//! `tracing-subscriber` `EnvFilter`/`fmt` setup and `anyhow::Result<()>`
//! entry-point shape.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{filter::Directive, EnvFilter};

use sygra_core::cli::{exit_code, Cli, DEFAULT_FAILURE_THRESHOLD};
use sygra_core::config::{build_model_clients, parse_graph_config};
use sygra_core::executor::RuntimeContext;
use sygra_core::graph::Graph;
use sygra_core::orchestrator::checkpoint::FileCheckpoint;
use sygra_core::orchestrator::{BatchOrchestrator, CancellationFlag, JsonlSink};
use sygra_core::registry::FunctionRegistry;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "fatal error");
            std::process::exit(exit_code::ABORT);
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let directive =
        Directive::from_str(default_directive).expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// A task is a directory `tasks/<name>/` containing `graph_config.yaml` and
/// `models.yaml`. Functions referenced by the graph (lambdas, predicates,
/// pre/post-process hooks, text transforms) must already be registered by
/// the embedder; this binary ships with an empty registry, matching the
/// crate's role as a library consumed by a task-specific embedder binary in
/// production (see DESIGN.md).
async fn run(cli: Cli) -> anyhow::Result<i32> {
    let task_dir = Path::new("tasks").join(&cli.task);
    let graph_yaml = std::fs::read_to_string(task_dir.join("graph_config.yaml"))?;
    let models_yaml = std::fs::read_to_string(task_dir.join("models.yaml"))?;

    let registry = FunctionRegistry::new();
    let model_specs: HashMap<String, sygra_core::config::RawModelSpec> =
        serde_yaml::from_str(&models_yaml)?;
    let loaded = build_model_clients(model_specs, &registry, Client::new())?;

    let (nodes, edges, graph_properties, max_steps) = parse_graph_config(&graph_yaml)?;
    let known_models: std::collections::HashSet<String> = loaded.clients.keys().cloned().collect();
    let graph = Arc::new(Graph::build(
        cli.task.clone(),
        nodes,
        edges,
        graph_properties,
        max_steps,
        &known_models,
        &registry,
    )?);

    let ctx = Arc::new(RuntimeContext {
        models: loaded.clients,
        registry,
        subgraphs: HashMap::new(),
        event_handler: None,
    });

    let orchestrator = BatchOrchestrator::new(graph, ctx)
        .with_batch_size(cli.batch_size)
        .with_checkpoint_interval(cli.checkpoint_interval);

    if let Err(e) = orchestrator.ping_all_models().await {
        error!(error = %e, "startup model ping failed, aborting batch");
        return Ok(exit_code::ABORT);
    }

    std::fs::create_dir_all(&cli.output_dir)?;
    let checkpoint = FileCheckpoint::new(cli.output_dir.join(format!("{}.checkpoint.json", cli.run_name)));

    let start_index = if cli.resume {
        match checkpoint.read()? {
            Some(data) => (data.last_completed_index + 1) as usize,
            None => cli.start_index,
        }
    } else {
        cli.start_index
    };

    let records: Vec<HashMap<String, Value>> = (start_index..start_index + cli.num_records)
        .map(|i| {
            let mut record = HashMap::new();
            record.insert("id".to_string(), Value::String(i.to_string()));
            record
        })
        .collect();

    let output_path = cli.output_dir.join(format!("{}.jsonl", cli.run_name));
    let file = if cli.resume {
        std::fs::OpenOptions::new().create(true).append(true).open(&output_path)?
    } else {
        File::create(&output_path)?
    };
    let mut sink = JsonlSink::new(BufWriter::new(file));

    let summary = orchestrator
        .run(records, start_index, cli.run_name.clone(), &mut sink, &checkpoint, CancellationFlag::new())
        .await?;

    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "run finished"
    );

    if summary.failure_rate() > DEFAULT_FAILURE_THRESHOLD {
        Ok(exit_code::PARTIAL_FAILURE)
    } else {
        Ok(exit_code::SUCCESS)
    }
}
