//! # sygra-core
//!
//! Execution core for graph-oriented synthetic-data generation: a typed
//! node/edge graph, a Model Client that layers retries, load balancing,
//! circuit breaking, and structured-output coercion over a stateless Model
//! Adapter, and a Batch Orchestrator that runs many records through a graph
//! concurrently with checkpointed, in-order output.
//!
//! ## Core concepts
//!
//! - **[`adapter`]** — [`adapter::ModelAdapter`], the vendor wire-protocol
//!   boundary (Ollama, OpenAI-compatible, a test [`adapter::MockAdapter`]).
//! - **[`client`]** — [`client::ModelClient`], the per-model call surface:
//!   retry/backoff, load balancing across URLs, a server-down circuit
//!   breaker, and structured-output coercion.
//! - **[`graph`]** — [`graph::Graph`] construction and validation, plus
//!   [`graph::runtime`] which drives one record through a graph to
//!   completion.
//! - **[`executor`]** — one executor module per node kind (`llm`,
//!   `multi_llm`, `lambda`, `weighted_sampler`, `subgraph`), each a pure
//!   `(config, state) -> state delta` step.
//! - **[`state`]** — per-record [`state::State`]: fields, chat history, and
//!   read-only graph properties.
//! - **[`registry`]** — [`registry::FunctionRegistry`], the compile-time
//!   map from config-referenced function names to lambdas, edge predicates,
//!   and LLM pre/post-process hooks.
//! - **[`orchestrator`]** — [`orchestrator::BatchOrchestrator`]: bounded
//!   worker pool, in-order flush, checkpoint/resume.
//! - **[`config`]** — YAML graph/model config parsing and credential
//!   resolution.
//! - **[`cli`]** — the `sygra` binary's command-line surface.
//! - **[`prompt`]**, **[`message`]**, **[`output_parser`]** — prompt
//!   rendering, chat message types, and response parsing shared across node
//!   executors.
//! - **[`events`]** — optional [`events::EventHandler`] hook for observing
//!   node/edge lifecycle and streaming tokens.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::collections::{HashMap, HashSet};
//! use std::sync::Arc;
//!
//! use reqwest::Client;
//! use sygra_core::config::{build_model_clients, parse_graph_config, RawModelSpec};
//! use sygra_core::executor::RuntimeContext;
//! use sygra_core::graph::Graph;
//! use sygra_core::graph::runtime::run_one;
//! use sygra_core::registry::FunctionRegistry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = FunctionRegistry::new();
//!     let specs: HashMap<String, RawModelSpec> = serde_yaml::from_str(
//!         "chat:\n  model_type: ollama\n  url: \"http://localhost:11434\"\n",
//!     )?;
//!     let loaded = build_model_clients(specs, &registry, Client::new())?;
//!
//!     let (nodes, edges, props, max_steps) = parse_graph_config(
//!         "nodes:\n  ask:\n    node_type: llm\n    model: chat\n    prompt:\n      - role: user\n        content: \"hi\"\n    output_keys: [\"reply\"]\nedges:\n  - from: START\n    to: ask\n  - from: ask\n    to: END\n",
//!     )?;
//!     let known_models: HashSet<String> = loaded.clients.keys().cloned().collect();
//!     let graph = Graph::build("greet", nodes, edges, props, max_steps, &known_models, &registry)?;
//!
//!     let ctx = RuntimeContext {
//!         models: loaded.clients,
//!         registry,
//!         subgraphs: HashMap::new(),
//!         event_handler: None,
//!     };
//!
//!     let outcome = run_one(&graph, HashMap::new(), &ctx).await;
//!     println!("{:?}", outcome.record);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod message;
pub mod orchestrator;
pub mod output_parser;
pub mod prompt;
pub mod registry;
pub mod state;
pub mod streaming;

pub use error::{PipelineError, Result};
