//! Node Executor layer: one small state-machine step per node type,
//! `(config, state) -> state_delta` (spec §4.3).
//!
//! No teacher analog — the teacher has no node concept. Grounded in
//! `sygra/core/graph/nodes/node_utils.py` / `lambda_node.py` in the original
//! Python source for the `(config, state) -> state_delta` shape; `llm.rs`
//! additionally reuses the teacher's `prompt::render` substitution style and
//! `llm_call.rs`'s retry-then-correct prompt-building pattern, now driving a
//! [`ModelClient`](crate::client::ModelClient) instead of a raw `Backend`.

pub mod lambda;
pub mod llm;
pub mod multi_llm;
pub mod subgraph;
pub mod weighted_sampler;

use std::collections::HashMap;
use std::sync::Arc;

use crate::client::ModelClient;
use crate::error::{PipelineError, Result};
use crate::events::{self, Event, EventHandler};
use crate::graph::{Graph, NodeKind, NodeSpec};
use crate::registry::FunctionRegistry;
use crate::state::State;

/// Everything a node executor needs besides its own config and the record's
/// `State`: the model clients a graph may call into, the function registry
/// for lambdas/predicates/hooks, and sibling graphs for subgraph nodes.
#[derive(Default)]
pub struct RuntimeContext {
    pub models: HashMap<String, Arc<ModelClient>>,
    pub registry: FunctionRegistry,
    pub subgraphs: HashMap<String, Arc<Graph>>,
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl RuntimeContext {
    pub fn model(&self, name: &str) -> Result<&Arc<ModelClient>> {
        self.models.get(name).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("reference to unknown model '{name}'"))
        })
    }
}

/// Dispatch one node's body against `state`, merging its output into `state`
/// in place. Emits `NodeStart`/`NodeEnd` around the call. Returns
/// `Err(RecordFatal)` (or a propagated transport error for an LLM node
/// outside the retry budget) on failure — callers translate that into the
/// record-level fatal per spec §7.
pub async fn execute_node(
    node: &NodeSpec,
    record_id: &str,
    state: &mut State,
    ctx: &RuntimeContext,
) -> Result<()> {
    events::emit(
        &ctx.event_handler,
        Event::NodeStart { record_id: record_id.to_string(), node: node.name.clone() },
    );

    let result = match &node.kind {
        NodeKind::Llm(cfg) => llm::execute(&node.name, cfg, state, ctx).await,
        NodeKind::MultiLlm(cfg) => multi_llm::execute(cfg, state, ctx).await,
        NodeKind::Lambda(cfg) => lambda::execute(&node.name, cfg, state, ctx).await,
        NodeKind::WeightedSampler(cfg) => weighted_sampler::execute(cfg, state),
        NodeKind::Subgraph(cfg) => subgraph::execute(&node.name, cfg, state, ctx).await,
    };

    events::emit(
        &ctx.event_handler,
        Event::NodeEnd { record_id: record_id.to_string(), node: node.name.clone(), ok: result.is_ok() },
    );

    result
}
