//! Subgraph node: runs a named nested [`Graph`](crate::graph::Graph) as an
//! opaque Lambda-equivalent step (spec §4.3 "Agent/Subgraph nodes").

use crate::error::{PipelineError, Result};
use crate::executor::RuntimeContext;
use crate::graph::SubgraphNodeConfig;
use crate::state::State;

/// Execute a subgraph: run the nested graph to completion against a copy
/// of the current record fields, then merge whatever fields it produced
/// back into the parent state. The subgraph's own chat history does not
/// leak into the parent's — it is a sibling run, not a continuation.
pub async fn execute(
    node_name: &str,
    cfg: &SubgraphNodeConfig,
    state: &mut State,
    ctx: &RuntimeContext,
) -> Result<()> {
    let subgraph = ctx.subgraphs.get(&cfg.graph).ok_or_else(|| PipelineError::InvalidConfig(format!(
        "subgraph node '{node_name}' references unknown graph '{}'",
        cfg.graph
    )))?;

    let outcome = crate::graph::runtime::run_one(subgraph, state.fields.clone(), ctx).await;
    match outcome.error {
        Some(record_error) => Err(PipelineError::RecordFatal {
            node: node_name.to_string(),
            message: format!("subgraph '{}' failed: {}", cfg.graph, record_error.message),
        }),
        None => {
            state.merge(outcome.record);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeTarget, Graph, LambdaNodeConfig, NodeKind, NodeSpec, END, START};
    use crate::registry::{FunctionRegistry, SyncLambda};
    use serde_json::{json, Value};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_subgraph_merges_output_into_parent() {
        let mut registry = FunctionRegistry::new();
        registry.register_lambda(
            "set_flag",
            Arc::new(SyncLambda(|_c: &Value, _s: &State| {
                let mut out = HashMap::new();
                out.insert("flag".to_string(), json!(true));
                Ok(out)
            })),
        );
        let nodes = vec![NodeSpec {
            name: "inner".into(),
            kind: NodeKind::Lambda(LambdaNodeConfig { function: "set_flag".into(), params: Value::Null }),
        }];
        let edges = vec![
            Edge { from: START.into(), target: EdgeTarget::Direct { to: "inner".into() } },
            Edge { from: "inner".into(), target: EdgeTarget::Direct { to: END.into() } },
        ];
        let inner_graph = Graph::build("inner_graph", nodes, edges, Value::Null, 10, &HashSet::new(), &registry).unwrap();

        let mut subgraphs = HashMap::new();
        subgraphs.insert("inner_graph".to_string(), Arc::new(inner_graph));
        let ctx = RuntimeContext { models: HashMap::new(), registry, subgraphs, event_handler: None };

        let cfg = SubgraphNodeConfig { graph: "inner_graph".into() };
        let mut state = State::default();
        state.set("id", json!("r1"));
        execute("sub", &cfg, &mut state, &ctx).await.unwrap();
        assert_eq!(state.get("flag"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_subgraph_unknown_graph_is_invalid_config() {
        let ctx = RuntimeContext {
            models: HashMap::new(),
            registry: FunctionRegistry::new(),
            subgraphs: HashMap::new(),
            event_handler: None,
        };
        let cfg = SubgraphNodeConfig { graph: "ghost".into() };
        let mut state = State::default();
        let err = execute("sub", &cfg, &mut state, &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
