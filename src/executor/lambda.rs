//! Lambda node: resolves a named function from the [`FunctionRegistry`],
//! calls it with `(config, state)`, and merges the result into state
//! (spec §4.3 "Lambda node").

use std::time::Instant;

use serde_json::json;

use crate::error::{PipelineError, Result};
use crate::executor::RuntimeContext;
use crate::graph::LambdaNodeConfig;
use crate::state::State;

/// Execute one Lambda node, recording elapsed time and success as node
/// metadata under `graph_properties.node_meta.<node_name>`.
pub async fn execute(
    node_name: &str,
    cfg: &LambdaNodeConfig,
    state: &mut State,
    ctx: &RuntimeContext,
) -> Result<()> {
    let function = ctx.registry.require_lambda(&cfg.function)?;
    let started = Instant::now();
    let result = function.call(&cfg.params, state).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    record_node_meta(state, node_name, elapsed_ms, result.is_ok());

    match result {
        Ok(updates) => {
            state.merge(updates);
            Ok(())
        }
        Err(e) => Err(PipelineError::RecordFatal {
            node: node_name.to_string(),
            message: e.to_string(),
        }),
    }
}

fn record_node_meta(state: &mut State, node_name: &str, elapsed_ms: u64, success: bool) {
    if !state.graph_properties.is_object() {
        state.graph_properties = json!({});
    }
    let props = state.graph_properties.as_object_mut().expect("just ensured object");
    let node_meta = props
        .entry("node_meta")
        .or_insert_with(|| json!({}));
    if let Some(obj) = node_meta.as_object_mut() {
        obj.insert(
            node_name.to_string(),
            json!({"elapsed_ms": elapsed_ms, "success": success}),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FunctionRegistry, SyncLambda};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn empty_ctx(registry: FunctionRegistry) -> RuntimeContext {
        RuntimeContext {
            models: HashMap::new(),
            registry,
            subgraphs: HashMap::new(),
            event_handler: None,
        }
    }

    #[tokio::test]
    async fn test_lambda_merges_output_and_records_meta() {
        let mut registry = FunctionRegistry::new();
        registry.register_lambda(
            "add_greeting",
            Arc::new(SyncLambda(|_c: &Value, _s: &State| {
                let mut out = HashMap::new();
                out.insert("greeting".to_string(), Value::String("hi".into()));
                Ok(out)
            })),
        );
        let ctx = empty_ctx(registry);
        let cfg = LambdaNodeConfig { function: "add_greeting".into(), params: Value::Null };
        let mut state = State::default();
        execute("greet", &cfg, &mut state, &ctx).await.unwrap();
        assert_eq!(state.get_str("greeting"), Some("hi"));
        let meta = &state.graph_properties["node_meta"]["greet"];
        assert_eq!(meta["success"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_lambda_error_becomes_record_fatal() {
        let mut registry = FunctionRegistry::new();
        registry.register_lambda(
            "boom",
            Arc::new(SyncLambda(|_c: &Value, _s: &State| {
                Err(crate::error::PipelineError::Other("kaboom".into()))
            })),
        );
        let ctx = empty_ctx(registry);
        let cfg = LambdaNodeConfig { function: "boom".into(), params: Value::Null };
        let mut state = State::default();
        let err = execute("boomnode", &cfg, &mut state, &ctx).await.unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::RecordFatal { .. }));
        assert_eq!(state.graph_properties["node_meta"]["boomnode"]["success"], Value::Bool(false));
    }
}
