//! MultiLLM node: the same rendered prompt sent to N configured models in
//! parallel, collected into one array-valued output key in declared
//! configuration order (spec §4.3 "MultiLLM node").
//!
//! No single original file owns this shape; grounded in spec §4.3 plus the
//! teacher's `chain.rs` "spawn several, join all" pattern, using
//! `futures::future::join_all` (already a teacher dependency).

use futures::future::join_all;
use serde_json::{json, Value};

use crate::error::Result;
use crate::executor::RuntimeContext;
use crate::graph::MultiLlmNodeConfig;
use crate::prompt;
use crate::state::State;

/// Execute one MultiLLM node. A failed branch becomes a JSON object
/// `{"error": {"kind": ..., "message": ...}}` at its array position
/// (DESIGN.md open-question decision), preserving configuration order and
/// array length. The node itself only fails if every branch fails.
pub async fn execute(cfg: &MultiLlmNodeConfig, state: &mut State, ctx: &RuntimeContext) -> Result<()> {
    let templates: Vec<(crate::message::Role, String)> = cfg
        .prompt
        .iter()
        .map(|t| (t.role, t.template.clone()))
        .collect();
    let rendered = prompt::render_messages(&templates, state);

    let calls = cfg.models.iter().map(|model_name| {
        let rendered = rendered.clone();
        async move {
            let model = ctx.model(model_name)?;
            let request = crate::adapter::LlmRequest {
                model: model_name.clone(),
                system_prompt: None,
                messages: rendered,
                params: crate::adapter::GenerationParams::default(),
                schema: None,
                stream: false,
            };
            model.call(&request).await.map(|r| r.text)
        }
    });

    let results = join_all(calls).await;

    let mut branch_values = Vec::with_capacity(results.len());
    let mut all_failed = true;
    for result in results {
        match result {
            Ok(text) => {
                all_failed = false;
                branch_values.push(Value::String(text));
            }
            Err(e) => {
                branch_values.push(json!({"error": {"kind": format!("{:?}", e.kind()), "message": e.to_string()}}));
            }
        }
    }

    if all_failed {
        return Err(crate::error::PipelineError::RecordFatal {
            node: cfg.output_key.clone(),
            message: "all multi_llm branches failed".to_string(),
        });
    }

    for message in rendered {
        state.push_message(message);
    }
    state.set(cfg.output_key.clone(), Value::Array(branch_values));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;
    use crate::client::{ModelClient, ModelClientConfig};
    use crate::graph::PromptTemplate;
    use crate::registry::FunctionRegistry;
    use reqwest::Client;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn client_for(model_name: &str, response: &str) -> Arc<ModelClient> {
        let adapter: Arc<dyn crate::adapter::ModelAdapter> = Arc::new(MockAdapter::fixed(response));
        let config = ModelClientConfig::new(model_name, vec!["http://unused".into()]);
        Arc::new(ModelClient::new(adapter, Client::new(), config))
    }

    #[tokio::test]
    async fn test_multi_llm_collects_array_in_order() {
        let mut models = HashMap::new();
        models.insert("a".to_string(), client_for("a", "alpha"));
        models.insert("b".to_string(), client_for("b", "beta"));
        let ctx = RuntimeContext {
            models,
            registry: FunctionRegistry::new(),
            subgraphs: HashMap::new(),
            event_handler: None,
        };
        let cfg = MultiLlmNodeConfig {
            models: vec!["a".into(), "b".into()],
            prompt: vec![PromptTemplate { role: crate::message::Role::User, template: "go".into() }],
            output_key: "branches".into(),
        };
        let mut state = State::default();
        execute(&cfg, &mut state, &ctx).await.unwrap();
        let branches = state.get("branches").unwrap().as_array().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0], serde_json::json!("alpha"));
        assert_eq!(branches[1], serde_json::json!("beta"));
    }

    #[tokio::test]
    async fn test_multi_llm_partial_failure_becomes_placeholder() {
        let mut models = HashMap::new();
        models.insert("ok".to_string(), client_for("ok", "fine"));
        let ctx = RuntimeContext {
            models,
            registry: FunctionRegistry::new(),
            subgraphs: HashMap::new(),
            event_handler: None,
        };
        let cfg = MultiLlmNodeConfig {
            models: vec!["ok".into(), "missing".into()],
            prompt: vec![PromptTemplate { role: crate::message::Role::User, template: "go".into() }],
            output_key: "branches".into(),
        };
        let mut state = State::default();
        execute(&cfg, &mut state, &ctx).await.unwrap();
        let branches = state.get("branches").unwrap().as_array().unwrap();
        assert_eq!(branches.len(), 2);
        assert!(branches[1].get("error").is_some());
    }

    #[tokio::test]
    async fn test_multi_llm_all_branches_failing_is_fatal() {
        let ctx = RuntimeContext {
            models: HashMap::new(),
            registry: FunctionRegistry::new(),
            subgraphs: HashMap::new(),
            event_handler: None,
        };
        let cfg = MultiLlmNodeConfig {
            models: vec!["missing".into()],
            prompt: vec![],
            output_key: "branches".into(),
        };
        let mut state = State::default();
        let err = execute(&cfg, &mut state, &ctx).await.unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::RecordFatal { .. }));
    }
}
