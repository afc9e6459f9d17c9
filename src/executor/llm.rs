//! LLM node: render prompt, call the Model Client, write output keys and
//! append chat history (spec §4.3 "LLM node").

use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::executor::RuntimeContext;
use crate::graph::LlmNodeConfig;
use crate::message::Message;
use crate::prompt;
use crate::state::State;

/// Execute one LLM node: pre-process, render + call, write output, post-process.
pub async fn execute(
    node_name: &str,
    cfg: &LlmNodeConfig,
    state: &mut State,
    ctx: &RuntimeContext,
) -> Result<()> {
    if let Some(name) = &cfg.pre_process {
        let hook = ctx.registry.require_pre_process(name)?;
        hook(state);
    }

    let templates: Vec<(crate::message::Role, String)> = cfg
        .prompt
        .iter()
        .map(|t| (t.role, t.template.clone()))
        .collect();
    let rendered = prompt::render_messages(&templates, state);
    for message in &rendered {
        state.push_message(message.clone());
    }

    let model = ctx.model(&cfg.model)?;

    let request = crate::adapter::LlmRequest {
        model: cfg.model.clone(),
        system_prompt: None,
        messages: state.chat_history.clone(),
        params: crate::adapter::GenerationParams::default(),
        schema: cfg.structured_output.clone(),
        stream: false,
    };

    let (response_text, output_value): (String, Value) = if let Some(schema) = &cfg.structured_output {
        let (text, value) = model.call_structured(&request, schema).await.map_err(|e| fatal(node_name, e))?;
        (text, value)
    } else {
        let response = model.call(&request).await.map_err(|e| fatal(node_name, e))?;
        if !(200..300).contains(&response.status) {
            return Err(PipelineError::RecordFatal {
                node: node_name.to_string(),
                message: format!("model '{}' returned status {}", cfg.model, response.status),
            });
        }
        (response.text.clone(), Value::String(response.text))
    };

    state.push_message(Message::assistant(response_text.clone()));

    if let Some(name) = &cfg.post_process {
        let hook = ctx.registry.require_post_process(name)?;
        let synthetic = crate::adapter::LlmResponse {
            text: response_text.clone(),
            status: 200,
            metadata: None,
        };
        hook(state, &synthetic);
    }

    write_output_keys(&cfg.output_keys, &output_value, state);
    Ok(())
}

/// Distribute the node's output into its declared output keys: if the value
/// is a JSON object and a key matches one of its top-level fields, that
/// field is written; otherwise every declared key receives the whole value
/// (spec §4.3 "writes the response into declared output keys").
fn write_output_keys(output_keys: &[String], value: &Value, state: &mut State) {
    for key in output_keys {
        if let Value::Object(obj) = value {
            if let Some(field) = obj.get(key) {
                state.set(key.clone(), field.clone());
                continue;
            }
        }
        state.set(key.clone(), value.clone());
    }
}

fn fatal(node: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::ServerDown { .. } => err,
        other => PipelineError::RecordFatal {
            node: node.to_string(),
            message: other.to_string(),
        },
    }
}
