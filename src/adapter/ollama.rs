//! Adapter for Ollama's native API.
//!
//! Translates normalized [`LlmRequest`]s into Ollama's `/api/generate` and
//! `/api/chat` endpoints. Streaming uses NDJSON with `{"response": "token"}`
//! (generate) or `{"message": {"content": "token"}}` (chat) per line.

use super::{GenerationParams, LlmRequest, LlmResponse, ModelAdapter};
use crate::error::Result;
use crate::message::Role;
use crate::streaming::StreamingDecoder;
use crate::PipelineError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

/// Adapter for Ollama's native API.
///
/// # Endpoint selection
///
/// Uses `/api/chat` when a system prompt is set or more than one message is
/// present. Uses `/api/generate` for the common single-user-turn case.
#[derive(Debug, Clone, Copy)]
pub struct OllamaAdapter;

impl OllamaAdapter {
    fn build_options(params: &GenerationParams) -> Value {
        let mut opts = json!({
            "temperature": params.temperature,
            "num_predict": params.max_tokens,
        });
        if let Some(ref custom) = params.options {
            if let (Some(base), Some(extra)) = (opts.as_object_mut(), custom.as_object()) {
                for (k, v) in extra {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        opts
    }

    fn use_chat(request: &LlmRequest) -> bool {
        request
            .system_prompt
            .as_ref()
            .is_some_and(|s| !s.is_empty())
            || request.messages.len() != 1
    }

    fn apply_format(body: &mut Value, request: &LlmRequest) {
        if let Some(ref schema) = request.schema {
            body["format"] = schema.clone();
        } else if request.params.json_mode {
            body["format"] = json!("json");
        }
    }

    fn build_generate_body(request: &LlmRequest, stream: bool) -> Value {
        let prompt = request
            .messages
            .last()
            .map(|m| m.text())
            .unwrap_or_default();
        let mut body = json!({
            "model": request.model,
            "prompt": prompt,
            "stream": stream,
            "options": Self::build_options(&request.params),
        });
        Self::apply_format(&mut body, request);
        body
    }

    fn build_chat_body(request: &LlmRequest, stream: bool) -> Value {
        let mut messages = Vec::new();

        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                messages.push(json!({"role": "system", "content": sys}));
            }
        }

        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            messages.push(json!({"role": role, "content": msg.text()}));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
            "options": Self::build_options(&request.params),
        });
        Self::apply_format(&mut body, request);
        body
    }

    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        if let Ok(secs) = value.trim().parse::<u64>() {
            return Some(std::time::Duration::from_secs(secs));
        }
        None
    }

    async fn send_request(client: &Client, url: &str, body: &Value) -> Result<(Value, u16)> {
        let resp = client.post(url).json(body).send().await.map_err(|e| {
            PipelineError::Other(format!("Failed to connect to LLM at {}: {}", url, e))
        })?;

        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body: text,
                retry_after,
            });
        }

        let json_resp: Value = resp.json().await?;
        Ok((json_resp, status))
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in ["total_duration", "eval_count", "eval_duration", "prompt_eval_count", "model"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    async fn complete(&self, client: &Client, base_url: &str, request: &LlmRequest) -> Result<LlmResponse> {
        let base = base_url.trim_end_matches('/');

        if Self::use_chat(request) {
            let body = Self::build_chat_body(request, false);
            let url = format!("{}/api/chat", base);
            let (json_resp, status) = Self::send_request(client, &url, &body).await?;

            let text = json_resp
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            Ok(LlmResponse {
                text,
                status,
                metadata: Self::extract_metadata(&json_resp),
            })
        } else {
            let body = Self::build_generate_body(request, false);
            let url = format!("{}/api/generate", base);
            let (json_resp, status) = Self::send_request(client, &url, &body).await?;

            let text = json_resp
                .get("response")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            Ok(LlmResponse {
                text,
                status,
                metadata: Self::extract_metadata(&json_resp),
            })
        }
    }

    async fn complete_streaming(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> Result<LlmResponse> {
        let base = base_url.trim_end_matches('/');
        let use_chat = Self::use_chat(request);

        let (url, body) = if use_chat {
            (format!("{}/api/chat", base), Self::build_chat_body(request, true))
        } else {
            (format!("{}/api/generate", base), Self::build_generate_body(request, true))
        };

        let resp = client.post(&url).json(&body).send().await.map_err(|e| {
            PipelineError::Other(format!("Failed to connect to LLM at {}: {}", url, e))
        })?;

        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body: text,
                retry_after,
            });
        }

        let mut stream = resp.bytes_stream();
        let mut decoder = StreamingDecoder::new();
        let mut accumulated = String::new();
        let mut last_metadata = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(PipelineError::Request)?;
            for json_val in decoder.decode(&chunk) {
                let token_str = if use_chat {
                    json_val
                        .get("message")
                        .and_then(|m| m.get("content"))
                        .and_then(|c| c.as_str())
                } else {
                    json_val.get("response").and_then(|r| r.as_str())
                };
                if let Some(t) = token_str {
                    if !t.is_empty() {
                        accumulated.push_str(t);
                        on_token(t.to_string());
                    }
                }
                if json_val.get("done").and_then(|v| v.as_bool()) == Some(true) {
                    last_metadata = Self::extract_metadata(&json_val);
                }
            }
        }

        if let Some(json_val) = decoder.flush() {
            let token_str = if use_chat {
                json_val
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())
            } else {
                json_val.get("response").and_then(|r| r.as_str())
            };
            if let Some(t) = token_str {
                if !t.is_empty() {
                    accumulated.push_str(t);
                    on_token(t.to_string());
                }
            }
            if json_val.get("done").and_then(|v| v.as_bool()) == Some(true) {
                last_metadata = Self::extract_metadata(&json_val);
            }
        }

        Ok(LlmResponse {
            text: accumulated,
            status,
            metadata: last_metadata,
        })
    }

    fn native_structured_output_supported(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn test_request() -> LlmRequest {
        LlmRequest {
            model: "llama3.2".into(),
            system_prompt: None,
            messages: vec![Message::user("Why is the sky blue?")],
            params: GenerationParams::default(),
            schema: None,
            stream: false,
        }
    }

    #[test]
    fn test_ollama_adapter_generate_payload() {
        let request = test_request();
        let body = OllamaAdapter::build_generate_body(&request, false);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "Why is the sky blue?");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.7);
        assert_eq!(body["options"]["num_predict"], 2048);
        assert!(body.get("format").is_none());
    }

    #[test]
    fn test_ollama_adapter_chat_payload() {
        let mut request = test_request();
        request.system_prompt = Some("You are a helpful assistant.".into());

        let body = OllamaAdapter::build_chat_body(&request, false);

        assert_eq!(body["model"], "llama3.2");
        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn test_ollama_adapter_json_mode() {
        let mut request = test_request();
        request.params.json_mode = true;

        let body = OllamaAdapter::build_generate_body(&request, false);
        assert_eq!(body["format"], "json");
    }

    #[test]
    fn test_ollama_adapter_native_schema() {
        let mut request = test_request();
        request.schema = Some(json!({"type": "object", "properties": {}}));

        let body = OllamaAdapter::build_generate_body(&request, false);
        assert_eq!(body["format"]["type"], "object");
    }

    #[test]
    fn test_ollama_adapter_use_chat_logic() {
        let mut request = test_request();
        assert!(!OllamaAdapter::use_chat(&request));

        request.system_prompt = Some("You are helpful.".into());
        assert!(OllamaAdapter::use_chat(&request));

        request.system_prompt = Some(String::new());
        assert!(!OllamaAdapter::use_chat(&request));

        request.system_prompt = None;
        request.messages.push(Message::assistant("4"));
        assert!(OllamaAdapter::use_chat(&request));
    }

    #[test]
    fn test_ollama_adapter_reports_native_structured_output() {
        assert!(OllamaAdapter.native_structured_output_supported());
    }

    #[test]
    fn test_ollama_adapter_chat_with_history() {
        let mut request = test_request();
        request.system_prompt = Some("Be helpful.".into());
        request.messages = vec![
            Message::user("What is 2+2?"),
            Message::assistant("4"),
            Message::user("And 3+3?"),
        ];

        let body = OllamaAdapter::build_chat_body(&request, false);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[3]["content"], "And 3+3?");
    }
}
