//! Model Adapter layer: one vendor's wire protocol per implementation.
//!
//! [`ModelAdapter`] generalizes the teacher's `backend::Backend` trait. Each
//! adapter still owns build-request/parse-response internally inside
//! `complete`/`complete_streaming` (as the teacher's `OllamaBackend`/
//! `OpenAiBackend` already did), and additionally reports whether it can honor
//! a JSON schema natively via `native_structured_output_supported`. Adapters
//! are stateless (or hold only immutable config) so one instance serves every
//! call for a given (vendor, model) pair — the [`ModelClient`](crate::client::ModelClient)
//! owns per-model mutable state (load balancing, stats, circuit breaker).

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod sse;

pub use mock::MockAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

/// Generation parameters shared by every vendor. Vendor-specific knobs travel
/// in `options` and are merged by each adapter the way it sees fit (mirrors
/// the teacher's `LlmConfig`/`merge_custom_options`).
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub json_mode: bool,
    pub options: Option<Value>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            json_mode: false,
            options: None,
        }
    }
}

/// A normalized LLM request, vendor-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier as understood by the vendor (e.g. `"llama3.2:3b"`, `"gpt-4o"`).
    pub model: String,
    /// System prompt, if any.
    pub system_prompt: Option<String>,
    /// Full message history, oldest first. The final element is the active turn.
    pub messages: Vec<crate::message::Message>,
    /// Generation parameters.
    pub params: GenerationParams,
    /// JSON schema for structured output, if the caller configured one and the
    /// adapter is being asked to attempt a native guided-decoding call.
    pub schema: Option<Value>,
    /// Whether to use the streaming endpoint.
    pub stream: bool,
}

/// A normalized LLM response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub status: u16,
    /// Provider-specific metadata (token counts, timing, model info), raw JSON.
    pub metadata: Option<Value>,
}

/// Abstraction over LLM vendor wire protocols.
///
/// Object-safe; used as `Arc<dyn ModelAdapter>` by the Model Client, one
/// instance per (vendor, model) pair, shared across calls and workers.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Execute a non-streaming call against one URL.
    async fn complete(&self, client: &Client, base_url: &str, request: &LlmRequest) -> Result<LlmResponse>;

    /// Execute a streaming call, invoking `on_token` for each token as it arrives.
    async fn complete_streaming(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> Result<LlmResponse>;

    /// Whether `complete`/`complete_streaming` honor `request.schema` via a
    /// vendor-native guided-decoding mechanism. `false` means the Model
    /// Client must use the instruction-based fallback path (spec §4.2).
    fn native_structured_output_supported(&self) -> bool;

    /// Human-readable vendor name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Construct an adapter for a `model_type` string from graph/model config.
///
/// Unknown `model_type` values are a configuration error (spec §7
/// "Configuration error"), surfaced at graph-construction time rather than
/// on the first call.
pub fn from_model_type(model_type: &str) -> Result<Arc<dyn ModelAdapter>> {
    match model_type {
        "ollama" => Ok(Arc::new(OllamaAdapter) as Arc<dyn ModelAdapter>),
        "openai" | "vllm" | "azure_openai" | "compatible" => {
            Ok(Arc::new(OpenAiAdapter::new()) as Arc<dyn ModelAdapter>)
        }
        other => Err(PipelineError::InvalidConfig(format!(
            "unknown model_type '{other}'; expected one of: ollama, openai, vllm, azure_openai, compatible"
        ))),
    }
}

/// Attempt to recover an HTTP-like status code from an opaque error body.
///
/// Grounded in `BaseCustomModel._get_status_from_body` in the original Python
/// source: some SDK-level errors carry a `statusCode` or `code` field in a
/// JSON body instead of a clean transport status. Used by adapters as a
/// last resort before falling back to the synthetic "unknown" code.
pub fn status_from_body(body: &str) -> Option<u16> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    if let Some(code) = parsed.get("statusCode").and_then(|v| v.as_u64()) {
        return Some(code as u16);
    }
    if let Some(code) = parsed.get("code").and_then(|v| v.as_u64()) {
        return Some(code as u16);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_model_type_known() {
        assert!(from_model_type("ollama").is_ok());
        assert!(from_model_type("openai").is_ok());
    }

    #[test]
    fn test_from_model_type_unknown() {
        let err = from_model_type("frobnicator").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_status_from_body_status_code() {
        assert_eq!(status_from_body(r#"{"statusCode": 503}"#), Some(503));
    }

    #[test]
    fn test_status_from_body_code_field() {
        assert_eq!(status_from_body(r#"{"code": 429}"#), Some(429));
    }

    #[test]
    fn test_status_from_body_unparseable() {
        assert_eq!(status_from_body("not json"), None);
    }
}
