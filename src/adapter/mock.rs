//! Mock adapter for testing without a live LLM.
//!
//! [`MockAdapter`] returns pre-configured responses in order, allowing
//! downstream consumers (and this crate's own tests) to write deterministic
//! coverage of the Model Client / Node Executor layers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;

use super::{LlmRequest, LlmResponse, ModelAdapter};
use crate::error::Result;

/// A test adapter that returns canned responses in order.
///
/// Cycles back to the beginning when all responses have been consumed.
/// For streaming, emits the entire response as a single token.
#[derive(Debug)]
pub struct MockAdapter {
    responses: Vec<String>,
    index: AtomicUsize,
    native_structured_output: bool,
}

impl MockAdapter {
    /// Create a mock adapter with the given canned responses.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockAdapter requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
            native_structured_output: false,
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Make the mock report native structured-output support, to exercise the
    /// Model Client's native path instead of the instruction-based fallback.
    pub fn with_native_structured_output(mut self, supported: bool) -> Self {
        self.native_structured_output = supported;
        self
    }

    fn next_response(&self) -> String {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }
}

#[async_trait]
impl ModelAdapter for MockAdapter {
    async fn complete(&self, _client: &Client, _base_url: &str, _request: &LlmRequest) -> Result<LlmResponse> {
        let text = self.next_response();
        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    async fn complete_streaming(
        &self,
        _client: &Client,
        _base_url: &str,
        _request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> Result<LlmResponse> {
        let text = self.next_response();
        on_token(text.clone());
        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    fn native_structured_output_supported(&self) -> bool {
        self.native_structured_output
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
