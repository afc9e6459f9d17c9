//! Model Client: retries, load balancing, stats, circuit breaking, and
//! structured-output coercion layered on top of a [`ModelAdapter`].
//!
//! One [`ModelClient`] serves one logical model (which may itself be backed
//! by several URLs via the load balancer). Grounded throughout in
//! `BaseCustomModel` in the original Python source — see the submodules for
//! per-concern grounding notes.

pub mod backoff;
pub mod circuit_breaker;
pub mod load_balancer;
pub mod stats;
pub mod structured_output;

pub use backoff::BackoffConfig;
pub use circuit_breaker::ServerDownWindow;
pub use load_balancer::{LoadBalancer, Strategy as LoadBalancerStrategy};
pub use stats::ModelStats;

use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::adapter::{LlmRequest, LlmResponse, ModelAdapter};
use crate::error::{is_retryable_status, is_server_down_status, PipelineError, Result};
use crate::registry::TextTransform;

/// Construction parameters for a [`ModelClient`].
pub struct ModelClientConfig {
    pub model_name: String,
    pub urls: Vec<String>,
    pub load_balancer_strategy: LoadBalancerStrategy,
    pub backoff: BackoffConfig,
    pub stats_interval: u64,
    /// Model-scoped text transform applied to a successful response before
    /// it's written into `State` (spec §4.2 "Post-processing") — special
    /// token stripping, vendor-specific text fixes.
    pub post_process: Option<TextTransform>,
}

impl ModelClientConfig {
    pub fn new(model_name: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            model_name: model_name.into(),
            urls,
            load_balancer_strategy: LoadBalancerStrategy::default(),
            backoff: BackoffConfig::sygra_default(),
            stats_interval: 50,
            post_process: None,
        }
    }
}

/// One model's call surface: retries, load balancing, stats, and the
/// server-down circuit breaker all wired behind [`ModelClient::call`] and
/// [`ModelClient::call_structured`].
pub struct ModelClient {
    model_name: String,
    adapter: Arc<dyn ModelAdapter>,
    http: Client,
    load_balancer: LoadBalancer,
    stats: ModelStats,
    circuit_breaker: ServerDownWindow,
    backoff: BackoffConfig,
    post_process: Option<TextTransform>,
    structured_output_lock: AsyncMutex<()>,
}

impl ModelClient {
    pub fn new(adapter: Arc<dyn ModelAdapter>, http: Client, config: ModelClientConfig) -> Self {
        Self {
            model_name: config.model_name.clone(),
            adapter,
            http,
            load_balancer: LoadBalancer::new(config.urls, config.load_balancer_strategy),
            stats: ModelStats::new(config.model_name, config.stats_interval),
            circuit_breaker: ServerDownWindow::new(),
            backoff: config.backoff,
            post_process: config.post_process,
            structured_output_lock: AsyncMutex::new(()),
        }
    }

    fn apply_post_process(&self, mut response: LlmResponse) -> LlmResponse {
        if let Some(transform) = &self.post_process {
            response.text = transform(&response.text);
        }
        response
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Record a failed call against stats and the circuit breaker, returning
    /// `Err(ServerDown)` if the breaker trips.
    fn observe_failure(&self, err: PipelineError) -> PipelineError {
        self.stats.record_failure(&err);
        if let PipelineError::HttpError { status, .. } = &err {
            if is_server_down_status(*status) {
                if let Some(count) = self.circuit_breaker.record_failure() {
                    return PipelineError::ServerDown {
                        model: self.model_name.clone(),
                        count,
                        window_secs: circuit_breaker::MODEL_FAILURE_WINDOW_IN_SEC,
                    };
                }
            }
        }
        err
    }

    fn is_retryable(err: &PipelineError) -> bool {
        match err {
            PipelineError::HttpError { status, .. } => is_retryable_status(*status),
            PipelineError::Request(_) => true,
            _ => false,
        }
    }

    /// Plain completion with the full retry loop and load balancing.
    pub async fn call(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut last_error: Option<PipelineError> = None;

        for attempt in 0..self.backoff.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff.delay_for_attempt(attempt - 1)).await;
            }

            let lease = self.load_balancer.acquire();
            let url = lease.url().to_string();

            match self.adapter.complete(&self.http, &url, request).await {
                Ok(response) => {
                    self.stats.record_success(response.status);
                    self.circuit_breaker.reset();
                    return Ok(self.apply_post_process(response));
                }
                Err(e) => {
                    let retryable = Self::is_retryable(&e);
                    let observed = self.observe_failure(e);
                    if matches!(observed, PipelineError::ServerDown { .. }) {
                        return Err(observed);
                    }
                    if attempt < self.backoff.max_retries && retryable {
                        last_error = Some(observed);
                        continue;
                    }
                    return Err(observed);
                }
            }
        }

        Err(last_error.unwrap_or(PipelineError::Other(
            "retry loop exited unexpectedly".into(),
        )))
    }

    /// Structured-output completion: native schema attempt or instruction-
    /// based fallback, serialized per model via an async lock (spec §4.2
    /// point 4), wrapped in the same retry loop as [`ModelClient::call`].
    pub async fn call_structured(&self, request: &LlmRequest, schema: &Value) -> Result<(String, Value)> {
        let _guard = self.structured_output_lock.lock().await;
        let mut last_error: Option<PipelineError> = None;

        for attempt in 0..self.backoff.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff.delay_for_attempt(attempt - 1)).await;
            }

            let lease = self.load_balancer.acquire();
            let url = lease.url().to_string();

            match structured_output::generate(self.adapter.as_ref(), &self.http, &url, request, schema).await {
                Ok((text, value)) => {
                    self.stats.record_success(200);
                    self.circuit_breaker.reset();
                    let text = match &self.post_process {
                        Some(transform) => transform(&text),
                        None => text,
                    };
                    return Ok((text, value));
                }
                Err(e) => {
                    let retryable = Self::is_retryable(&e);
                    let observed = self.observe_failure(e);
                    if matches!(observed, PipelineError::ServerDown { .. }) {
                        return Err(observed);
                    }
                    if attempt < self.backoff.max_retries && retryable {
                        last_error = Some(observed);
                        continue;
                    }
                    return Err(observed);
                }
            }
        }

        Err(last_error.unwrap_or(PipelineError::Other(
            "retry loop exited unexpectedly".into(),
        )))
    }

    /// Send a trivial hello message to every configured URL. Returns the
    /// worst (highest, non-2xx-preferring) status observed, for the
    /// startup ping-all-models-or-abort check (spec §4.5).
    pub async fn ping(&self) -> Result<u16> {
        use crate::adapter::GenerationParams;
        use crate::message::Message;

        let request = LlmRequest {
            model: self.model_name.clone(),
            system_prompt: None,
            messages: vec![Message::user("ping")],
            params: GenerationParams {
                max_tokens: 1,
                ..GenerationParams::default()
            },
            schema: None,
            stream: false,
        };

        let mut worst: Option<u16> = None;
        for url in self.load_balancer.urls() {
            match self.adapter.complete(&self.http, url, &request).await {
                Ok(response) => {
                    worst = Some(worst.map_or(response.status, |w| w.max(response.status)));
                }
                Err(PipelineError::HttpError { status, .. }) => {
                    return Ok(status);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(worst.unwrap_or(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{GenerationParams, MockAdapter};
    use crate::message::Message;
    use serde_json::json;

    fn test_request() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            system_prompt: None,
            messages: vec![Message::user("hello")],
            params: GenerationParams::default(),
            schema: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_call_succeeds_first_try() {
        let adapter: Arc<dyn ModelAdapter> = Arc::new(MockAdapter::fixed("hi"));
        let config = ModelClientConfig::new("test-model", vec!["http://unused".into()]);
        let client = ModelClient::new(adapter, Client::new(), config);
        let resp = client.call(&test_request()).await.unwrap();
        assert_eq!(resp.text, "hi");
    }

    #[tokio::test]
    async fn test_call_structured_fallback() {
        let adapter: Arc<dyn ModelAdapter> = Arc::new(MockAdapter::fixed(r#"{"summary": "ok"}"#));
        let config = ModelClientConfig::new("test-model", vec!["http://unused".into()]);
        let client = ModelClient::new(adapter, Client::new(), config);
        let schema = json!({"required": ["summary"]});
        let (_, value) = client.call_structured(&test_request(), &schema).await.unwrap();
        assert_eq!(value["summary"], "ok");
    }

    #[tokio::test]
    async fn test_ping_returns_200_for_mock() {
        let adapter: Arc<dyn ModelAdapter> = Arc::new(MockAdapter::fixed("pong"));
        let config = ModelClientConfig::new("test-model", vec!["http://unused".into()]);
        let client = ModelClient::new(adapter, Client::new(), config);
        assert_eq!(client.ping().await.unwrap(), 200);
    }

    /// An adapter that always fails with a retryable status, counting how
    /// many times it was invoked.
    struct AlwaysRetryableAdapter {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ModelAdapter for AlwaysRetryableAdapter {
        async fn complete(&self, _client: &Client, _base_url: &str, _request: &LlmRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(PipelineError::HttpError {
                status: 429,
                body: "rate limited".into(),
                retry_after: None,
            })
        }

        async fn complete_streaming(
            &self,
            client: &Client,
            base_url: &str,
            request: &LlmRequest,
            _on_token: &mut (dyn FnMut(String) + Send),
        ) -> Result<LlmResponse> {
            self.complete(client, base_url, request).await
        }

        fn native_structured_output_supported(&self) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            "always-retryable"
        }
    }

    #[tokio::test]
    async fn test_call_makes_exactly_retry_attempts_total_calls() {
        // retry_attempts = 8 must mean 8 total attempts (spec §8 invariant 5,
        // boundary scenario 2), not 9 from an off-by-one inclusive loop.
        let adapter = Arc::new(AlwaysRetryableAdapter {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let mut config = ModelClientConfig::new("test-model", vec!["http://unused".into()]);
        config.backoff.max_retries = 8;
        config.backoff.initial_delay = std::time::Duration::from_millis(0);
        let client = ModelClient::new(adapter.clone(), Client::new(), config);

        let err = client.call(&test_request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::HttpError { status: 429, .. }));
        assert_eq!(adapter.calls.load(std::sync::atomic::Ordering::SeqCst), 8);
    }

    /// An adapter that sleeps before responding, used to observe whether the
    /// load balancer's in-flight counter stays elevated across the await.
    struct SlowAdapter;

    #[async_trait::async_trait]
    impl ModelAdapter for SlowAdapter {
        async fn complete(&self, _client: &Client, _base_url: &str, _request: &LlmRequest) -> Result<LlmResponse> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(LlmResponse {
                text: "ok".into(),
                status: 200,
                metadata: None,
            })
        }

        async fn complete_streaming(
            &self,
            client: &Client,
            base_url: &str,
            request: &LlmRequest,
            _on_token: &mut (dyn FnMut(String) + Send),
        ) -> Result<LlmResponse> {
            self.complete(client, base_url, request).await
        }

        fn native_structured_output_supported(&self) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_call_holds_lease_for_full_duration_of_request() {
        let adapter: Arc<dyn ModelAdapter> = Arc::new(SlowAdapter);
        let config = ModelClientConfig::new("test-model", vec!["http://unused".into()]);
        let client = Arc::new(ModelClient::new(adapter, Client::new(), config));

        let spawned = tokio::spawn({
            let client = client.clone();
            async move { client.call(&test_request()).await }
        });

        // Give the spawned call time to acquire its lease and start the
        // (still-sleeping) request.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(
            client.load_balancer.in_flight_count(0),
            1,
            "in-flight count must stay elevated while the adapter call is still awaiting"
        );

        let resp = spawned.await.unwrap().unwrap();
        assert_eq!(resp.text, "ok");
        assert_eq!(
            client.load_balancer.in_flight_count(0),
            0,
            "in-flight count must drop back to zero once the call completes"
        );
    }
}
