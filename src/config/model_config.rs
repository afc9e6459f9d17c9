//! Model config parsing: model-name → `{model_type, url, auth_token, ...}`
//! into constructed [`ModelClient`]s (spec §6 "Model config").
//!
//! Grounded in `BaseCustomModel.__init__` in the original Python source for
//! the url/auth_token str-or-list handling and the `retry_attempts`/`delay`/
//! `load_balancing`/`stats_interval`/`special_tokens`/`post_process` keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::{ModelAdapter, OllamaAdapter, OpenAiAdapter};
use crate::client::{BackoffConfig, LoadBalancerStrategy, ModelClient, ModelClientConfig};
use crate::config::credentials::{env_override, resolve_credential};
use crate::error::{PipelineError, Result};
use crate::registry::FunctionRegistry;

/// A config value that may be given as a single string or a parallel array
/// (one per URL). Untagged so either YAML shape deserializes directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UrlOrList {
    Single(String),
    Many(Vec<String>),
}

impl UrlOrList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            UrlOrList::Single(s) => vec![s],
            UrlOrList::Many(v) => v,
        }
    }
}

fn default_retry_attempts() -> u32 {
    8
}

fn default_delay_ms() -> u64 {
    100
}

fn default_stats_interval() -> u64 {
    50
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingKind {
    #[default]
    LeastRequests,
    RoundRobin,
}

impl From<LoadBalancingKind> for LoadBalancerStrategy {
    fn from(kind: LoadBalancingKind) -> Self {
        match kind {
            LoadBalancingKind::LeastRequests => LoadBalancerStrategy::LeastRequests,
            LoadBalancingKind::RoundRobin => LoadBalancerStrategy::RoundRobin,
        }
    }
}

/// One model entry as parsed straight from YAML, before credential
/// resolution or `ModelClient` construction.
#[derive(Debug, Clone, Deserialize)]
pub struct RawModelSpec {
    pub model_type: String,
    #[serde(default)]
    pub url: Option<UrlOrList>,
    #[serde(default)]
    pub auth_token: Option<UrlOrList>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub load_balancing: LoadBalancingKind,
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    #[serde(default)]
    pub special_tokens: Vec<String>,
    #[serde(default)]
    pub post_process: Option<String>,
    /// Default structured-output schema for LLM nodes against this model
    /// that don't declare their own (spec §6 "Model config").
    #[serde(default)]
    pub structured_output: Option<Value>,
}

/// Everything built from a model config document: live clients plus any
/// per-model default structured-output schema for graph construction to
/// fall back on.
pub struct LoadedModels {
    pub clients: HashMap<String, Arc<ModelClient>>,
    pub default_schemas: HashMap<String, Value>,
}

/// Build one [`ModelClient`] per entry in `specs`, resolving credentials
/// (`env:VARNAME` references, `SYGRA_<NAME>_URL`/`_TOKEN` fallbacks) and
/// looking up any named `post_process` transform in `registry`.
///
/// An empty URL list for a model (after resolution) is a configuration
/// error raised here, matching the orchestrator's startup-abort contract
/// (spec §8 boundary scenario 1).
pub fn build_model_clients(
    specs: HashMap<String, RawModelSpec>,
    registry: &FunctionRegistry,
    http: Client,
) -> Result<LoadedModels> {
    let mut clients = HashMap::new();
    let mut default_schemas = HashMap::new();

    for (name, spec) in specs {
        let urls = resolve_urls(&name, &spec)?;
        if urls.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "model '{name}' has no configured url"
            )));
        }

        let auth_token = resolve_auth_token(&name, &spec)?;
        let adapter = build_adapter(&spec.model_type, auth_token)?;

        let post_process = match &spec.post_process {
            Some(fn_name) => Some(registry.require_text_transform(fn_name)?),
            None => None,
        };

        let backoff = BackoffConfig {
            max_retries: spec.retry_attempts,
            initial_delay: Duration::from_millis(spec.delay_ms),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: crate::client::backoff::JitterStrategy::Full,
            retryable_statuses: crate::error::RETRYABLE_STATUS_CODES.to_vec(),
            respect_retry_after: true,
        };

        let config = ModelClientConfig {
            model_name: name.clone(),
            urls,
            load_balancer_strategy: spec.load_balancing.into(),
            backoff,
            stats_interval: spec.stats_interval,
            post_process,
        };

        clients.insert(name.clone(), Arc::new(ModelClient::new(adapter, http.clone(), config)));
        if let Some(schema) = spec.structured_output {
            default_schemas.insert(name, schema);
        }
    }

    Ok(LoadedModels { clients, default_schemas })
}

fn resolve_urls(model_name: &str, spec: &RawModelSpec) -> Result<Vec<String>> {
    let raw_urls = match &spec.url {
        Some(u) => u.clone().into_vec(),
        None => match env_override(model_name, "URL") {
            Some(url) => vec![url],
            None => Vec::new(),
        },
    };
    raw_urls.into_iter().map(|u| resolve_credential(&u)).collect()
}

/// Resolve the model's auth token, if any. When `auth_token` names a
/// parallel array (one per URL), only the first is used to construct the
/// adapter instance — a single stateless adapter instance serves every URL
/// a model's load balancer picks between, so per-URL auth cannot vary here.
fn resolve_auth_token(model_name: &str, spec: &RawModelSpec) -> Result<Option<String>> {
    let candidate = match &spec.auth_token {
        Some(t) => t.clone().into_vec().into_iter().next(),
        None => env_override(model_name, "TOKEN"),
    };
    candidate.map(|t| resolve_credential(&t)).transpose()
}

fn build_adapter(model_type: &str, auth_token: Option<String>) -> Result<Arc<dyn ModelAdapter>> {
    match model_type {
        "ollama" => Ok(Arc::new(OllamaAdapter) as Arc<dyn ModelAdapter>),
        "openai" | "vllm" | "azure_openai" | "compatible" => {
            let mut adapter = OpenAiAdapter::new();
            if let Some(token) = auth_token {
                adapter = adapter.with_api_key(token);
            }
            Ok(Arc::new(adapter) as Arc<dyn ModelAdapter>)
        }
        other => Err(PipelineError::InvalidConfig(format!(
            "unknown model_type '{other}'; expected one of: ollama, openai, vllm, azure_openai, compatible"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::new()
    }

    #[test]
    fn test_parse_single_url_model() {
        let yaml = r#"
model_type: ollama
url: "http://localhost:11434"
retry_attempts: 3
"#;
        let spec: RawModelSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.model_type, "ollama");
        assert_eq!(spec.retry_attempts, 3);
        assert_eq!(spec.url.unwrap().into_vec(), vec!["http://localhost:11434".to_string()]);
    }

    #[test]
    fn test_parse_multi_url_model_with_defaults() {
        let yaml = r#"
model_type: openai
url: ["http://a", "http://b"]
"#;
        let spec: RawModelSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.retry_attempts, 8);
        assert_eq!(spec.delay_ms, 100);
        assert_eq!(spec.load_balancing, LoadBalancingKind::LeastRequests);
    }

    #[test]
    fn test_build_model_clients_succeeds() {
        let mut specs = HashMap::new();
        specs.insert(
            "chat".to_string(),
            RawModelSpec {
                model_type: "ollama".to_string(),
                url: Some(UrlOrList::Single("http://localhost:11434".to_string())),
                auth_token: None,
                parameters: Value::Null,
                retry_attempts: 8,
                delay_ms: 100,
                load_balancing: LoadBalancingKind::LeastRequests,
                stats_interval: 50,
                special_tokens: vec![],
                post_process: None,
                structured_output: None,
            },
        );
        let loaded = build_model_clients(specs, &registry(), Client::new()).unwrap();
        assert!(loaded.clients.contains_key("chat"));
    }

    #[test]
    fn test_build_model_clients_rejects_empty_url_list() {
        let mut specs = HashMap::new();
        specs.insert(
            "chat".to_string(),
            RawModelSpec {
                model_type: "ollama".to_string(),
                url: Some(UrlOrList::Many(vec![])),
                auth_token: None,
                parameters: Value::Null,
                retry_attempts: 8,
                delay_ms: 100,
                load_balancing: LoadBalancingKind::LeastRequests,
                stats_interval: 50,
                special_tokens: vec![],
                post_process: None,
                structured_output: None,
            },
        );
        let err = build_model_clients(specs, &registry(), Client::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_build_model_clients_unknown_post_process_is_invalid_config() {
        let mut specs = HashMap::new();
        specs.insert(
            "chat".to_string(),
            RawModelSpec {
                model_type: "ollama".to_string(),
                url: Some(UrlOrList::Single("http://localhost:11434".to_string())),
                auth_token: None,
                parameters: Value::Null,
                retry_attempts: 8,
                delay_ms: 100,
                load_balancing: LoadBalancingKind::LeastRequests,
                stats_interval: 50,
                special_tokens: vec![],
                post_process: Some("ghost_transform".to_string()),
                structured_output: None,
            },
        );
        let err = build_model_clients(specs, &registry(), Client::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
