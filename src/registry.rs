//! Compile-time function registry for Lambda nodes, edge predicates, and
//! LLM pre/post-process hooks.
//!
//! Generalizes the "dynamic function registry" design note (spec §9): the
//! source resolves functions by dotted string path (`"module.Class.apply"`)
//! at call time. This implementation instead maps string keys to typed
//! function values registered ahead of time by the embedder, and every
//! reference to a key from graph config is checked against this registry at
//! graph-construction time — an unknown key is a [`PipelineError::InvalidConfig`],
//! not a runtime surprise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::LlmResponse;
use crate::error::{PipelineError, Result};
use crate::state::State;

/// A Lambda node body: `(config, state) -> output keys to merge`.
///
/// Spec §4.3 "Lambda node": sync and async functions both satisfy this
/// trait; whether the concrete implementation suspends is invisible to the
/// caller, matching the source's "detected sync or async at node
/// construction" behavior without needing two call paths.
#[async_trait]
pub trait LambdaFn: Send + Sync {
    async fn call(&self, config: &Value, state: &State) -> Result<HashMap<String, Value>>;
}

/// Adapts a plain synchronous closure into a [`LambdaFn`].
pub struct SyncLambda<F>(pub F);

#[async_trait]
impl<F> LambdaFn for SyncLambda<F>
where
    F: Fn(&Value, &State) -> Result<HashMap<String, Value>> + Send + Sync,
{
    async fn call(&self, config: &Value, state: &State) -> Result<HashMap<String, Value>> {
        (self.0)(config, state)
    }
}

/// Adapts an async closure (boxed future) into a [`LambdaFn`].
pub struct AsyncLambda<F>(pub F);

#[async_trait]
impl<F, Fut> LambdaFn for AsyncLambda<F>
where
    F: Fn(Value, State) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<HashMap<String, Value>>> + Send,
{
    async fn call(&self, config: &Value, state: &State) -> Result<HashMap<String, Value>> {
        (self.0)(config.clone(), state.clone()).await
    }
}

/// An edge predicate: a pure function of `State` returning the name of the
/// node to route to next (spec §3 "Edge", §4.3 "Edge predicates").
pub type EdgePredicate = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// Mutates `State` before an LLM node's call is built.
pub type PreProcessHook = Arc<dyn Fn(&mut State) + Send + Sync>;

/// Mutates `State` after an LLM node's call returns, given the raw response.
pub type PostProcessHook = Arc<dyn Fn(&mut State, &LlmResponse) + Send + Sync>;

/// A model-scoped text transform applied to a successful response body
/// before it's written into `State` (spec §4.2 "Post-processing").
pub type TextTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

enum Registered {
    Lambda(Arc<dyn LambdaFn>),
    Predicate(EdgePredicate),
    PreProcess(PreProcessHook),
    PostProcess(PostProcessHook),
    TextTransform(TextTransform),
}

/// Holds every named function a graph config may reference.
///
/// Validated eagerly: [`FunctionRegistry::require_lambda`] and friends return
/// a [`PipelineError::InvalidConfig`] for an unknown name, rather than
/// panicking or deferring the failure to first use.
#[derive(Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, Registered>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register_text_transform("strip_special_tokens", strip_special_tokens_noop);
        registry.register_text_transform("identity", |s| s.to_string());
        registry
    }

    pub fn register_lambda(&mut self, name: impl Into<String>, f: Arc<dyn LambdaFn>) -> &mut Self {
        self.entries.insert(name.into(), Registered::Lambda(f));
        self
    }

    pub fn register_predicate(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&State) -> String + Send + Sync + 'static,
    ) -> &mut Self {
        self.entries
            .insert(name.into(), Registered::Predicate(Arc::new(f)));
        self
    }

    pub fn register_pre_process(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&mut State) + Send + Sync + 'static,
    ) -> &mut Self {
        self.entries
            .insert(name.into(), Registered::PreProcess(Arc::new(f)));
        self
    }

    pub fn register_post_process(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&mut State, &LlmResponse) + Send + Sync + 'static,
    ) -> &mut Self {
        self.entries
            .insert(name.into(), Registered::PostProcess(Arc::new(f)));
        self
    }

    pub fn register_text_transform(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> &mut Self {
        self.entries
            .insert(name.into(), Registered::TextTransform(Arc::new(f)));
        self
    }

    /// True if `name` is registered as any kind of function. Used at
    /// graph-construction time to validate node configs without caring
    /// which specific accessor a given call site will later use.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn require_lambda(&self, name: &str) -> Result<Arc<dyn LambdaFn>> {
        match self.entries.get(name) {
            Some(Registered::Lambda(f)) => Ok(f.clone()),
            Some(_) => Err(kind_mismatch(name, "lambda")),
            None => Err(unknown(name)),
        }
    }

    pub fn require_predicate(&self, name: &str) -> Result<EdgePredicate> {
        match self.entries.get(name) {
            Some(Registered::Predicate(f)) => Ok(f.clone()),
            Some(_) => Err(kind_mismatch(name, "edge predicate")),
            None => Err(unknown(name)),
        }
    }

    pub fn require_pre_process(&self, name: &str) -> Result<PreProcessHook> {
        match self.entries.get(name) {
            Some(Registered::PreProcess(f)) => Ok(f.clone()),
            Some(_) => Err(kind_mismatch(name, "pre_process hook")),
            None => Err(unknown(name)),
        }
    }

    pub fn require_post_process(&self, name: &str) -> Result<PostProcessHook> {
        match self.entries.get(name) {
            Some(Registered::PostProcess(f)) => Ok(f.clone()),
            Some(_) => Err(kind_mismatch(name, "post_process hook")),
            None => Err(unknown(name)),
        }
    }

    pub fn require_text_transform(&self, name: &str) -> Result<TextTransform> {
        match self.entries.get(name) {
            Some(Registered::TextTransform(f)) => Ok(f.clone()),
            Some(_) => Err(kind_mismatch(name, "text transform")),
            None => Err(unknown(name)),
        }
    }
}

fn unknown(name: &str) -> PipelineError {
    PipelineError::InvalidConfig(format!("unknown function reference '{name}'"))
}

fn kind_mismatch(name: &str, expected: &str) -> PipelineError {
    PipelineError::InvalidConfig(format!(
        "function reference '{name}' is not registered as a {expected}"
    ))
}

/// Default no-op special-token stripper; callers register their own
/// vendor-specific quirks the same way (spec §10.6 "Vendor-specific response
/// post-processing" — the mechanism is carried, not hardcoded regexes for
/// vendors this spec does not mandate).
fn strip_special_tokens_noop(text: &str) -> String {
    text.to_string()
}
