//! Graph construction: nodes, edges, and the validation pass that turns a
//! parsed config into a [`Graph`] the runtime can execute.
//!
//! No teacher analog — the teacher has no graph concept. Grounded in spec
//! §3 (Node/Edge data model) and §4.4 (construction-time validation); module
//! layout (nodes/edges as separate concerns feeding one runtime) follows the
//! original Python source's `sygra/core/graph/` split.

pub mod runtime;

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::message::Role;
use crate::registry::FunctionRegistry;

/// Sentinel name for the graph's single entry point.
pub const START: &str = "START";
/// Sentinel name for a terminal node.
pub const END: &str = "END";

/// One role-tagged template string in an LLM or MultiLLM node's `prompt` list.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub role: Role,
    pub template: String,
}

/// Config for an `llm` node (spec §4.3 "LLM node").
#[derive(Debug, Clone)]
pub struct LlmNodeConfig {
    pub model: String,
    pub prompt: Vec<PromptTemplate>,
    pub output_keys: Vec<String>,
    pub pre_process: Option<String>,
    pub post_process: Option<String>,
    pub structured_output: Option<Value>,
}

/// Config for a `multi_llm` node (spec §4.3 "MultiLLM node").
#[derive(Debug, Clone)]
pub struct MultiLlmNodeConfig {
    pub models: Vec<String>,
    pub prompt: Vec<PromptTemplate>,
    pub output_key: String,
}

/// Config for a `lambda` node (spec §4.3 "Lambda node").
#[derive(Debug, Clone)]
pub struct LambdaNodeConfig {
    pub function: String,
    /// Opaque config blob passed through to the function verbatim.
    pub params: Value,
}

/// One attribute's weighted discrete distribution: `(value, weight)` pairs.
pub type WeightedValues = Vec<(Value, f64)>;

/// Config for a `weighted_sampler` node (spec §4.3 "WeightedSampler node").
#[derive(Debug, Clone, Default)]
pub struct WeightedSamplerNodeConfig {
    pub attributes: HashMap<String, WeightedValues>,
}

/// Config for a `subgraph` node (spec §4.3 "Agent/Subgraph nodes").
#[derive(Debug, Clone)]
pub struct SubgraphNodeConfig {
    pub graph: String,
}

/// The behavior a node executes, with its type-specific config attached.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Llm(LlmNodeConfig),
    MultiLlm(MultiLlmNodeConfig),
    Lambda(LambdaNodeConfig),
    WeightedSampler(WeightedSamplerNodeConfig),
    Subgraph(SubgraphNodeConfig),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Llm(_) => "llm",
            NodeKind::MultiLlm(_) => "multi_llm",
            NodeKind::Lambda(_) => "lambda",
            NodeKind::WeightedSampler(_) => "weighted_sampler",
            NodeKind::Subgraph(_) => "subgraph",
        }
    }
}

/// A named, frozen node in a graph (spec §3 "Node").
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
}

/// How the next node is resolved after `from` executes (spec §3 "Edge").
#[derive(Debug, Clone)]
pub enum EdgeTarget {
    /// Unconditional: always routes to `to`.
    Direct { to: String },
    /// Routes to whatever node name the registered predicate returns,
    /// evaluated against the record's `State` after the node body runs.
    Conditional { condition: String },
}

/// A directed edge from one node (or `START`) to the next.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub target: EdgeTarget,
}

/// A constructed, validated graph ready for execution.
///
/// Built via [`Graph::build`], which is the only way to obtain one —
/// construction-time validation (spec §4.4) cannot be bypassed.
#[derive(Debug)]
pub struct Graph {
    pub name: String,
    pub nodes: HashMap<String, NodeSpec>,
    pub graph_properties: Value,
    /// Step-limit cutoff for one record's run (spec §4.4 "Cycle termination").
    pub max_steps: usize,
    edges_by_from: HashMap<String, Vec<Edge>>,
}

impl Graph {
    /// Validate and assemble a graph from its nodes and edges.
    ///
    /// Checks (spec §4.4 "Graph construction"):
    /// - every edge's `from`/`to` names an existing node or `START`/`END`;
    /// - every LLM/MultiLLM node's declared model(s) exist in `known_models`;
    /// - every function reference (lambda, predicate, pre/post-process) is
    ///   registered in `registry`;
    /// - a node has at most one unconditional outgoing edge, and never both
    ///   a conditional and an unconditional edge at once (ambiguous routing).
    ///   Parallel fan-out across branches is the dedicated `multi_llm` node's
    ///   job, not a side effect of declaring several plain edges — see
    ///   DESIGN.md for this decision.
    pub fn build(
        name: impl Into<String>,
        nodes: Vec<NodeSpec>,
        edges: Vec<Edge>,
        graph_properties: Value,
        max_steps: usize,
        known_models: &HashSet<String>,
        registry: &FunctionRegistry,
    ) -> Result<Self> {
        let mut node_map = HashMap::new();
        for node in nodes {
            if node_map.contains_key(&node.name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
            node_map.insert(node.name.clone(), node);
        }

        for node in node_map.values() {
            validate_node(node, known_models, registry)?;
        }

        let mut edges_by_from: HashMap<String, Vec<Edge>> = HashMap::new();
        for edge in edges {
            validate_edge(&edge, &node_map, registry)?;
            edges_by_from.entry(edge.from.clone()).or_default().push(edge);
        }

        for (from, group) in &edges_by_from {
            let direct_count = group
                .iter()
                .filter(|e| matches!(e.target, EdgeTarget::Direct { .. }))
                .count();
            let conditional_count = group.len() - direct_count;
            if direct_count > 1 {
                return Err(PipelineError::InvalidConfig(format!(
                    "node '{from}' has {direct_count} unconditional outgoing edges; \
                     use a multi_llm node for parallel branches or a conditional edge for routing"
                )));
            }
            if direct_count > 0 && conditional_count > 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "node '{from}' mixes a conditional edge with an unconditional edge"
                )));
            }
            if conditional_count > 1 {
                return Err(PipelineError::InvalidConfig(format!(
                    "node '{from}' has more than one conditional edge"
                )));
            }
        }

        if !edges_by_from.contains_key(START) {
            return Err(PipelineError::InvalidConfig(
                "graph has no outgoing edge from START".to_string(),
            ));
        }

        Ok(Self {
            name: name.into(),
            nodes: node_map,
            graph_properties,
            max_steps,
            edges_by_from,
        })
    }

    pub fn edges_from(&self, node: &str) -> &[Edge] {
        self.edges_by_from.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn validate_node(
    node: &NodeSpec,
    known_models: &HashSet<String>,
    registry: &FunctionRegistry,
) -> Result<()> {
    match &node.kind {
        NodeKind::Llm(cfg) => {
            require_model(&node.name, &cfg.model, known_models)?;
            if let Some(name) = &cfg.pre_process {
                require_registered(&node.name, "pre_process", name, |n| registry.contains(n))?;
            }
            if let Some(name) = &cfg.post_process {
                require_registered(&node.name, "post_process", name, |n| registry.contains(n))?;
            }
        }
        NodeKind::MultiLlm(cfg) => {
            if cfg.models.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "multi_llm node '{}' declares no models",
                    node.name
                )));
            }
            for model in &cfg.models {
                require_model(&node.name, model, known_models)?;
            }
        }
        NodeKind::Lambda(cfg) => {
            require_registered(&node.name, "function", &cfg.function, |n| registry.contains(n))?;
        }
        NodeKind::WeightedSampler(cfg) => {
            if cfg.attributes.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "weighted_sampler node '{}' declares no attributes",
                    node.name
                )));
            }
            for (attr, weights) in &cfg.attributes {
                if weights.is_empty() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "weighted_sampler node '{}' attribute '{attr}' has no weighted values",
                        node.name
                    )));
                }
            }
        }
        NodeKind::Subgraph(_) => {}
    }
    Ok(())
}

fn require_model(node: &str, model: &str, known_models: &HashSet<String>) -> Result<()> {
    if known_models.contains(model) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "node '{node}' references unknown model '{model}'"
        )))
    }
}

fn require_registered(
    node: &str,
    field: &str,
    name: &str,
    present: impl Fn(&str) -> bool,
) -> Result<()> {
    if present(name) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "node '{node}' {field} references unknown function '{name}'"
        )))
    }
}

fn validate_edge(
    edge: &Edge,
    nodes: &HashMap<String, NodeSpec>,
    registry: &FunctionRegistry,
) -> Result<()> {
    if edge.from != START && !nodes.contains_key(&edge.from) {
        return Err(PipelineError::InvalidConfig(format!(
            "edge references unknown source node '{}'",
            edge.from
        )));
    }
    match &edge.target {
        EdgeTarget::Direct { to } => {
            if to != END && !nodes.contains_key(to) {
                return Err(PipelineError::InvalidConfig(format!(
                    "edge from '{}' targets unknown node '{to}'",
                    edge.from
                )));
            }
        }
        EdgeTarget::Conditional { condition } => {
            if !registry.contains(condition) {
                return Err(PipelineError::InvalidConfig(format!(
                    "edge from '{}' references unknown condition function '{condition}'",
                    edge.from
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_minimal_graph() {
        let nodes = vec![NodeSpec {
            name: "a".into(),
            kind: NodeKind::Lambda(LambdaNodeConfig {
                function: "noop".into(),
                params: Value::Null,
            }),
        }];
        let mut registry = FunctionRegistry::new();
        registry.register_lambda(
            "noop",
            std::sync::Arc::new(crate::registry::SyncLambda(|_c: &Value, _s: &crate::state::State| {
                Ok(HashMap::new())
            })),
        );
        let edges = vec![
            Edge { from: START.into(), target: EdgeTarget::Direct { to: "a".into() } },
            Edge { from: "a".into(), target: EdgeTarget::Direct { to: END.into() } },
        ];
        let graph = Graph::build("g", nodes, edges, Value::Null, 200, &models(&[]), &registry).unwrap();
        assert_eq!(graph.edges_from("a")[0].from, "a");
    }

    #[test]
    fn test_build_rejects_unknown_model() {
        let nodes = vec![NodeSpec {
            name: "a".into(),
            kind: NodeKind::Llm(LlmNodeConfig {
                model: "ghost".into(),
                prompt: vec![],
                output_keys: vec!["out".into()],
                pre_process: None,
                post_process: None,
                structured_output: None,
            }),
        }];
        let registry = FunctionRegistry::new();
        let edges = vec![Edge { from: START.into(), target: EdgeTarget::Direct { to: "a".into() } }];
        let err = Graph::build("g", nodes, edges, Value::Null, 200, &models(&[]), &registry).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_build_rejects_multiple_direct_edges() {
        let nodes = vec![
            NodeSpec { name: "a".into(), kind: NodeKind::Subgraph(SubgraphNodeConfig { graph: "x".into() }) },
            NodeSpec { name: "b".into(), kind: NodeKind::Subgraph(SubgraphNodeConfig { graph: "x".into() }) },
            NodeSpec { name: "c".into(), kind: NodeKind::Subgraph(SubgraphNodeConfig { graph: "x".into() }) },
        ];
        let registry = FunctionRegistry::new();
        let edges = vec![
            Edge { from: START.into(), target: EdgeTarget::Direct { to: "a".into() } },
            Edge { from: "a".into(), target: EdgeTarget::Direct { to: "b".into() } },
            Edge { from: "a".into(), target: EdgeTarget::Direct { to: "c".into() } },
        ];
        let err = Graph::build("g", nodes, edges, Value::Null, 200, &models(&[]), &registry).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_build_requires_start_edge() {
        let nodes = vec![];
        let registry = FunctionRegistry::new();
        let err = Graph::build("g", nodes, vec![], Value::Null, 200, &models(&[]), &registry).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
