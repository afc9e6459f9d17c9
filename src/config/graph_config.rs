//! Graph config parsing: the `nodes`/`edges`/`graph_properties` document
//! into [`Graph::build`]-ready values (spec §6 "Graph config").
//!
//! Grounded in `sygra/core/graph/graph_config_loader.py` in the original
//! Python source for the node-type dispatch and edge shape; role-tagged
//! prompt templates follow the teacher's own `prompt::render` substitution
//! style, generalized here to a list of `{role, content}` entries.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::graph::{
    Edge, EdgeTarget, LambdaNodeConfig, LlmNodeConfig, MultiLlmNodeConfig, NodeKind, NodeSpec,
    PromptTemplate, SubgraphNodeConfig, WeightedSamplerNodeConfig, WeightedValues, END, START,
};
use crate::message::Role;

fn default_max_steps() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "node_type")]
enum RawNodeBody {
    Llm {
        model: String,
        #[serde(default)]
        prompt: Vec<RawPromptEntry>,
        output_keys: Vec<String>,
        #[serde(default)]
        pre_process: Option<String>,
        #[serde(default)]
        post_process: Option<String>,
        #[serde(default)]
        structured_output: Option<Value>,
    },
    MultiLlm {
        models: Vec<String>,
        #[serde(default)]
        prompt: Vec<RawPromptEntry>,
        output_key: String,
    },
    Lambda {
        function: String,
        #[serde(default)]
        params: Value,
    },
    WeightedSampler {
        attributes: HashMap<String, Vec<RawWeightedValue>>,
    },
    Subgraph {
        graph: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RawPromptEntry {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWeightedValue {
    value: Value,
    weight: f64,
}

/// One entry in the `nodes` map.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    #[serde(flatten)]
    body: RawNodeBody,
}

/// One entry in the `edges` list: either `{from, to}` or `{from, condition}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEdge {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

/// The whole graph config document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGraphConfig {
    pub nodes: HashMap<String, RawNode>,
    pub edges: Vec<RawEdge>,
    #[serde(default)]
    pub graph_properties: Value,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn parse_role(raw: &str) -> Result<Role> {
    match raw {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(PipelineError::InvalidConfig(format!(
            "unknown message role '{other}'; expected one of: system, user, assistant, tool"
        ))),
    }
}

fn convert_prompt(entries: Vec<RawPromptEntry>) -> Result<Vec<PromptTemplate>> {
    entries
        .into_iter()
        .map(|e| Ok(PromptTemplate { role: parse_role(&e.role)?, template: e.content }))
        .collect()
}

fn convert_weights(raw: Vec<RawWeightedValue>) -> WeightedValues {
    raw.into_iter().map(|w| (w.value, w.weight)).collect()
}

/// Parse a graph config document into the `(nodes, edges, graph_properties,
/// max_steps)` tuple `Graph::build` consumes. Validation of cross-references
/// (unknown models, unknown functions, malformed edge targets) happens in
/// `Graph::build` itself, not here — this function only handles shape.
pub fn parse_graph_config(
    yaml: &str,
) -> Result<(Vec<NodeSpec>, Vec<Edge>, Value, usize)> {
    let raw: RawGraphConfig = serde_yaml::from_str(yaml)?;

    let mut nodes = Vec::with_capacity(raw.nodes.len());
    for (name, raw_node) in raw.nodes {
        let kind = match raw_node.body {
            RawNodeBody::Llm { model, prompt, output_keys, pre_process, post_process, structured_output } => {
                NodeKind::Llm(LlmNodeConfig {
                    model,
                    prompt: convert_prompt(prompt)?,
                    output_keys,
                    pre_process,
                    post_process,
                    structured_output,
                })
            }
            RawNodeBody::MultiLlm { models, prompt, output_key } => {
                NodeKind::MultiLlm(MultiLlmNodeConfig { models, prompt: convert_prompt(prompt)?, output_key })
            }
            RawNodeBody::Lambda { function, params } => {
                NodeKind::Lambda(LambdaNodeConfig { function, params })
            }
            RawNodeBody::WeightedSampler { attributes } => {
                NodeKind::WeightedSampler(WeightedSamplerNodeConfig {
                    attributes: attributes.into_iter().map(|(k, v)| (k, convert_weights(v))).collect(),
                })
            }
            RawNodeBody::Subgraph { graph } => NodeKind::Subgraph(SubgraphNodeConfig { graph }),
        };
        nodes.push(NodeSpec { name, kind });
    }

    let mut edges = Vec::with_capacity(raw.edges.len());
    for raw_edge in raw.edges {
        let target = match (raw_edge.to, raw_edge.condition) {
            (Some(to), None) => EdgeTarget::Direct { to },
            (None, Some(condition)) => EdgeTarget::Conditional { condition },
            (Some(_), Some(_)) => {
                return Err(PipelineError::InvalidConfig(format!(
                    "edge from '{}' declares both 'to' and 'condition'",
                    raw_edge.from
                )))
            }
            (None, None) => {
                return Err(PipelineError::InvalidConfig(format!(
                    "edge from '{}' declares neither 'to' nor 'condition'",
                    raw_edge.from
                )))
            }
        };
        edges.push(Edge { from: raw_edge.from, target });
    }

    Ok((nodes, edges, raw.graph_properties, raw.max_steps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_llm_graph() {
        let yaml = r#"
nodes:
  ask:
    node_type: llm
    model: chat
    prompt:
      - role: user
        content: "hi {name}"
    output_keys: ["reply"]
edges:
  - from: START
    to: ask
  - from: ask
    to: END
"#;
        let (nodes, edges, _props, max_steps) = parse_graph_config(yaml).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(edges.len(), 2);
        assert_eq!(max_steps, 200);
        assert_eq!(edges[0].from, START);
        assert_eq!(edges[1].from, "ask");
    }

    #[test]
    fn test_parse_conditional_edge() {
        let yaml = r#"
nodes:
  a:
    node_type: lambda
    function: noop
edges:
  - from: START
    to: a
  - from: a
    condition: route_a
"#;
        let (_nodes, edges, _props, _max) = parse_graph_config(yaml).unwrap();
        assert!(matches!(edges[1].target, EdgeTarget::Conditional { .. }));
    }

    #[test]
    fn test_parse_rejects_edge_with_both_to_and_condition() {
        let yaml = r#"
nodes:
  a:
    node_type: lambda
    function: noop
edges:
  - from: START
    to: a
    condition: x
"#;
        let err = parse_graph_config(yaml).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_weighted_sampler_node() {
        let yaml = r#"
nodes:
  sample:
    node_type: weighted_sampler
    attributes:
      difficulty:
        - value: easy
          weight: 1.0
        - value: hard
          weight: 2.0
edges:
  - from: START
    to: sample
"#;
        let (nodes, _edges, _props, _max) = parse_graph_config(yaml).unwrap();
        match &nodes[0].kind {
            NodeKind::WeightedSampler(cfg) => {
                assert_eq!(cfg.attributes["difficulty"].len(), 2);
            }
            _ => panic!("expected weighted_sampler node"),
        }
    }

    #[test]
    fn test_parse_custom_max_steps_and_graph_properties() {
        let yaml = r#"
nodes:
  a:
    node_type: lambda
    function: noop
edges:
  - from: START
    to: a
graph_properties:
  topic: "space"
max_steps: 50
"#;
        let (_nodes, _edges, props, max_steps) = parse_graph_config(yaml).unwrap();
        assert_eq!(max_steps, 50);
        assert_eq!(props["topic"], "space");
    }
}
