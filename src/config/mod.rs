//! Configuration loading: graph/model YAML documents plus credential
//! resolution (spec §6 "Graph config", "Model config", "Environment
//! variables").
//!
//! No teacher analog — `sygra/config/configuration_loader.py` and
//! `sygra/core/graph/graph_config_loader.py` in the original Python source
//! are the grounding for the shapes parsed here; `serde_yaml` is already a
//! teacher dependency (the `yaml` feature it used to sit behind is removed,
//! see DESIGN.md).

pub mod credentials;
pub mod graph_config;
pub mod model_config;

pub use credentials::resolve_credential;
pub use graph_config::{parse_graph_config, RawEdge, RawGraphConfig, RawNode};
pub use model_config::{build_model_clients, RawModelSpec, UrlOrList};
