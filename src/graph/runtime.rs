//! Single-record graph execution: current node → execute body → evaluate
//! outgoing edge → next node, until `END` or no edge resolves (spec §4.4
//! "Execution").
//!
//! No teacher analog — the "backend" abstraction over a third-party workflow
//! library in the original source does not survive the rewrite (spec §9);
//! this is the direct in-process executor that replaces it.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ErrorKind, PipelineError};
use crate::executor::{self, RuntimeContext};
use crate::graph::{Edge, EdgeTarget, Graph, END, START};
use crate::state::State;

/// A record-level error surfaced to the output sink (spec §7 "User-visible
/// failure").
#[derive(Debug, Clone)]
pub struct RecordError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<PipelineError> for RecordError {
    fn from(err: PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// The result of running one record through a graph to completion (or to a
/// record-level fatal).
pub struct RunOutcome {
    pub record: HashMap<String, Value>,
    pub error: Option<RecordError>,
}

/// Run one record through `graph` to completion.
///
/// The runtime is single-threaded per record; callers get concurrency by
/// running many records' graphs concurrently (spec §4.5), not by
/// parallelizing within one run. A `ServerDown` error propagates as-is
/// (spec §7 "Server-down trip" is process-fatal, not record-fatal) rather
/// than being downgraded to a per-record error.
pub async fn run_one(
    graph: &Graph,
    input: HashMap<String, Value>,
    ctx: &RuntimeContext,
) -> RunOutcome {
    let record_id = input.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let mut state = State::from_record(input);
    state.graph_properties = graph.graph_properties.clone();

    let mut current = START.to_string();
    let mut steps = 0usize;

    loop {
        steps += 1;
        if steps > graph.max_steps {
            return RunOutcome {
                record: state.into_record(),
                error: Some(RecordError {
                    kind: ErrorKind::RecordFatal,
                    message: format!("step limit ({}) exceeded", graph.max_steps),
                }),
            };
        }

        let next = match resolve_next(graph, &current, &state, ctx) {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(e) => {
                return RunOutcome {
                    record: state.into_record(),
                    error: Some(e.into()),
                }
            }
        };

        crate::events::emit(
            &ctx.event_handler,
            crate::events::Event::EdgeRouted {
                record_id: record_id.clone(),
                from: current.clone(),
                to: next.clone(),
            },
        );

        if next == END {
            break;
        }

        let node = match graph.nodes.get(&next) {
            Some(node) => node,
            None => {
                return RunOutcome {
                    record: state.into_record(),
                    error: Some(RecordError {
                        kind: ErrorKind::RecordFatal,
                        message: format!("edge resolved to unknown node '{next}'"),
                    }),
                }
            }
        };

        if let Err(e) = executor::execute_node(node, &record_id, &mut state, ctx).await {
            return RunOutcome {
                record: state.into_record(),
                error: Some(e.into()),
            };
        }

        current = next;
    }

    RunOutcome {
        record: state.into_record(),
        error: None,
    }
}

/// Resolve the next node after `from` (which may be `START`). `Ok(None)`
/// means no edge resolves and the run terminates normally; `Err` means the
/// resolved target is unroutable (record-level fatal, spec §7). `Graph::build`
/// guarantees at most one edge per `from`, so only `edges[0]` is ever
/// relevant here.
fn resolve_next(
    graph: &Graph,
    from: &str,
    state: &State,
    ctx: &RuntimeContext,
) -> Result<Option<String>, PipelineError> {
    let edges = graph.edges_from(from);
    let edge: &Edge = match edges.first() {
        Some(edge) => edge,
        None => return Ok(None),
    };
    match &edge.target {
        EdgeTarget::Direct { to } => Ok(Some(to.clone())),
        EdgeTarget::Conditional { condition } => {
            let predicate = ctx.registry.require_predicate(condition)?;
            let target = predicate(state);
            if target != END && !graph.nodes.contains_key(&target) {
                return Err(PipelineError::RecordFatal {
                    node: from.to_string(),
                    message: format!(
                        "condition '{condition}' routed to unknown node '{target}'"
                    ),
                });
            }
            Ok(Some(target))
        }
    }
}
