//! Record state threaded through a graph run.
//!
//! A [`State`] starts as one input record's fields and accumulates output
//! keys as nodes execute. Two reserved fields carry structure the record
//! itself doesn't own: `chat_history` (append-only, spec §3 invariant — no
//! node may rewrite or drop an existing entry) and `graph_properties`
//! (free-form bookkeeping a graph's own lambdas can use, e.g. a running
//! step counter separate from the runtime's own step-limit guard).
//!
//! Generalizes the teacher's `types::PipelineContext` (a flat template-var
//! map) into the richer per-record structure the graph runtime operates on;
//! `prompt::render` now reads against a `State` instead of a `PipelineContext`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// One record's accumulated state as it moves through the graph.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    /// The record's own fields plus any `output_keys` nodes have written.
    pub fields: HashMap<String, Value>,
    /// Append-only conversation history across LLM node invocations.
    pub chat_history: Vec<Message>,
    /// Free-form graph-local bookkeeping, opaque to the runtime.
    pub graph_properties: Value,
}

impl State {
    /// Construct a fresh state from one input record.
    pub fn from_record(record: HashMap<String, Value>) -> Self {
        Self {
            fields: record,
            chat_history: Vec::new(),
            graph_properties: Value::Object(Default::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    /// Merge a node's output keys into the record fields. Later writes for
    /// the same key overwrite earlier ones — only `chat_history` is
    /// append-only.
    pub fn merge(&mut self, updates: HashMap<String, Value>) {
        self.fields.extend(updates);
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Append one message to the chat history. Never truncates or replaces
    /// existing entries (spec §3 "append-only" invariant).
    pub fn push_message(&mut self, message: Message) {
        self.chat_history.push(message);
    }

    /// The record's fields plus any declared `output_keys`, suitable for
    /// writing to the output sink. `chat_history`/`graph_properties` are
    /// intentionally excluded unless a node explicitly copies them into a
    /// regular field.
    pub fn into_record(self) -> HashMap<String, Value> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_record_preserves_fields() {
        let mut record = HashMap::new();
        record.insert("id".to_string(), json!("r1"));
        let state = State::from_record(record);
        assert_eq!(state.get_str("id"), Some("r1"));
        assert!(state.chat_history.is_empty());
    }

    #[test]
    fn test_merge_overwrites_same_key() {
        let mut state = State::default();
        state.set("a", json!(1));
        let mut updates = HashMap::new();
        updates.insert("a".to_string(), json!(2));
        updates.insert("b".to_string(), json!(3));
        state.merge(updates);
        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_chat_history_append_only() {
        let mut state = State::default();
        state.push_message(Message::user("hi"));
        state.push_message(Message::assistant("hello"));
        assert_eq!(state.chat_history.len(), 2);
        assert_eq!(state.chat_history[0].text(), "hi");
    }
}
