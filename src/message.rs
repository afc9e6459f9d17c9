//! Canonical message shapes threaded between the Graph Runtime and the Model Client.
//!
//! Generalizes the teacher's `backend::{ChatMessage, Role}` pair (plain text only)
//! into the richer `{role, content: string|segments[]}` shape of the data model,
//! while keeping a cheap `text()` accessor so adapters that only understand plain
//! text (the common case) don't need to match on segments.

use serde::{Deserialize, Serialize};

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One piece of a message's content.
///
/// Image/audio segments carry a data URL. Per the data-model invariant,
/// generated data URLs are materialized to files only after a record
/// completes — segments here are transient, in-memory references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    ImageDataUrl { url: String },
    AudioDataUrl { url: String },
    ToolCall { id: String, name: String, arguments: serde_json::Value },
    ToolResult { tool_call_id: String, content: String },
}

/// A message's content: a plain string, or a sequence of typed segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Segments(Vec<Segment>),
}

impl Content {
    /// Flatten to plain text, concatenating any text segments.
    ///
    /// Non-text segments (images, audio, tool calls/results) are dropped from
    /// the flattened view; adapters that need them inspect `Content::Segments`
    /// directly.
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Segments(segs) => segs
                .iter()
                .filter_map(|s| match s {
                    Segment::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_segments() {
        let content = Content::Segments(vec![
            Segment::Text { text: "a".into() },
            Segment::ImageDataUrl { url: "data:...".into() },
            Segment::Text { text: "b".into() },
        ]);
        assert_eq!(content.text(), "ab");
    }

    #[test]
    fn test_plain_text_roundtrip() {
        let m = Message::user("hello");
        assert_eq!(m.text(), "hello");
        assert_eq!(m.role, Role::User);
    }
}
