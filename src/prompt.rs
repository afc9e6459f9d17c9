//! Prompt template rendering against a record's [`State`].
//!
//! Generalizes the teacher's flat `PipelineContext` substitution (a single
//! `{input}` placeholder plus a string map) to render directly against a
//! node's `State`: any top-level field becomes a `{key}` placeholder, scalar
//! values are substituted as their plain text, and non-scalar values (object,
//! array) are substituted as compact JSON so a template author can still
//! reference nested structure produced by earlier nodes.

use serde_json::Value;

use crate::message::{Message, Role};
use crate::state::State;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Render a JSON field value as the text substituted into a `{key}` placeholder.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Build a prompt string with `{key}` placeholders substituted from `state`'s
/// fields. Use `{{` / `}}` to insert literal braces (needed when a template
/// itself demonstrates JSON output format).
///
/// # Example
///
/// ```
/// use sygra_core::state::State;
/// use sygra_core::prompt::render;
/// use serde_json::json;
///
/// let mut state = State::default();
/// state.set("name", json!("Alice"));
/// let result = render("Hello {name}, here is JSON: {{\"key\": \"val\"}}", &state);
/// assert_eq!(result, r#"Hello Alice, here is JSON: {"key": "val"}"#);
/// ```
pub fn render(template: &str, state: &State) -> String {
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    for (key, value) in &state.fields {
        let placeholder = format!("{{{}}}", key);
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &field_text(value));
        }
    }

    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered = rendered.replace(ESCAPE_SENTINEL_CLOSE, "}");
    rendered
}

/// Render a node's configured `prompt` (a list of role-tagged templates,
/// spec §6 "Graph config") against `state` into canonical [`Message`]s.
pub fn render_messages(templates: &[(Role, String)], state: &State) -> Vec<Message> {
    templates
        .iter()
        .map(|(role, template)| Message {
            role: *role,
            content: render(template, state).into(),
        })
        .collect()
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}
