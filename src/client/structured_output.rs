//! Structured-output coercion: native guided decoding with an instruction-
//! based fallback.
//!
//! Grounded in `BaseCustomModel._handle_structured_output` /
//! `_generate_native_structured_output` / `_generate_fallback_structured_output`
//! in the original Python source. When the adapter reports native support
//! (spec §4.1 `native_structured_output_supported`), the schema rides along
//! on the request and the response is parsed directly. Otherwise the schema
//! is rendered as format instructions appended to the prompt and the call is
//! retried as plain text, parsed with the same JSON-extraction pipeline used
//! for unstructured output.

use serde_json::Value;

use crate::adapter::{LlmRequest, ModelAdapter};
use crate::error::{PipelineError, Result};
use crate::message::Message;
use crate::output_parser::parse_json_value;
use reqwest::Client;

/// Render a JSON schema as plain-language format instructions, appended to a
/// request when the adapter cannot honor the schema natively.
pub fn format_instructions(schema: &Value) -> String {
    format!(
        "Respond with a single JSON value that conforms exactly to this JSON Schema. \
         Do not include any explanation or surrounding text, only the JSON value.\n\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

/// Validate that a parsed value has at least the schema's declared required
/// top-level properties. This is a lightweight check, not full JSON Schema
/// validation — sufficient to catch a model silently dropping fields.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<()> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let Value::Object(obj) = value else {
        return Err(PipelineError::Other(
            "structured output schema violation: expected a JSON object".into(),
        ));
    };
    for key in required {
        let Some(key) = key.as_str() else { continue };
        if !obj.contains_key(key) {
            return Err(PipelineError::Other(format!(
                "structured output schema violation: missing required field '{key}'"
            )));
        }
    }
    Ok(())
}

/// Attempt structured-output generation for one call, using the adapter's
/// native path when available and falling back to instruction-based coercion
/// otherwise. Returns the raw text and the parsed, schema-checked value.
///
/// On any native-path failure (HTTP error, JSON parse failure, schema
/// violation) this falls through into the instruction-based fallback rather
/// than returning an error — the two paths are attempts at the same logical
/// call, not alternatives the caller picks between. If the fallback's own
/// response also fails to parse or validate, the raw text is returned as-is
/// with no error, so a structured-output call never surfaces an inconsistent
/// half-parsed state to its caller.
pub async fn generate(
    adapter: &dyn ModelAdapter,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    schema: &Value,
) -> Result<(String, Value)> {
    if adapter.native_structured_output_supported() {
        let mut native_request = request.clone();
        native_request.schema = Some(schema.clone());
        if let Ok(response) = adapter.complete(client, base_url, &native_request).await {
            if let Ok(value) = parse_json_value(&response.text) {
                if validate_against_schema(&value, schema).is_ok() {
                    return Ok((response.text, value));
                }
            }
        }
        tracing::debug!(
            model = %request.model,
            "native structured output failed or violated schema, falling back to instruction-based prompting"
        );
    }

    let mut fallback_request = request.clone();
    fallback_request.schema = None;
    fallback_request.messages.push(Message::user(format_instructions(schema)));

    let response = adapter.complete(client, base_url, &fallback_request).await?;
    match parse_json_value(&response.text).ok().filter(|v| validate_against_schema(v, schema).is_ok()) {
        Some(value) => Ok((response.text, value)),
        None => {
            tracing::warn!(
                model = %request.model,
                "structured output fallback exhausted, returning raw text with status 200"
            );
            Ok((response.text.clone(), Value::String(response.text)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{GenerationParams, MockAdapter};
    use serde_json::json;

    fn test_request() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            system_prompt: None,
            messages: vec![Message::user("describe the weather")],
            params: GenerationParams::default(),
            schema: None,
            stream: false,
        }
    }

    #[test]
    fn test_format_instructions_embeds_schema() {
        let schema = json!({"type": "object", "required": ["summary"]});
        let text = format_instructions(&schema);
        assert!(text.contains("summary"));
        assert!(text.to_lowercase().contains("json"));
    }

    #[test]
    fn test_validate_against_schema_missing_field() {
        let schema = json!({"required": ["summary"]});
        let value = json!({"other": 1});
        let err = validate_against_schema(&value, &schema).unwrap_err();
        assert!(err.to_string().contains("summary"));
    }

    #[test]
    fn test_validate_against_schema_ok() {
        let schema = json!({"required": ["summary"]});
        let value = json!({"summary": "sunny"});
        assert!(validate_against_schema(&value, &schema).is_ok());
    }

    #[tokio::test]
    async fn test_generate_native_path() {
        let adapter = MockAdapter::fixed(r#"{"summary": "sunny"}"#).with_native_structured_output(true);
        let client = Client::new();
        let schema = json!({"required": ["summary"]});
        let (text, value) = generate(&adapter, &client, "http://unused", &test_request(), &schema)
            .await
            .unwrap();
        assert_eq!(text, r#"{"summary": "sunny"}"#);
        assert_eq!(value["summary"], "sunny");
    }

    #[tokio::test]
    async fn test_generate_fallback_path() {
        let adapter = MockAdapter::fixed(r#"{"summary": "cloudy"}"#);
        let client = Client::new();
        let schema = json!({"required": ["summary"]});
        let (_, value) = generate(&adapter, &client, "http://unused", &test_request(), &schema)
            .await
            .unwrap();
        assert_eq!(value["summary"], "cloudy");
    }

    #[tokio::test]
    async fn test_generate_native_schema_violation_falls_back() {
        // Native path returns valid JSON but missing the required field;
        // generate() must fall through to the instruction-based fallback
        // rather than surfacing the schema violation as an error.
        let adapter = MockAdapter::new(vec![r#"{"other": 1}"#.into(), r#"{"summary": "ok"}"#.into()])
            .with_native_structured_output(true);
        let client = Client::new();
        let schema = json!({"required": ["summary"]});
        let (text, value) = generate(&adapter, &client, "http://unused", &test_request(), &schema)
            .await
            .unwrap();
        assert_eq!(text, r#"{"summary": "ok"}"#);
        assert_eq!(value["summary"], "ok");
    }

    #[tokio::test]
    async fn test_generate_fallback_exhausted_returns_raw_text() {
        // Fallback response doesn't parse as JSON at all; generate() must
        // still succeed, returning the raw text rather than an error.
        let adapter = MockAdapter::fixed("the weather is nice today");
        let client = Client::new();
        let schema = json!({"required": ["summary"]});
        let (text, value) = generate(&adapter, &client, "http://unused", &test_request(), &schema)
            .await
            .unwrap();
        assert_eq!(text, "the weather is nice today");
        assert_eq!(value, Value::String("the weather is nice today".into()));
    }
}
