//! YAML extraction from LLM responses.
//!
//! Provides [`parse_yaml`] for extracting typed structs from YAML in LLM
//! output.

use serde::de::DeserializeOwned;

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{extract_code_block, extract_code_block_for, preprocess};

/// Parse an LLM response containing YAML into a typed struct.
///
/// Strategies:
/// 1. Direct YAML parse on preprocessed text
/// 2. Extract from `` ```yaml `` code block
/// 3. Extract from any code block -> try as YAML
///
/// # Examples
///
/// ```ignore
/// use serde::Deserialize;
/// use sygra_core::output_parser::parse_yaml;
///
/// #[derive(Deserialize)]
/// struct Person { name: String, age: u32 }
///
/// let response = "name: Josh\nage: 30";
/// let person: Person = parse_yaml(response).unwrap();
/// assert_eq!(person.name, "Josh");
/// ```
pub fn parse_yaml<T: DeserializeOwned>(response: &str) -> Result<T, ParseError> {
    let cleaned = preprocess(response);

    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    // Strategy 1: Direct YAML parse
    if let Ok(val) = serde_yaml::from_str::<T>(&cleaned) {
        return Ok(val);
    }

    // Strategy 2: Extract from ```yaml code block
    if let Some(content) = extract_code_block_for(&cleaned, "yaml") {
        if let Ok(val) = serde_yaml::from_str::<T>(content) {
            return Ok(val);
        }
    }

    // Strategy 3: Extract from any code block
    if let Some((_lang, content)) = extract_code_block(&cleaned) {
        if let Ok(val) = serde_yaml::from_str::<T>(content) {
            return Ok(val);
        }
    }

    Err(ParseError::Unparseable {
        expected_format: "YAML",
        text: truncate(&cleaned, 200),
    })
}
