//! String list extraction from LLM responses (generalized `parse_tags`).
//!
//! This module provides [`parse_string_list`] (the successor to `ollama-vision`'s
//! `parse_tags`) and [`parse_string_list_raw`] for general-purpose list extraction.

use std::collections::HashSet;

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{extract_code_block, find_bracketed, preprocess};
use crate::output_parser::repair::try_repair_json;

/// Parse an LLM response into a cleaned list of strings.
///
/// Cleaning: lowercase, trim, deduplicate, filter empties, filter >50 chars.
/// This is the direct successor to `ollama-vision`'s `parse_tags`.
///
/// Strategies (in order):
/// 1. Direct JSON array
/// 2. JSON object with common list keys ("tags", "items", "results", "list")
/// 3. Markdown code block -> JSON array/object
/// 4. Bracket-matched JSON array
/// 5. JSON repair on best candidate
/// 6. Numbered/bulleted list extraction
/// 7. Comma-separated fallback
pub fn parse_string_list(response: &str) -> Result<Vec<String>, ParseError> {
    let items = parse_string_list_inner(response)?;
    Ok(clean_tags(items))
}

/// Parse into a list without tag-specific cleaning.
///
/// No forced lowercase, no length filter, no dedup.
/// For general-purpose list extraction from LLM responses.
pub fn parse_string_list_raw(response: &str) -> Result<Vec<String>, ParseError> {
    let items = parse_string_list_inner(response)?;
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Shared inner logic for both list parsers (before cleaning).
fn parse_string_list_inner(response: &str) -> Result<Vec<String>, ParseError> {
    let trimmed = response.trim();

    if trimmed.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    // Strategy 1: Direct JSON array
    if let Ok(arr) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Ok(arr);
    }

    // Preprocess: strip think tags, trim
    let cleaned = preprocess(trimmed);

    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    // Strategy 1b: JSON array after preprocessing
    if let Ok(arr) = serde_json::from_str::<Vec<String>>(&cleaned) {
        return Ok(arr);
    }

    // Strategy 2: JSON object with common list keys
    if let Some(tags) = try_extract_list_from_object(&cleaned) {
        return Ok(tags);
    }

    // Strategy 3: Markdown code block extraction
    if let Some(tags) = extract_list_from_code_block(&cleaned) {
        return Ok(tags);
    }

    // Strategy 4: Bracket-matched JSON array
    if let Some(bracket_str) = find_bracketed(&cleaned, '[', ']') {
        if let Ok(arr) = serde_json::from_str::<Vec<String>>(bracket_str) {
            return Ok(arr);
        }
        // Try repair on the bracketed substring
        if let Some(repaired) = try_repair_json(bracket_str) {
            if let Ok(arr) = serde_json::from_str::<Vec<String>>(&repaired) {
                return Ok(arr);
            }
        }
    }

    // Strategy 5: Repair on the full cleaned text
    if let Some(repaired) = try_repair_json(&cleaned) {
        if let Ok(arr) = serde_json::from_str::<Vec<String>>(&repaired) {
            return Ok(arr);
        }
        if let Some(tags) = try_extract_list_from_object(&repaired) {
            return Ok(tags);
        }
    }

    // Strategy 6: Numbered/bulleted list extraction
    if let Some(tags) = extract_from_list(&cleaned) {
        return Ok(tags);
    }

    // Strategy 7: Comma-separated fallback
    let tags: Vec<String> = cleaned
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if tags.is_empty() {
        return Err(ParseError::Unparseable {
            expected_format: "string list",
            text: truncate(&cleaned, 200),
        });
    }

    Ok(tags)
}

/// Try parsing as a JSON object and extracting an array from common keys.
fn try_extract_list_from_object(text: &str) -> Option<Vec<String>> {
    let val: serde_json::Value = serde_json::from_str(text).ok()?;
    for key in ["tags", "items", "results", "list"] {
        if let Some(arr) = val.get(key).and_then(|v| v.as_array()) {
            let tags: Vec<String> = arr
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect();
            if !tags.is_empty() {
                return Some(tags);
            }
        }
    }
    None
}

/// Extract a list from a markdown code block.
fn extract_list_from_code_block(text: &str) -> Option<Vec<String>> {
    // Try ```json blocks first, then any block
    if let Some((lang, content)) = extract_code_block(text) {
        // Try direct array parse
        if let Ok(arr) = serde_json::from_str::<Vec<String>>(content) {
            return Some(arr);
        }
        // Try object with list keys
        if let Some(tags) = try_extract_list_from_object(content) {
            return Some(tags);
        }
        // If it was a json block and still failed, try repair
        if lang == Some("json") {
            if let Some(repaired) = try_repair_json(content) {
                if let Ok(arr) = serde_json::from_str::<Vec<String>>(&repaired) {
                    return Some(arr);
                }
            }
        }
    }
    None
}

/// Extract tags from numbered or bulleted lists.
fn extract_from_list(text: &str) -> Option<Vec<String>> {
    let lines: Vec<&str> = text.lines().collect();
    let list_items: Vec<String> = lines
        .iter()
        .filter_map(|line| {
            let trimmed = line.trim();
            // Numbered: "1. tag", "2) tag"
            if let Some(rest) = trimmed
                .strip_prefix(|c: char| c.is_ascii_digit())
                .and_then(|s| {
                    // Handle multi-digit numbers
                    let s = s.trim_start_matches(|c: char| c.is_ascii_digit());
                    s.strip_prefix('.').or_else(|| s.strip_prefix(')'))
                })
            {
                let tag = rest.trim().trim_matches('"').trim();
                if !tag.is_empty() {
                    return Some(tag.to_string());
                }
            }
            // Bulleted: "- tag", "* tag", "• tag"
            for prefix in ["-", "*", "\u{2022}"] {
                if let Some(rest) = trimmed.strip_prefix(prefix) {
                    let tag = rest.trim().trim_matches('"').trim();
                    if !tag.is_empty() {
                        return Some(tag.to_string());
                    }
                }
            }
            None
        })
        .collect();

    if list_items.len() >= 2 {
        Some(list_items)
    } else {
        None
    }
}

/// Clean a list of tags: lowercase, trim, deduplicate, filter empties and long items.
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && t.len() < 50 && seen.insert(t.clone()))
        .collect()
}
