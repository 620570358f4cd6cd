//! Recovery of structured data from free-form reasoning-engine output.
//!
//! Models wrap JSON in prose, markdown fences, or both. [`extract_json`]
//! tries, in order:
//!
//! 1. fenced blocks (`` ```json `` in any case, or untagged) whose body is a
//!    `{...}` span;
//! 2. a balanced-brace scan starting from every `{` in the text;
//!
//! and returns `None` when nothing parses to a JSON object.
//!
//! The brace scan counts every `{` and `}`, including ones inside string
//! literals. A quoted brace can therefore end a candidate early; that
//! candidate fails to parse and the scan moves on to the next `{`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Marker line introducing a free-text action list.
const ACTIONS_MARKER: &str = "suggested actions";

/// Maximum number of actions harvested from free text.
pub const MAX_HARVESTED_ACTIONS: usize = 10;

fn fence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)```(?i:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Recover the first JSON object embedded in `text`.
///
/// Never fails: `None` means no structured content is available.
pub fn extract_json(text: &str) -> Option<Map<String, Value>> {
    if let Some(found) = from_fenced_block(text) {
        return Some(found);
    }
    if let Some(found) = from_balanced_braces(text) {
        return Some(found);
    }
    debug!(len = text.len(), "no JSON object found in response");
    None
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn from_fenced_block(text: &str) -> Option<Map<String, Value>> {
    let pattern = fence_pattern()?;
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| parse_object(body.as_str()))
}

fn from_balanced_braces(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{')
        .filter_map(|(start, _)| balanced_span(text, start))
        .find_map(parse_object)
}

/// The substring from the `{` at `start` to the brace that closes it.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth: usize = 0;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth = depth.saturating_add(1),
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start.saturating_add(offset);
                    return text.get(start..=end);
                }
            }
            _ => {}
        }
    }
    None
}

/// Harvest free-text suggested actions.
///
/// Finds the first line containing "suggested actions" (any case) and
/// collects the bullet lines (`-`, `*`, `•`, `1.`, `1)`) that follow, up to
/// the next blank line or [`MAX_HARVESTED_ACTIONS`] items. Other lines in
/// between are skipped.
pub fn extract_suggested_actions(text: &str) -> Vec<String> {
    let mut lines = text.lines();
    if !lines
        .by_ref()
        .any(|line| line.to_lowercase().contains(ACTIONS_MARKER))
    {
        return Vec::new();
    }

    let mut actions = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || actions.len() >= MAX_HARVESTED_ACTIONS {
            break;
        }
        if let Some(item) = strip_bullet(trimmed) {
            if !item.is_empty() {
                actions.push(item.to_owned());
            }
        }
    }
    actions
}

fn strip_bullet(line: &str) -> Option<&str> {
    for bullet in ['-', '*', '•'] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .map(str::trim)
}

/// Collect action descriptions from a `suggested_actions` JSON array.
///
/// Accepts plain strings and objects carrying a `description`; returns
/// `None` when the value is not an array.
pub fn actions_from_json(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_owned()),
                Value::Object(map) => map
                    .get("description")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_owned()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
