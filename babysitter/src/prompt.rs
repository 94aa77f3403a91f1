//! Prompt utilities: template rendering and first-JSON extraction
//!
//! Agent commands take a rendered prompt on stdin and answer with free-form
//! text that contains a JSON value somewhere in it, usually wrapped in prose
//! or a code fence.

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Render a prompt template
///
/// Substitutes `{{task}}` with the task prompt and `{{context}}` with the
/// pretty-printed JSON of the task input.
pub fn render_prompt(template: &str, task: &str, context: &Value) -> Result<String> {
    let context_json =
        serde_json::to_string_pretty(context).context("Failed to serialize prompt context")?;
    Ok(template
        .replace("{{task}}", task)
        .replace("{{context}}", &context_json))
}

/// Extract the first JSON object or array from free-form text
///
/// From each `{` or `[` candidate, the longest parseable chunk wins, so an
/// object embedding nested braces is taken whole rather than truncated at
/// the first closer.
pub fn extract_first_json(text: &str) -> Result<Value> {
    for (start, _) in text.match_indices(['{', '[']) {
        let closers: Vec<usize> = text[start..]
            .match_indices(['}', ']'])
            .map(|(i, _)| start + i + 1)
            .collect();
        for end in closers.into_iter().rev() {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                return Ok(value);
            }
        }
    }

    bail!("No JSON object or array found in agent output")
}
