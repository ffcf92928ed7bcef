use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coerce::trim_newlines;
use crate::{
    tags::{escape_attribute, escape_text, Tag},
    types::{render_parameter, ToolCall},
};

const RESULT_TAG: &str = "tool_result";

/// Outcome of executing a tool outside the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "content", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success(Value),
    Error(String),
}

impl ToolOutcome {
    fn status(&self) -> &'static str {
        match self {
            ToolOutcome::Success(_) => "success",
            ToolOutcome::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: u64,
    pub name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call_id: u64, name: impl Into<String>, value: Value) -> Self {
        Self {
            call_id,
            name: name.into(),
            outcome: ToolOutcome::Success(value),
        }
    }

    pub fn error(call_id: u64, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id,
            name: name.into(),
            outcome: ToolOutcome::Error(message.into()),
        }
    }
}

/// Render a result as the `<tool_result>` block injected into the next turn.
pub fn format_tool_result(result: &ToolResult) -> String {
    let content = match &result.outcome {
        ToolOutcome::Success(Value::String(text)) => text.clone(),
        ToolOutcome::Success(value) => value.to_string(),
        ToolOutcome::Error(message) => message.clone(),
    };
    format!(
        "<{tag} id=\"{id}\" name=\"{name}\" status=\"{status}\">\n{content}\n</{tag}>",
        tag = RESULT_TAG,
        id = result.call_id,
        name = escape_attribute(&result.name),
        status = result.outcome.status(),
        content = escape_text(&content),
    )
}

/// Render several results, one block per line.
pub fn format_tool_results(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(format_tool_result)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a parsed call back into the markup it was parsed from, for
/// replaying assistant turns.
pub fn format_tool_call(call: &ToolCall) -> String {
    let mut out = Tag::ToolCall.open_markup(Some(&call.name));
    out.push('\n');
    for argument in &call.raw_arguments {
        out.push_str(&render_parameter(argument));
        out.push('\n');
    }
    out.push_str(&Tag::ToolCall.close_markup());
    out
}

/// Render a call from JSON arguments. Strings are escaped, objects become
/// nested parameters, arrays are written as JSON.
pub fn render_tool_call(name: &str, arguments: &Map<String, Value>) -> String {
    let mut out = Tag::ToolCall.open_markup(Some(name));
    out.push('\n');
    for (key, value) in arguments {
        out.push_str(&render_json_parameter(key, value));
        out.push('\n');
    }
    out.push_str(&Tag::ToolCall.close_markup());
    out
}

fn render_json_parameter(name: &str, value: &Value) -> String {
    let body = match value {
        Value::String(text) => render_string_body(text),
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(key, value)| render_json_parameter(key, value))
            .collect(),
        other => escape_text(&other.to_string()).into_owned(),
    };
    format!(
        "{}{}{}",
        Tag::Parameter.open_markup(Some(name)),
        body,
        Tag::Parameter.close_markup()
    )
}

/// Coercion strips one newline next to each parameter tag, so a string that
/// starts or ends with one gets a newline of padding on both sides.
fn render_string_body(text: &str) -> String {
    let escaped = escape_text(text);
    if trim_newlines(text).len() == text.len() {
        return escaped.into_owned();
    }
    // A trailing `\r` would merge with a bare `\n` pad into one `\r\n`
    let trailing = if text.ends_with('\r') { "\r\n" } else { "\n" };
    format!("\n{}{}", escaped, trailing)
}
