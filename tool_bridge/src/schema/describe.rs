use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ParameterSpec, ToolDefinition, ToolSet};
use crate::tags::{escape_attribute, escape_text, Tag};

/// Options for the generated system prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    /// When set, the backend is asked to reason inside `<thinking>` within
    /// roughly this many tokens
    pub thinking_budget: Option<u32>,
}

/// Render the tool set as a deterministic `<tools>` block, tools and
/// parameters in declaration order.
pub fn describe_tools(tools: &ToolSet) -> String {
    let mut out = String::from("<tools>\n");
    for tool in tools.iter() {
        describe_tool(tool, &mut out);
    }
    out.push_str("</tools>");
    out
}

fn describe_tool(tool: &ToolDefinition, out: &mut String) {
    let _ = writeln!(out, "<tool name=\"{}\">", escape_attribute(&tool.name));
    if !tool.description.is_empty() {
        let _ = writeln!(
            out,
            "<description>{}</description>",
            escape_text(&tool.description)
        );
    }
    if tool.parameters.is_empty() {
        out.push_str("<parameters/>\n");
    } else {
        out.push_str("<parameters>\n");
        for parameter in &tool.parameters {
            describe_parameter(parameter, out);
        }
        out.push_str("</parameters>\n");
    }
    out.push_str("</tool>\n");
}

fn describe_parameter(parameter: &ParameterSpec, out: &mut String) {
    let _ = write!(
        out,
        "<param name=\"{}\" type=\"{}\" required=\"{}\"",
        escape_attribute(&parameter.name),
        parameter.kind.as_str(),
        parameter.required
    );
    if let Some(values) = &parameter.enum_values {
        let joined = values
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("|");
        let _ = write!(out, " enum=\"{}\"", escape_attribute(&joined));
    }
    if let Some(description) = &parameter.description {
        let _ = write!(out, " description=\"{}\"", escape_attribute(description));
    }

    if parameter.properties.is_empty() {
        out.push_str("/>\n");
    } else {
        out.push_str(">\n");
        for property in &parameter.properties {
            describe_parameter(property, out);
        }
        out.push_str("</param>\n");
    }
}

/// Build the system prompt instructing the backend how to call tools.
pub fn build_system_prompt(tools: &ToolSet, options: &PromptOptions) -> String {
    let mut prompt = String::new();

    if let Some(budget) = options.thinking_budget {
        let _ = write!(
            prompt,
            "Before answering, think step by step inside {open}...{close}. \
             Keep your reasoning under {budget} tokens. \
             Your reasoning is not shown to the user.\n\n",
            open = Tag::Thinking.open_markup(None),
            close = Tag::Thinking.close_markup(),
            budget = budget,
        );
    }

    if tools.is_empty() {
        prompt.push_str("No tools are available. Answer directly.");
        return prompt;
    }

    prompt.push_str("You can call the following tools:\n\n");
    prompt.push_str(&describe_tools(tools));
    let _ = write!(
        prompt,
        "\n\nTo call a tool, write exactly:\n\
         {call_open}\n\
         {param_open}value{param_close}\n\
         {call_close}\n\n\
         Use one {param_tag} tag per argument. Escape <, > and & in values as \
         &lt;, &gt; and &amp;. For object arguments either nest {param_tag} \
         tags or write the value as JSON; write array arguments as JSON. \
         You may make several calls in one reply. After your calls, stop and \
         wait: each result is returned to you inside a <tool_result> tag.",
        call_open = Tag::ToolCall.open_markup(Some("TOOL_NAME")),
        param_open = Tag::Parameter.open_markup(Some("PARAMETER_NAME")),
        param_close = Tag::Parameter.close_markup(),
        call_close = Tag::ToolCall.close_markup(),
        param_tag = Tag::Parameter.open_markup(None),
    );
    prompt
}
