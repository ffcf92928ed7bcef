use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tags;

/// Event delivered to the consumer, in the order its content occurred in the
/// logical stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        text: String,
    },
    ToolCallStart {
        id: u64,
        name: String,
    },
    /// Raw parameter text as it arrived, keyed by parameter path
    /// (`outer.inner` for nested parameters)
    ToolCallArgumentDelta {
        id: u64,
        parameter: String,
        text: String,
    },
    ToolCallEnd {
        id: u64,
        name: String,
        /// Coerced arguments object
        arguments: Value,
        /// Decoded parameter text, preserved even when coercion fails
        raw_arguments: Vec<RawArgument>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<CallError>,
    },
    Finish {
        reason: FinishReason,
        usage: Usage,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event ends the sequence.
    pub fn is_finish(&self) -> bool {
        matches!(self, StreamEvent::Finish { .. })
    }

    /// Tool call id this event refers to, if any.
    pub fn tool_call_id(&self) -> Option<u64> {
        match self {
            StreamEvent::ToolCallStart { id, .. }
            | StreamEvent::ToolCallArgumentDelta { id, .. }
            | StreamEvent::ToolCallEnd { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Why the session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Clean end of stream, no tool calls observed
    Stop,
    /// Clean end of stream after at least one tool call
    ToolCalls,
    /// Session terminated by a fatal error
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
        }
    }
}

/// Content accounting for a session. Depends only on the logical stream,
/// never on how it was chunked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Bytes emitted as text deltas
    pub text_bytes: u64,
    /// Bytes emitted as thinking deltas
    pub thinking_bytes: u64,
    /// Bytes of raw parameter text received
    pub argument_bytes: u64,
    /// Completed tool calls
    pub tool_calls: u64,
}

/// Non-fatal problem attached to a completed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallError {
    /// The call names a tool that was not declared for this session
    UnknownTool,
    /// A parameter value failed coercion to its declared type
    InvalidArgument { parameter: String, reason: String },
}

/// Parameter text reconstructed from `<parameter>` tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArgument {
    pub name: String,
    pub value: RawValue,
}

impl RawArgument {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: RawValue::Text(value.into()),
        }
    }

    pub fn nested(name: impl Into<String>, children: Vec<RawArgument>) -> Self {
        Self {
            name: name.into(),
            value: RawValue::Nested(children),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Entity-decoded text content
    Text(String),
    /// Child `<parameter>` tags
    Nested(Vec<RawArgument>),
}

impl RawValue {
    /// JSON view with every leaf left as a string.
    pub fn to_json(&self) -> Value {
        match self {
            RawValue::Text(text) => Value::String(text.clone()),
            RawValue::Nested(children) => Value::Object(raw_arguments_to_map(children)),
        }
    }

    /// Render back into parameter body markup.
    pub(crate) fn to_markup(&self) -> String {
        match self {
            RawValue::Text(text) => tags::escape_text(text).into_owned(),
            RawValue::Nested(children) => children.iter().map(render_parameter).collect(),
        }
    }
}

pub(crate) fn render_parameter(argument: &RawArgument) -> String {
    format!(
        "{}{}{}",
        tags::Tag::Parameter.open_markup(Some(&argument.name)),
        argument.value.to_markup(),
        tags::Tag::Parameter.close_markup()
    )
}

/// Uncoerced view of raw arguments.
pub fn raw_arguments_to_map(arguments: &[RawArgument]) -> Map<String, Value> {
    arguments
        .iter()
        .map(|arg| (arg.name.clone(), arg.value.to_json()))
        .collect()
}

/// A tool invocation extracted from the stream. The bridge never executes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: u64,
    pub name: String,
    /// Coerced arguments object
    pub arguments: Value,
    pub raw_arguments: Vec<RawArgument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CallError>,
}

impl ToolCall {
    /// Arguments serialized as a JSON string, the shape most tool-calling
    /// APIs expect.
    pub fn arguments_json(&self) -> String {
        self.arguments.to_string()
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Final state of a fully consumed event sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Concatenated text deltas
    pub text: String,
    /// Concatenated thinking deltas
    pub thinking: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
    pub error: Option<String>,
}

impl ParsedResponse {
    /// Aggregate an event sequence.
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = StreamEvent>,
    {
        let mut response = ParsedResponse::default();
        for event in events {
            match event {
                StreamEvent::TextDelta { text } => response.text.push_str(&text),
                StreamEvent::ThinkingDelta { text } => response.thinking.push_str(&text),
                StreamEvent::ToolCallStart { .. } | StreamEvent::ToolCallArgumentDelta { .. } => {}
                StreamEvent::ToolCallEnd {
                    id,
                    name,
                    arguments,
                    raw_arguments,
                    error,
                } => response.tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                    raw_arguments,
                    error,
                }),
                StreamEvent::Finish { reason, usage } => {
                    response.finish_reason = Some(reason);
                    response.usage = usage;
                }
                StreamEvent::Error { message } => response.error = Some(message),
            }
        }
        response
    }
}
