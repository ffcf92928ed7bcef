//! Streaming Tool-Call Bridge
//!
//! Gives a text-only model backend tool-calling by agreeing on a tag-delimited
//! format and recovering structured calls from the output stream:
//! - Tool schemas are rendered into a system prompt that spells the tags
//! - A chunk-invariant scanner and classifier split the stream into text,
//!   thinking and tool-call blocks
//! - Completed calls are coerced against their declared parameter types
//! - Tool results are formatted back into the tag format for the next turn

pub mod classifier;
pub mod config;
pub mod emitter;
pub mod errors;
pub mod scanner;
pub mod schema;
pub mod stream;
pub mod tags;
pub mod types;

// Re-export commonly used types
pub use config::ParserConfig;
pub use emitter::{parse_complete, StreamParser};
pub use errors::{ParserError, ParserResult};
pub use schema::{
    build_system_prompt, coerce_arguments, describe_tools, format_tool_call, format_tool_result,
    format_tool_results, FunctionDefinition, ParameterKind, ParameterSpec, PromptOptions,
    ToolDefinition, ToolOutcome, ToolResult, ToolSet,
};
pub use stream::EventStream;
pub use types::{
    CallError, FinishReason, ParsedResponse, RawArgument, RawValue, StreamEvent, ToolCall, Usage,
};
