use thiserror::Error;

/// Result type for tool bridge operations
pub type ParserResult<T> = Result<T, ParserError>;

/// Errors that can occur while extracting or bridging tool calls
#[derive(Debug, Error)]
pub enum ParserError {
    /// Inconsistent tag nesting, an unterminated block at end of stream,
    /// or an internal buffer bound exceeded. Fatal to the session.
    #[error("Malformed stream: {0}")]
    MalformedStream(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid argument '{parameter}': {reason}")]
    InvalidArgument { parameter: String, reason: String },

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ParserError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedStream(message.into())
    }

    pub(crate) fn invalid_argument(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error terminates the parse session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedStream(_) | Self::Upstream(_))
    }
}
