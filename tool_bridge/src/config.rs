//! Parser configuration.
//!
//! Bounds every buffer the parser owns so that a misbehaving upstream cannot
//! force unbounded memory growth.

use serde::{Deserialize, Serialize};

use crate::errors::{ParserError, ParserResult};

/// Tunables for a parse session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Bytes of plain, thinking or argument text buffered before a delta is emitted.
    pub flush_threshold: usize,

    /// Longest attribute value (tool or parameter name) accepted inside a tag.
    /// Together with the longest tag prefix this bounds scanner look-ahead.
    pub max_attribute_bytes: usize,

    /// Maximum accumulated argument text for a single tool call.
    pub max_argument_bytes: usize,

    /// Maximum nesting of `<parameter>` tags inside one tool call.
    pub max_parameter_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 64,
            max_attribute_bytes: 256,
            max_argument_bytes: 1024 * 1024, // 1MB
            max_parameter_depth: 8,
        }
    }
}

impl ParserConfig {
    /// Builder-style setter for the flush threshold.
    pub fn with_flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    pub fn with_max_argument_bytes(mut self, bytes: usize) -> Self {
        self.max_argument_bytes = bytes;
        self
    }

    pub fn with_max_attribute_bytes(mut self, bytes: usize) -> Self {
        self.max_attribute_bytes = bytes;
        self
    }

    pub fn with_max_parameter_depth(mut self, depth: usize) -> Self {
        self.max_parameter_depth = depth;
        self
    }

    /// Reject configurations the parser cannot operate under.
    pub fn validate(&self) -> ParserResult<()> {
        if self.flush_threshold == 0 {
            return Err(ParserError::Config(
                "flush_threshold must be greater than 0".to_string(),
            ));
        }
        if self.max_attribute_bytes == 0 {
            return Err(ParserError::Config(
                "max_attribute_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_argument_bytes == 0 {
            return Err(ParserError::Config(
                "max_argument_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_parameter_depth == 0 {
            return Err(ParserError::Config(
                "max_parameter_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ParserConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = ParserConfig::default().with_flush_threshold(0);
        assert!(matches!(config.validate(), Err(ParserError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ParserConfig = serde_json::from_str(r#"{"flush_threshold": 16}"#).unwrap();
        assert_eq!(config.flush_threshold, 16);
        assert_eq!(config.max_parameter_depth, 8);
        assert_eq!(config.max_argument_bytes, 1024 * 1024);
    }
}
