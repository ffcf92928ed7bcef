//! Block classifier: the state machine over scanner signals.
//!
//! ```text
//! Plain ──<thinking>──▶ Thinking ──</thinking>──▶ Plain
//! Plain ──<tool_call>──▶ ToolCall ──</tool_call>──▶ Plain
//!                        ToolCall ──<parameter>──▶ ToolParameter ──</parameter>──▶ ToolCall
//! ```
//!
//! Plain and thinking text is flushed in fixed-size pieces and at every block
//! boundary, never at chunk boundaries, so the output depends only on the
//! logical stream.

use tracing::debug;

use crate::{
    config::ParserConfig,
    errors::{ParserError, ParserResult},
    scanner::Signal,
    tags::{self, Tag},
    types::{RawArgument, RawValue},
};

/// Classification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Plain,
    Thinking,
    ToolCall,
    ToolParameter,
}

/// Classified content, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(String),
    Thinking(String),
    CallOpen {
        name: String,
    },
    ArgumentDelta {
        parameter: String,
        text: String,
    },
    CallClose {
        name: String,
        arguments: Vec<RawArgument>,
    },
}

/// One open `<parameter>` tag.
#[derive(Debug, Clone)]
struct ParameterFrame {
    name: String,
    text: String,
    children: Vec<RawArgument>,
}

impl ParameterFrame {
    fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            children: Vec::new(),
        }
    }

    fn into_argument(self) -> RawArgument {
        if self.children.is_empty() {
            return RawArgument {
                name: self.name,
                value: RawValue::Text(tags::unescape(&self.text).into_owned()),
            };
        }
        if !self.text.trim().is_empty() {
            debug!(
                parameter = %self.name,
                "Dropping text mixed with nested parameters"
            );
        }
        RawArgument {
            name: self.name,
            value: RawValue::Nested(self.children),
        }
    }
}

/// The tool call currently being assembled.
#[derive(Debug, Clone)]
struct OpenCall {
    name: String,
    arguments: Vec<RawArgument>,
    bytes: usize,
}

/// Per-session parse state, owned exclusively by one classifier.
#[derive(Debug, Default)]
pub struct ScanState {
    pub mode: Mode,
    /// Text seen since the last emitted boundary
    pub buffer: String,
    /// Tag whose block is currently open
    pub open_tag: Option<Tag>,
    /// Open parameter tags, outermost first
    stack: Vec<ParameterFrame>,
    call: Option<OpenCall>,
}

impl ScanState {
    /// Names of the open parameter tags, outermost first.
    pub fn open_parameters(&self) -> impl Iterator<Item = &str> {
        self.stack.iter().map(|frame| frame.name.as_str())
    }

    fn parameter_path(&self) -> String {
        self.stack
            .iter()
            .map(|frame| frame.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug)]
pub struct BlockClassifier {
    state: ScanState,
    flush_threshold: usize,
    max_argument_bytes: usize,
    max_parameter_depth: usize,
}

impl BlockClassifier {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            state: ScanState::default(),
            flush_threshold: config.flush_threshold.max(1),
            max_argument_bytes: config.max_argument_bytes,
            max_parameter_depth: config.max_parameter_depth,
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Classify one scanner signal, appending blocks to `out`.
    pub fn classify(&mut self, signal: Signal, out: &mut Vec<Block>) -> ParserResult<()> {
        match self.state.mode {
            Mode::Plain => self.classify_plain(signal, out),
            Mode::Thinking => self.classify_thinking(signal, out),
            Mode::ToolCall => self.classify_tool_call(signal, out),
            Mode::ToolParameter => self.classify_parameter(signal, out),
        }
    }

    fn classify_plain(&mut self, signal: Signal, out: &mut Vec<Block>) -> ParserResult<()> {
        match signal {
            Signal::Literal(text) => self.append_text(&text, out),
            Signal::Open {
                tag: Tag::ToolCall,
                name: Some(name),
                ..
            } => {
                self.flush(out);
                debug!(tool = %name, "Tool call block opened");
                self.state.mode = Mode::ToolCall;
                self.state.open_tag = Some(Tag::ToolCall);
                self.state.call = Some(OpenCall {
                    name: name.clone(),
                    arguments: Vec::new(),
                    bytes: 0,
                });
                out.push(Block::CallOpen { name });
            }
            Signal::Open { tag, .. } if tag.is_thinking() => {
                self.flush(out);
                debug!(tag = tag.name(), "Thinking block opened");
                self.state.mode = Mode::Thinking;
                self.state.open_tag = Some(tag);
            }
            other => {
                debug!(markup = other.raw(), "Stray tag outside any block, keeping as text");
                self.append_text(other.raw(), out);
            }
        }
        Ok(())
    }

    fn classify_thinking(&mut self, signal: Signal, out: &mut Vec<Block>) -> ParserResult<()> {
        match signal {
            Signal::Close { tag, .. } if self.state.open_tag == Some(tag) => {
                self.flush(out);
                debug!(tag = tag.name(), "Thinking block closed");
                self.state.mode = Mode::Plain;
                self.state.open_tag = None;
            }
            Signal::Literal(text) => self.append_text(&text, out),
            other => self.append_text(other.raw(), out),
        }
        Ok(())
    }

    fn classify_tool_call(&mut self, signal: Signal, out: &mut Vec<Block>) -> ParserResult<()> {
        match signal {
            Signal::Literal(text) => {
                if !text.trim().is_empty() {
                    debug!(text = %text, "Dropping text between parameters");
                }
            }
            Signal::Open {
                tag: Tag::Parameter,
                name: Some(name),
                ..
            } => {
                self.state.stack.push(ParameterFrame::new(name));
                self.state.mode = Mode::ToolParameter;
                self.state.open_tag = Some(Tag::Parameter);
            }
            Signal::Close {
                tag: Tag::ToolCall, ..
            } => {
                let call = self
                    .state
                    .call
                    .take()
                    .ok_or_else(|| ParserError::malformed("</tool_call> without open call"))?;
                debug!(
                    tool = %call.name,
                    parameters = call.arguments.len(),
                    "Tool call block closed"
                );
                self.state.mode = Mode::Plain;
                self.state.open_tag = None;
                out.push(Block::CallClose {
                    name: call.name,
                    arguments: call.arguments,
                });
            }
            other => {
                return Err(ParserError::malformed(format!(
                    "unexpected {} inside <tool_call>",
                    other.raw()
                )));
            }
        }
        Ok(())
    }

    fn classify_parameter(&mut self, signal: Signal, out: &mut Vec<Block>) -> ParserResult<()> {
        match signal {
            Signal::Literal(text) => self.append_argument(&text, out)?,
            Signal::Open {
                tag: Tag::Parameter,
                name: Some(name),
                ..
            } => {
                if self.state.stack.len() >= self.max_parameter_depth {
                    return Err(ParserError::malformed(format!(
                        "parameter nesting exceeds depth {}",
                        self.max_parameter_depth
                    )));
                }
                self.flush(out);
                self.state.stack.push(ParameterFrame::new(name));
            }
            Signal::Close {
                tag: Tag::Parameter,
                ..
            } => {
                self.flush(out);
                let frame = self
                    .state
                    .stack
                    .pop()
                    .ok_or_else(|| ParserError::malformed("</parameter> without open parameter"))?;
                let argument = frame.into_argument();
                match self.state.stack.last_mut() {
                    Some(parent) => parent.children.push(argument),
                    None => {
                        let call = self.state.call.as_mut().ok_or_else(|| {
                            ParserError::malformed("<parameter> outside a tool call")
                        })?;
                        call.arguments.push(argument);
                        self.state.mode = Mode::ToolCall;
                        self.state.open_tag = Some(Tag::ToolCall);
                    }
                }
            }
            Signal::Close {
                tag: Tag::ToolCall, ..
            } => {
                return Err(ParserError::malformed(format!(
                    "</tool_call> while parameter '{}' is still open",
                    self.state.parameter_path()
                )));
            }
            // Thinking markup and tool call openings are parameter content
            other => self.append_argument(other.raw(), out)?,
        }
        Ok(())
    }

    /// End of stream. Only `Plain` terminates cleanly.
    pub fn finish(&mut self, out: &mut Vec<Block>) -> ParserResult<()> {
        match self.state.mode {
            Mode::Plain => {
                self.flush(out);
                Ok(())
            }
            Mode::Thinking => Err(ParserError::malformed(format!(
                "unterminated <{}> block",
                self.state.open_tag.unwrap_or(Tag::Thinking).name()
            ))),
            Mode::ToolCall | Mode::ToolParameter => {
                let name = self
                    .state
                    .call
                    .as_ref()
                    .map(|call| call.name.as_str())
                    .unwrap_or_default();
                Err(ParserError::malformed(format!(
                    "unterminated <tool_call> block for '{}'",
                    name
                )))
            }
        }
    }

    /// Release text already classified as plain or thinking. Used before a
    /// fatal error so content preceding the fault is still delivered.
    pub fn flush_classified_text(&mut self, out: &mut Vec<Block>) {
        if matches!(self.state.mode, Mode::Plain | Mode::Thinking) {
            self.flush(out);
        }
    }

    pub fn reset(&mut self) {
        self.state = ScanState::default();
    }

    fn append_text(&mut self, text: &str, out: &mut Vec<Block>) {
        self.state.buffer.push_str(text);
        while self.state.buffer.len() >= self.flush_threshold {
            let cut = split_point(&self.state.buffer, self.flush_threshold);
            let piece: String = self.state.buffer.drain(..cut).collect();
            out.push(self.text_block(piece));
        }
    }

    fn append_argument(&mut self, text: &str, out: &mut Vec<Block>) -> ParserResult<()> {
        let call = self
            .state
            .call
            .as_mut()
            .ok_or_else(|| ParserError::malformed("parameter text outside a tool call"))?;
        call.bytes += text.len();
        if call.bytes > self.max_argument_bytes {
            return Err(ParserError::malformed(format!(
                "arguments for '{}' exceed {} bytes",
                call.name, self.max_argument_bytes
            )));
        }

        if let Some(frame) = self.state.stack.last_mut() {
            frame.text.push_str(text);
        }
        self.state.buffer.push_str(text);
        while self.state.buffer.len() >= self.flush_threshold {
            let cut = split_point(&self.state.buffer, self.flush_threshold);
            let piece: String = self.state.buffer.drain(..cut).collect();
            out.push(Block::ArgumentDelta {
                parameter: self.state.parameter_path(),
                text: piece,
            });
        }
        Ok(())
    }

    /// Emit the buffered text as a block of the current mode.
    fn flush(&mut self, out: &mut Vec<Block>) {
        if self.state.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.state.buffer);
        let block = match self.state.mode {
            Mode::ToolParameter => Block::ArgumentDelta {
                parameter: self.state.parameter_path(),
                text,
            },
            Mode::ToolCall => return,
            _ => self.text_block(text),
        };
        out.push(block);
    }

    fn text_block(&self, text: String) -> Block {
        match self.state.mode {
            Mode::Thinking => Block::Thinking(text),
            _ => Block::Text(text),
        }
    }
}

/// Largest char boundary at or below `limit`, never zero for non-empty input.
fn split_point(text: &str, limit: usize) -> usize {
    let mut cut = limit.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        cut = text.chars().next().map_or(0, char::len_utf8);
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(signals: Vec<Signal>, threshold: usize) -> ParserResult<Vec<Block>> {
        let config = ParserConfig::default().with_flush_threshold(threshold);
        let mut classifier = BlockClassifier::new(&config);
        let mut out = Vec::new();
        for signal in signals {
            classifier.classify(signal, &mut out)?;
        }
        classifier.finish(&mut out)?;
        Ok(out)
    }

    fn lit(text: &str) -> Signal {
        Signal::Literal(text.to_string())
    }

    fn open(tag: Tag, name: Option<&str>) -> Signal {
        Signal::Open {
            tag,
            name: name.map(str::to_string),
            raw: tag.open_markup(name),
        }
    }

    fn close(tag: Tag) -> Signal {
        Signal::Close {
            tag,
            raw: tag.close_markup(),
        }
    }

    #[test]
    fn test_plain_text_buffered_until_finish() {
        let blocks = classify_all(vec![lit("Hel"), lit("lo")], 64).unwrap();
        assert_eq!(blocks, vec![Block::Text("Hello".to_string())]);
    }

    #[test]
    fn test_threshold_pieces() {
        let blocks = classify_all(vec![lit("abcdefg")], 3).unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Text("abc".to_string()),
                Block::Text("def".to_string()),
                Block::Text("g".to_string()),
            ]
        );
    }

    #[test]
    fn test_threshold_respects_char_boundaries() {
        let blocks = classify_all(vec![lit("aéb")], 2).unwrap();
        let joined: String = blocks
            .iter()
            .map(|b| match b {
                Block::Text(t) => t.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(joined, "aéb");
        assert_eq!(blocks[0], Block::Text("a".to_string()));
    }

    #[test]
    fn test_text_flushed_before_thinking() {
        let blocks = classify_all(
            vec![
                lit("Hello "),
                open(Tag::Thinking, None),
                lit("step one"),
                close(Tag::Thinking),
                lit(" world"),
            ],
            64,
        )
        .unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Text("Hello ".to_string()),
                Block::Thinking("step one".to_string()),
                Block::Text(" world".to_string()),
            ]
        );
    }

    #[test]
    fn test_mismatched_thinking_spelling_is_content() {
        let blocks = classify_all(
            vec![
                open(Tag::Think, None),
                lit("a"),
                close(Tag::Thinking),
                lit("b"),
                close(Tag::Think),
            ],
            64,
        )
        .unwrap();
        assert_eq!(blocks, vec![Block::Thinking("a</thinking>b".to_string())]);
    }

    #[test]
    fn test_tool_call_blocks() {
        let blocks = classify_all(
            vec![
                open(Tag::ToolCall, Some("get_weather")),
                lit("\n"),
                open(Tag::Parameter, Some("city")),
                lit("Tok"),
                lit("yo"),
                close(Tag::Parameter),
                lit("\n"),
                close(Tag::ToolCall),
            ],
            64,
        )
        .unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::CallOpen {
                    name: "get_weather".to_string()
                },
                Block::ArgumentDelta {
                    parameter: "city".to_string(),
                    text: "Tokyo".to_string()
                },
                Block::CallClose {
                    name: "get_weather".to_string(),
                    arguments: vec![RawArgument::text("city", "Tokyo")],
                },
            ]
        );
    }

    #[test]
    fn test_nested_parameters() {
        let blocks = classify_all(
            vec![
                open(Tag::ToolCall, Some("book")),
                open(Tag::Parameter, Some("range")),
                open(Tag::Parameter, Some("from")),
                lit("mon"),
                close(Tag::Parameter),
                close(Tag::Parameter),
                close(Tag::ToolCall),
            ],
            64,
        )
        .unwrap();
        assert!(blocks.contains(&Block::ArgumentDelta {
            parameter: "range.from".to_string(),
            text: "mon".to_string()
        }));
        assert_eq!(
            blocks.last(),
            Some(&Block::CallClose {
                name: "book".to_string(),
                arguments: vec![RawArgument::nested(
                    "range",
                    vec![RawArgument::text("from", "mon")]
                )],
            })
        );
    }

    #[test]
    fn test_parameter_entities_decoded_in_value() {
        let blocks = classify_all(
            vec![
                open(Tag::ToolCall, Some("f")),
                open(Tag::Parameter, Some("expr")),
                lit("a &lt; b"),
                close(Tag::Parameter),
                close(Tag::ToolCall),
            ],
            64,
        )
        .unwrap();
        assert_eq!(
            blocks.last(),
            Some(&Block::CallClose {
                name: "f".to_string(),
                arguments: vec![RawArgument::text("expr", "a < b")],
            })
        );
    }

    #[test]
    fn test_thinking_markup_inside_parameter_is_content() {
        let blocks = classify_all(
            vec![
                open(Tag::ToolCall, Some("write")),
                open(Tag::Parameter, Some("body")),
                open(Tag::Thinking, None),
                lit("x"),
                close(Tag::Thinking),
                close(Tag::Parameter),
                close(Tag::ToolCall),
            ],
            64,
        )
        .unwrap();
        assert_eq!(
            blocks.last(),
            Some(&Block::CallClose {
                name: "write".to_string(),
                arguments: vec![RawArgument::text("body", "<thinking>x</thinking>")],
            })
        );
    }

    #[test]
    fn test_stray_close_in_plain_is_text() {
        let blocks = classify_all(vec![lit("a"), close(Tag::ToolCall), lit("b")], 64).unwrap();
        assert_eq!(blocks, vec![Block::Text("a</tool_call>b".to_string())]);
    }

    #[test]
    fn test_unterminated_blocks_fail() {
        let result = classify_all(vec![open(Tag::ToolCall, Some("f"))], 64);
        assert!(matches!(result, Err(ParserError::MalformedStream(_))));

        let result = classify_all(vec![open(Tag::Thinking, None), lit("x")], 64);
        assert!(matches!(result, Err(ParserError::MalformedStream(_))));
    }

    #[test]
    fn test_inconsistent_nesting_fails() {
        let result = classify_all(
            vec![
                open(Tag::ToolCall, Some("f")),
                open(Tag::Parameter, Some("a")),
                close(Tag::ToolCall),
            ],
            64,
        );
        assert!(matches!(result, Err(ParserError::MalformedStream(_))));

        let result = classify_all(
            vec![open(Tag::ToolCall, Some("f")), open(Tag::Thinking, None)],
            64,
        );
        assert!(matches!(result, Err(ParserError::MalformedStream(_))));
    }

    #[test]
    fn test_argument_limit() {
        let config = ParserConfig::default().with_max_argument_bytes(4);
        let mut classifier = BlockClassifier::new(&config);
        let mut out = Vec::new();
        classifier
            .classify(open(Tag::ToolCall, Some("f")), &mut out)
            .unwrap();
        classifier
            .classify(open(Tag::Parameter, Some("a")), &mut out)
            .unwrap();
        let result = classifier.classify(lit("12345"), &mut out);
        assert!(matches!(result, Err(ParserError::MalformedStream(_))));
    }

    #[test]
    fn test_depth_limit() {
        let config = ParserConfig::default().with_max_parameter_depth(1);
        let mut classifier = BlockClassifier::new(&config);
        let mut out = Vec::new();
        classifier
            .classify(open(Tag::ToolCall, Some("f")), &mut out)
            .unwrap();
        classifier
            .classify(open(Tag::Parameter, Some("a")), &mut out)
            .unwrap();
        let result = classifier.classify(open(Tag::Parameter, Some("b")), &mut out);
        assert!(matches!(result, Err(ParserError::MalformedStream(_))));
    }
}
