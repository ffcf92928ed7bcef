//! Event emitter: drives scanner and classifier over pushed chunks and turns
//! classified blocks into the ordered event sequence.

use std::{collections::VecDeque, sync::Arc};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    classifier::{Block, BlockClassifier},
    config::ParserConfig,
    errors::{ParserError, ParserResult},
    scanner::{Signal, TagScanner},
    schema::{coerce_arguments, passthrough_arguments, ToolSet},
    types::{CallError, FinishReason, RawArgument, StreamEvent, Usage},
};

/// Incremental parser for one response stream.
///
/// Chunks go in through [`push`](Self::push); events come out through
/// [`next_event`](Self::next_event) in logical content order. Failures never
/// surface as `Err`: they become an `error` event followed by
/// `finish(error)`, after which further input is ignored.
pub struct StreamParser {
    config: ParserConfig,
    tools: Arc<ToolSet>,
    scanner: TagScanner,
    classifier: BlockClassifier,
    queue: VecDeque<StreamEvent>,
    signals: Vec<Signal>,
    blocks: Vec<Block>,
    next_id: u64,
    current_call: Option<u64>,
    usage: Usage,
    chunks: u64,
    terminated: bool,
}

impl StreamParser {
    /// Create a parser with the default configuration.
    pub fn new(tools: impl Into<Arc<ToolSet>>) -> Self {
        Self::build(ParserConfig::default(), tools.into())
    }

    pub fn with_config(config: ParserConfig, tools: impl Into<Arc<ToolSet>>) -> ParserResult<Self> {
        config.validate()?;
        Ok(Self::build(config, tools.into()))
    }

    fn build(config: ParserConfig, tools: Arc<ToolSet>) -> Self {
        Self {
            scanner: TagScanner::new(&config),
            classifier: BlockClassifier::new(&config),
            config,
            tools,
            queue: VecDeque::new(),
            signals: Vec::new(),
            blocks: Vec::new(),
            next_id: 1,
            current_call: None,
            usage: Usage::default(),
            chunks: 0,
            terminated: false,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Feed the next chunk of backend output.
    pub fn push(&mut self, chunk: &str) {
        if self.terminated {
            debug!(bytes = chunk.len(), "Ignoring chunk after termination");
            return;
        }
        self.chunks += 1;
        if let Err(err) = self.process(chunk) {
            self.fail_with(err);
        }
    }

    /// Signal a clean end of the upstream.
    pub fn finish(&mut self) {
        if self.terminated {
            return;
        }
        if let Err(err) = self.finish_inner() {
            self.fail_with(err);
            return;
        }

        let reason = if self.usage.tool_calls > 0 {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        debug!(
            reason = reason.as_str(),
            tool_calls = self.usage.tool_calls,
            chunks = self.chunks,
            "Parse session finished"
        );
        self.queue.push_back(StreamEvent::Finish {
            reason,
            usage: self.usage,
        });
        self.terminate();
    }

    /// Signal an upstream transport failure. Partially classified content is
    /// discarded.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.terminated {
            return;
        }
        let err = ParserError::Upstream(message.into());
        warn!(error = %err, "Upstream failed mid-stream");
        self.terminate_with_error(err);
    }

    /// Abandon the session without emitting anything further.
    pub fn cancel(&mut self) {
        if !self.terminated {
            debug!("Parse session cancelled");
        }
        self.queue.clear();
        self.terminate();
    }

    /// Prepare for a new session with the same tools and configuration.
    pub fn reset(&mut self) {
        self.scanner.reset();
        self.classifier.reset();
        self.queue.clear();
        self.signals.clear();
        self.blocks.clear();
        self.next_id = 1;
        self.current_call = None;
        self.usage = Usage::default();
        self.chunks = 0;
        self.terminated = false;
    }

    pub fn next_event(&mut self) -> Option<StreamEvent> {
        self.queue.pop_front()
    }

    /// Take every event ready so far.
    pub fn drain(&mut self) -> Vec<StreamEvent> {
        self.queue.drain(..).collect()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Whether the session has ended. Queued events may still be pending.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Chunks received this session, including empty ones.
    pub fn chunks_received(&self) -> u64 {
        self.chunks
    }

    fn process(&mut self, chunk: &str) -> ParserResult<()> {
        let scanned = self.scanner.feed(chunk, &mut self.signals);
        let classified = self.classify_signals();
        self.emit_blocks();
        classified.and(scanned)
    }

    fn finish_inner(&mut self) -> ParserResult<()> {
        self.scanner.finish(&mut self.signals);
        let classified = self
            .classify_signals()
            .and_then(|_| self.classifier.finish(&mut self.blocks));
        self.emit_blocks();
        classified
    }

    /// Classify pending signals, stopping at the first fault. Blocks
    /// classified before the fault stay queued for emission.
    fn classify_signals(&mut self) -> ParserResult<()> {
        let mut signals = std::mem::take(&mut self.signals);
        let mut result = Ok(());
        for signal in signals.drain(..) {
            if let Err(err) = self.classifier.classify(signal, &mut self.blocks) {
                result = Err(err);
                break;
            }
        }
        self.signals = signals;
        result
    }

    fn emit_blocks(&mut self) {
        let mut blocks = std::mem::take(&mut self.blocks);
        for block in blocks.drain(..) {
            self.emit_block(block);
        }
        self.blocks = blocks;
    }

    fn emit_block(&mut self, block: Block) {
        let event = match block {
            Block::Text(text) => {
                self.usage.text_bytes += text.len() as u64;
                StreamEvent::TextDelta { text }
            }
            Block::Thinking(text) => {
                self.usage.thinking_bytes += text.len() as u64;
                StreamEvent::ThinkingDelta { text }
            }
            Block::CallOpen { name } => {
                let id = self.next_id;
                self.next_id += 1;
                self.current_call = Some(id);
                debug!(id, tool = %name, "Tool call started");
                StreamEvent::ToolCallStart { id, name }
            }
            Block::ArgumentDelta { parameter, text } => {
                let Some(id) = self.current_call else {
                    return;
                };
                self.usage.argument_bytes += text.len() as u64;
                StreamEvent::ToolCallArgumentDelta {
                    id,
                    parameter,
                    text,
                }
            }
            Block::CallClose { name, arguments } => {
                let Some(id) = self.current_call.take() else {
                    return;
                };
                self.usage.tool_calls += 1;
                self.close_call(id, name, arguments)
            }
        };
        self.queue.push_back(event);
    }

    fn close_call(&self, id: u64, name: String, raw_arguments: Vec<RawArgument>) -> StreamEvent {
        let Some(tool) = self.tools.get(&name) else {
            let err = ParserError::UnknownTool(name.clone());
            warn!(id, error = %err, "Tool call names an undeclared tool");
            return StreamEvent::ToolCallEnd {
                id,
                arguments: Value::Object(passthrough_arguments(&raw_arguments)),
                name,
                raw_arguments,
                error: Some(CallError::UnknownTool),
            };
        };

        let coerced = coerce_arguments(tool, &raw_arguments);
        for err in &coerced.errors {
            warn!(id, tool = %name, error = %err, "Tool call argument failed coercion");
        }
        let error = coerced.errors.into_iter().find_map(|err| match err {
            ParserError::InvalidArgument { parameter, reason } => {
                Some(CallError::InvalidArgument { parameter, reason })
            }
            _ => None,
        });
        debug!(
            id,
            tool = %name,
            parameters = raw_arguments.len(),
            valid = error.is_none(),
            "Tool call completed"
        );
        StreamEvent::ToolCallEnd {
            id,
            name,
            arguments: Value::Object(coerced.arguments),
            raw_arguments,
            error,
        }
    }

    /// Fatal parse error: deliver text classified before the fault, then the
    /// terminal pair.
    fn fail_with(&mut self, err: ParserError) {
        warn!(error = %err, "Parse session failed");
        self.classifier.flush_classified_text(&mut self.blocks);
        self.emit_blocks();
        self.terminate_with_error(err);
    }

    fn terminate_with_error(&mut self, err: ParserError) {
        self.queue.push_back(StreamEvent::Error {
            message: err.to_string(),
        });
        self.queue.push_back(StreamEvent::Finish {
            reason: FinishReason::Error,
            usage: self.usage,
        });
        self.terminate();
    }

    /// Release parse buffers. Queued events are kept.
    fn terminate(&mut self) {
        self.terminated = true;
        self.current_call = None;
        self.scanner.reset();
        self.classifier.reset();
        self.signals = Vec::new();
        self.blocks = Vec::new();
    }
}

impl std::fmt::Debug for StreamParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParser")
            .field("mode", &self.classifier.mode())
            .field("queued", &self.queue.len())
            .field("next_id", &self.next_id)
            .field("usage", &self.usage)
            .field("chunks", &self.chunks)
            .field("terminated", &self.terminated)
            .finish()
    }
}

/// Parse a complete response in one call.
pub fn parse_complete(text: &str, tools: impl Into<Arc<ToolSet>>) -> Vec<StreamEvent> {
    let mut parser = StreamParser::new(tools);
    parser.push(text);
    parser.finish();
    parser.drain()
}
