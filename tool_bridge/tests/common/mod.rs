//! Common test utilities for tool-bridge tests

use serde_json::json;
use tool_bridge::{StreamEvent, StreamParser, ToolSet};

pub mod streaming_helpers {
    //! Streaming Test Helpers
    //!
    //! Utilities for creating realistic streaming chunks that simulate
    //! how LLM tokens actually arrive (1-5 characters at a time).

    /// Split input into realistic char-level chunks (2-3 chars each for determinism)
    #[allow(dead_code)]
    pub fn create_realistic_chunks(input: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = input.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            // Take 2-3 characters at a time (deterministic for testing)
            let chunk_size = if i + 3 <= chars.len() && chars[i].is_ascii_alphanumeric() {
                3 // Longer chunks for alphanumeric sequences
            } else {
                2 // Shorter chunks for special characters
            };

            let end = (i + chunk_size).min(chars.len());
            let chunk: String = chars[i..end].iter().collect();
            chunks.push(chunk);
            i = end;
        }

        chunks
    }

    /// Split input right after markup characters, so tags arrive in pieces
    #[allow(dead_code)]
    pub fn create_strategic_chunks(input: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for ch in input.chars() {
            current.push(ch);
            let should_break =
                matches!(ch, '<' | '>' | '/' | '"' | '=' | '_' | ' ') || current.len() >= 5;
            if should_break {
                chunks.push(std::mem::take(&mut current));
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// One chunk per character, interleaved with empty chunks
    #[allow(dead_code)]
    pub fn create_char_chunks(input: &str) -> Vec<String> {
        input
            .chars()
            .flat_map(|ch| [ch.to_string(), String::new()])
            .collect()
    }

    /// Every two-piece split of `input` at a char boundary
    #[allow(dead_code)]
    pub fn all_two_way_splits(input: &str) -> Vec<Vec<String>> {
        input
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(input.len()))
            .map(|i| vec![input[..i].to_string(), input[i..].to_string()])
            .collect()
    }
}

/// Tools declared for most scenarios
#[allow(dead_code)]
pub fn create_test_tools() -> ToolSet {
    ToolSet::from_json(json!([
        {
            "name": "getWeather",
            "description": "Get current weather for a city",
            "parameters": {
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "City name"},
                    "units": {"type": "string", "enum": ["celsius", "fahrenheit"]},
                    "days": {"type": "integer"}
                },
                "required": ["city"]
            }
        },
        {
            "name": "search",
            "description": "Search for information",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer"},
                    "safe": {"type": "boolean"}
                },
                "required": ["query"]
            }
        },
        {
            "name": "book_hotel",
            "description": "Reserve a room",
            "parameters": {
                "type": "object",
                "properties": {
                    "hotel": {"type": "string"},
                    "stay": {
                        "type": "object",
                        "properties": {
                            "check_in": {"type": "string"},
                            "nights": {"type": "integer"}
                        },
                        "required": ["check_in"]
                    },
                    "guests": {"type": "array"},
                    "budget": {"type": "number"}
                }
            }
        }
    ]))
    .expect("test tool definitions are valid")
}

/// Feed chunks through a fresh parser and collect every event
#[allow(dead_code)]
pub fn collect_events<S: AsRef<str>>(chunks: &[S], tools: ToolSet) -> Vec<StreamEvent> {
    let mut parser = StreamParser::new(tools);
    let mut events = Vec::new();
    for chunk in chunks {
        parser.push(chunk.as_ref());
        while let Some(event) = parser.next_event() {
            events.push(event);
        }
    }
    parser.finish();
    events.extend(parser.drain());
    events
}

/// Route parser logs to the test writer; safe to call from every test
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
