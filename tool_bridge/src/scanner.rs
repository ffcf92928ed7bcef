//! Incremental tag scanner.
//!
//! Splits an arbitrarily chunked character stream into literal text and
//! recognized tag boundaries. A `<` that could still begin a recognized tag is
//! held back until enough input arrives to decide; everything else is released
//! as literal text immediately.

use memchr::{memchr, memchr3};

use crate::{
    config::ParserConfig,
    errors::{ParserError, ParserResult},
    tags::{self, Tag, NAME_ATTRIBUTE, TAG_SYNTAX_OVERHEAD},
};

/// Low-level scan signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Literal(String),
    Open {
        tag: Tag,
        /// Decoded `name` attribute, present for tags that require one
        name: Option<String>,
        /// Markup exactly as it appeared in the stream
        raw: String,
    },
    Close {
        tag: Tag,
        raw: String,
    },
}

impl Signal {
    /// Source text that produced this signal.
    pub fn raw(&self) -> &str {
        match self {
            Signal::Literal(text) => text,
            Signal::Open { raw, .. } | Signal::Close { raw, .. } => raw,
        }
    }
}

/// Outcome of matching a tag candidate starting at `<`.
#[derive(Debug, PartialEq)]
enum TagMatch {
    /// A recognized tag spanning `len` bytes
    Complete { signal: Signal, len: usize },
    /// Input ended while the candidate could still be a recognized tag
    Partial,
    /// Not a recognized tag; the `<` is literal text
    NoMatch,
    /// Still undecided after the look-ahead limit
    OverLimit,
}

/// Chunk-driven scanner over the fixed tag vocabulary.
#[derive(Debug)]
pub struct TagScanner {
    /// Input received but not yet released as signals
    pending: String,
    /// Upper bound on bytes held back for an undecided tag candidate
    lookahead_limit: usize,
}

impl TagScanner {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            pending: String::new(),
            lookahead_limit: TAG_SYNTAX_OVERHEAD + config.max_attribute_bytes,
        }
    }

    /// Scan the next chunk, appending signals to `out`.
    ///
    /// Fails with [`ParserError::MalformedStream`] if a tag candidate cannot
    /// be decided within the look-ahead limit, however the candidate was
    /// split across chunks.
    pub fn feed(&mut self, chunk: &str, out: &mut Vec<Signal>) -> ParserResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.pending.push_str(chunk);

        let mut literal_start = 0;
        let mut cursor = 0;

        while let Some(offset) = memchr(b'<', &self.pending.as_bytes()[cursor..]) {
            let pos = cursor + offset;
            match match_tag(&self.pending[pos..], self.lookahead_limit) {
                TagMatch::Complete { signal, len } => {
                    if pos > literal_start {
                        out.push(Signal::Literal(
                            self.pending[literal_start..pos].to_string(),
                        ));
                    }
                    out.push(signal);
                    cursor = pos + len;
                    literal_start = cursor;
                }
                TagMatch::NoMatch => {
                    cursor = pos + 1;
                }
                TagMatch::Partial => {
                    if pos > literal_start {
                        out.push(Signal::Literal(
                            self.pending[literal_start..pos].to_string(),
                        ));
                    }
                    self.pending.drain(..pos);
                    return Ok(());
                }
                TagMatch::OverLimit => {
                    if pos > literal_start {
                        out.push(Signal::Literal(
                            self.pending[literal_start..pos].to_string(),
                        ));
                    }
                    self.pending.clear();
                    return Err(ParserError::malformed(format!(
                        "undecided tag exceeds look-ahead limit of {} bytes",
                        self.lookahead_limit
                    )));
                }
            }
        }

        if literal_start < self.pending.len() {
            out.push(Signal::Literal(self.pending[literal_start..].to_string()));
        }
        self.pending.clear();
        Ok(())
    }

    /// Release anything still held back. At end of stream an undecided
    /// candidate never became a tag, so it is literal text.
    pub fn finish(&mut self, out: &mut Vec<Signal>) {
        if !self.pending.is_empty() {
            out.push(Signal::Literal(std::mem::take(&mut self.pending)));
        }
    }

    /// Bytes currently held back awaiting disambiguation.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn reset(&mut self) {
        self.pending = String::new();
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Match a tag candidate starting with `<`, deciding on at most its first
/// `limit` bytes.
///
/// Only the window is inspected, so the outcome is the same whether the
/// candidate arrived whole or in pieces.
fn match_tag(input: &str, limit: usize) -> TagMatch {
    let mut cut = input.len().min(limit);
    while !input.is_char_boundary(cut) {
        cut -= 1;
    }
    match decide_tag(&input[..cut]) {
        TagMatch::Partial if input.len() >= limit => TagMatch::OverLimit,
        outcome => outcome,
    }
}

fn decide_tag(input: &str) -> TagMatch {
    let bytes = input.as_bytes();
    let len = bytes.len();
    debug_assert_eq!(bytes.first(), Some(&b'<'));

    let mut i = 1;
    if i == len {
        return TagMatch::Partial;
    }
    let closing = bytes[i] == b'/';
    if closing {
        i += 1;
    }

    let name_start = i;
    while i < len && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = &input[name_start..i];
    if i == len {
        // The name may still grow into a recognized one (`<thi` → `<thinking>`)
        return if Tag::is_name_prefix(name) {
            TagMatch::Partial
        } else {
            TagMatch::NoMatch
        };
    }
    let Some(tag) = Tag::from_name(name) else {
        return TagMatch::NoMatch;
    };

    if closing || !tag.requires_name() {
        i = skip_whitespace(bytes, i);
        if i == len {
            return TagMatch::Partial;
        }
        if bytes[i] != b'>' {
            return TagMatch::NoMatch;
        }
        let raw = input[..=i].to_string();
        let signal = if closing {
            Signal::Close { tag, raw }
        } else {
            Signal::Open {
                tag,
                name: None,
                raw,
            }
        };
        return TagMatch::Complete { signal, len: i + 1 };
    }

    // `<tool_call name="...">` / `<parameter name="...">`
    if !bytes[i].is_ascii_whitespace() {
        return TagMatch::NoMatch;
    }
    i = skip_whitespace(bytes, i);
    if i == len {
        return TagMatch::Partial;
    }

    let attr_start = i;
    while i < len && is_name_byte(bytes[i]) {
        i += 1;
    }
    let attr = &input[attr_start..i];
    if i == len {
        return if NAME_ATTRIBUTE.starts_with(attr) {
            TagMatch::Partial
        } else {
            TagMatch::NoMatch
        };
    }
    if attr != NAME_ATTRIBUTE {
        return TagMatch::NoMatch;
    }

    i = skip_whitespace(bytes, i);
    if i == len {
        return TagMatch::Partial;
    }
    if bytes[i] != b'=' {
        return TagMatch::NoMatch;
    }
    i = skip_whitespace(bytes, i + 1);
    if i == len {
        return TagMatch::Partial;
    }
    let quote = bytes[i];
    if quote != b'"' && quote != b'\'' {
        return TagMatch::NoMatch;
    }
    let value_start = i + 1;

    // A newline or `<` before the closing quote means this was prose, not markup
    let Some(offset) = memchr3(quote, b'<', b'\n', &bytes[value_start..]) else {
        return TagMatch::Partial;
    };
    let value_end = value_start + offset;
    if bytes[value_end] != quote || value_end == value_start {
        return TagMatch::NoMatch;
    }

    i = skip_whitespace(bytes, value_end + 1);
    if i == len {
        return TagMatch::Partial;
    }
    if bytes[i] != b'>' {
        return TagMatch::NoMatch;
    }

    let value = tags::unescape(&input[value_start..value_end]).into_owned();
    TagMatch::Complete {
        signal: Signal::Open {
            tag,
            name: Some(value),
            raw: input[..=i].to_string(),
        },
        len: i + 1,
    }
}
