//! Tag vocabulary shared by the scanner and the schema bridge.
//!
//! The backend is told to emit exactly these tags (see [`crate::schema`]) and
//! the scanner recognizes nothing else:
//!
//! ```text
//! <thinking>reasoning</thinking>
//! <tool_call name="get_weather">
//! <parameter name="city">Tokyo</parameter>
//! </tool_call>
//! ```
//!
//! `<think>` is accepted as an alias of `<thinking>`.

use std::borrow::Cow;

use memchr::memchr;

/// Attribute carrying the tool name on `<tool_call>` and the key on `<parameter>`.
pub const NAME_ATTRIBUTE: &str = "name";

/// Fixed bytes of the longest recognized tag excluding its attribute value:
/// `<parameter name="` plus `">`, with room for surrounding whitespace.
pub(crate) const TAG_SYNTAX_OVERHEAD: usize = 32;

/// Recognized tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    ToolCall,
    Parameter,
    Thinking,
    Think,
}

impl Tag {
    pub const ALL: [Tag; 4] = [Tag::ToolCall, Tag::Parameter, Tag::Thinking, Tag::Think];

    pub fn name(self) -> &'static str {
        match self {
            Tag::ToolCall => "tool_call",
            Tag::Parameter => "parameter",
            Tag::Thinking => "thinking",
            Tag::Think => "think",
        }
    }

    pub fn from_name(name: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|tag| tag.name() == name)
    }

    /// Whether any recognized tag name starts with `prefix`.
    pub(crate) fn is_name_prefix(prefix: &str) -> bool {
        Tag::ALL.iter().any(|tag| tag.name().starts_with(prefix))
    }

    /// Open tags of this kind must carry a `name` attribute.
    pub fn requires_name(self) -> bool {
        matches!(self, Tag::ToolCall | Tag::Parameter)
    }

    pub fn is_thinking(self) -> bool {
        matches!(self, Tag::Thinking | Tag::Think)
    }

    /// Render the opening markup, escaping the attribute value.
    pub fn open_markup(self, name: Option<&str>) -> String {
        match name {
            Some(value) => format!(
                "<{} {}=\"{}\">",
                self.name(),
                NAME_ATTRIBUTE,
                escape_attribute(value)
            ),
            None => format!("<{}>", self.name()),
        }
    }

    pub fn close_markup(self) -> String {
        format!("</{}>", self.name())
    }
}

/// Escape `&`, `<` and `>` in element content.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Escape element content plus both quote characters.
pub fn escape_attribute(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

const ENTITIES: [(&str, char); 5] = [
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&amp;", '&'),
    ("&quot;", '"'),
    ("&apos;", '\''),
];

/// Decode the five predefined XML entities. Anything else starting with `&`
/// is left untouched.
pub fn unescape(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let Some(first) = memchr(b'&', bytes) else {
        return Cow::Borrowed(text);
    };

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..first]);
    let mut rest = &text[first..];

    while let Some(pos) = memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
        {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
