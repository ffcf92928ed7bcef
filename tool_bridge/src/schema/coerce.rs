use serde_json::{Map, Number, Value};

use super::{ParameterKind, ParameterSpec, ToolDefinition};
use crate::{
    errors::{ParserError, ParserResult},
    types::{RawArgument, RawValue},
};

/// Result of coercing one call's raw arguments.
#[derive(Debug, Default)]
pub struct CoercedArguments {
    /// Typed arguments; parameters that failed keep their raw JSON view
    pub arguments: Map<String, Value>,
    /// Every `InvalidArgument`, in parameter order
    pub errors: Vec<ParserError>,
}

impl CoercedArguments {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Coerce raw parameter values against a tool definition.
///
/// Never fails as a whole: a parameter that does not coerce is kept as raw
/// text and its error recorded, so the call can still be surfaced.
pub fn coerce_arguments(tool: &ToolDefinition, raw: &[RawArgument]) -> CoercedArguments {
    let mut result = CoercedArguments::default();
    coerce_into(&tool.parameters, raw, "", &mut result);
    result
}

fn coerce_into(
    specs: &[ParameterSpec],
    raw: &[RawArgument],
    prefix: &str,
    result: &mut CoercedArguments,
) {
    for argument in raw {
        let value = match specs.iter().find(|spec| spec.name == argument.name) {
            Some(spec) => match coerce_value(spec, &argument.value) {
                Ok(value) => value,
                Err(err) => {
                    result.errors.push(qualify(err, prefix));
                    argument.value.to_json()
                }
            },
            None => passthrough(&argument.value),
        };
        result.arguments.insert(argument.name.clone(), value);
    }

    for spec in specs.iter().filter(|spec| spec.required) {
        if !raw.iter().any(|argument| argument.name == spec.name) {
            result.errors.push(ParserError::invalid_argument(
                join_path(prefix, &spec.name),
                "missing required parameter",
            ));
        }
    }
}

/// Coerce one raw value to the declared kind, then validate the enum.
pub fn coerce_value(spec: &ParameterSpec, raw: &RawValue) -> ParserResult<Value> {
    let value = match raw {
        RawValue::Text(text) => coerce_text(spec, text)?,
        RawValue::Nested(children) => coerce_nested(spec, children)?,
    };

    if let Some(allowed) = &spec.enum_values {
        if !allowed.contains(&value) {
            return Err(ParserError::invalid_argument(
                &spec.name,
                format!("{} is not one of the allowed values", value),
            ));
        }
    }
    Ok(value)
}

fn coerce_text(spec: &ParameterSpec, text: &str) -> ParserResult<Value> {
    let trimmed = text.trim();
    match spec.kind {
        ParameterKind::String | ParameterKind::Any => {
            Ok(Value::String(trim_newlines(text).to_string()))
        }
        ParameterKind::Integer => parse_integer(trimmed)
            .ok_or_else(|| expected(spec, "an integer", trimmed)),
        ParameterKind::Number => parse_number(trimmed)
            .ok_or_else(|| expected(spec, "a number", trimmed)),
        ParameterKind::Boolean => parse_boolean(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| expected(spec, "a boolean", trimmed)),
        ParameterKind::Null => {
            if trimmed.is_empty() || trimmed == "null" {
                Ok(Value::Null)
            } else {
                Err(expected(spec, "null", trimmed))
            }
        }
        ParameterKind::Object => match serde_json::from_str::<Value>(trimmed) {
            Ok(value @ Value::Object(_)) => Ok(value),
            _ => Err(expected(spec, "a JSON object", trimmed)),
        },
        ParameterKind::Array => match serde_json::from_str::<Value>(trimmed) {
            Ok(value @ Value::Array(_)) => Ok(value),
            _ => Err(expected(spec, "a JSON array", trimmed)),
        },
    }
}

fn coerce_nested(spec: &ParameterSpec, children: &[RawArgument]) -> ParserResult<Value> {
    match spec.kind {
        ParameterKind::Object => {
            let mut nested = CoercedArguments::default();
            coerce_into(&spec.properties, children, &spec.name, &mut nested);
            match nested.errors.into_iter().next() {
                Some(err) => Err(err),
                None => Ok(Value::Object(nested.arguments)),
            }
        }
        ParameterKind::Any => Ok(Value::Object(passthrough_arguments(children))),
        _ => Err(ParserError::invalid_argument(
            &spec.name,
            format!(
                "expected {}, found nested parameters",
                spec.kind.as_str()
            ),
        )),
    }
}

/// Arguments with no declaration to check against: text loses its tag
/// newlines like a string parameter, nesting becomes an object.
pub fn passthrough_arguments(raw: &[RawArgument]) -> Map<String, Value> {
    raw.iter()
        .map(|argument| (argument.name.clone(), passthrough(&argument.value)))
        .collect()
}

fn passthrough(raw: &RawValue) -> Value {
    match raw {
        RawValue::Text(text) => Value::String(trim_newlines(text).to_string()),
        RawValue::Nested(children) => Value::Object(passthrough_arguments(children)),
    }
}

/// Strip a single leading and trailing newline, as written between the
/// parameter tags and their content.
pub(crate) fn trim_newlines(text: &str) -> &str {
    let text = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text);
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

fn parse_integer(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    text.parse::<u64>().ok().map(Value::from)
}

fn parse_number(text: &str) -> Option<Value> {
    if let Some(n) = parse_integer(text) {
        return Some(n);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn expected(spec: &ParameterSpec, what: &str, found: &str) -> ParserError {
    ParserError::invalid_argument(&spec.name, format!("expected {}, found '{}'", what, found))
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Report nested failures under their full parameter path.
fn qualify(err: ParserError, prefix: &str) -> ParserError {
    match err {
        ParserError::InvalidArgument { parameter, reason } => ParserError::InvalidArgument {
            parameter: join_path(prefix, &parameter),
            reason,
        },
        other => other,
    }
}
