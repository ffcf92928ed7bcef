//! Tool schema bridge.
//!
//! Translates JSON-schema tool declarations into the textual description the
//! backend is prompted with, coerces extracted parameter text back into typed
//! arguments, and formats tool results for the next outbound turn.

mod coerce;
mod describe;
mod format;

use std::collections::HashMap;

pub use coerce::{coerce_arguments, coerce_value, passthrough_arguments, CoercedArguments};
pub use describe::{build_system_prompt, describe_tools, PromptOptions};
pub use format::{
    format_tool_call, format_tool_result, format_tool_results, render_tool_call, ToolOutcome,
    ToolResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ParserError, ParserResult};

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    /// No usable type information; values pass through as text
    Any,
}

impl ParameterKind {
    /// Map a JSON-schema `type` keyword.
    pub fn from_schema_type(type_name: &str) -> Self {
        match type_name {
            "string" => ParameterKind::String,
            "integer" => ParameterKind::Integer,
            "number" => ParameterKind::Number,
            "boolean" => ParameterKind::Boolean,
            "object" => ParameterKind::Object,
            "array" => ParameterKind::Array,
            "null" => ParameterKind::Null,
            _ => ParameterKind::Any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Integer => "integer",
            ParameterKind::Number => "number",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Object => "object",
            ParameterKind::Array => "array",
            ParameterKind::Null => "null",
            ParameterKind::Any => "any",
        }
    }

    /// Infer a kind from the JSON type of an enum member.
    fn of_value(value: &Value) -> Self {
        match value {
            Value::String(_) => ParameterKind::String,
            Value::Bool(_) => ParameterKind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ParameterKind::Integer,
            Value::Number(_) => ParameterKind::Number,
            Value::Null => ParameterKind::Null,
            Value::Array(_) => ParameterKind::Array,
            Value::Object(_) => ParameterKind::Object,
        }
    }
}

/// Schema of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Declared properties of an object parameter, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ParameterSpec>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
            enum_values: None,
            properties: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_properties(mut self, properties: Vec<ParameterSpec>) -> Self {
        self.properties = properties;
        self
    }

    pub fn property(&self, name: &str) -> Option<&ParameterSpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn from_property(name: &str, schema: &Value, required: bool) -> ParserResult<Self> {
        let schema = schema.as_object().ok_or_else(|| {
            ParserError::Config(format!("schema for parameter '{}' must be an object", name))
        })?;

        let enum_values = schema.get("enum").and_then(Value::as_array).cloned();

        // `"type": ["string", "null"]` declares an optional string
        let kind = match schema.get("type") {
            Some(Value::String(type_name)) => ParameterKind::from_schema_type(type_name),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(ParameterKind::from_schema_type)
                .unwrap_or(ParameterKind::Null),
            _ => enum_values
                .as_ref()
                .and_then(|values| values.first())
                .map(ParameterKind::of_value)
                .unwrap_or(ParameterKind::Any),
        };

        let properties = if kind == ParameterKind::Object {
            parse_properties(schema.get("properties"), schema.get("required"))?
        } else {
            Vec::new()
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            required,
            description: schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            enum_values,
            properties,
        })
    }
}

fn parse_properties(
    properties: Option<&Value>,
    required: Option<&Value>,
) -> ParserResult<Vec<ParameterSpec>> {
    let required: Vec<&str> = required
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    match properties {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, schema)| {
                ParameterSpec::from_property(name, schema, required.contains(&name.as_str()))
            })
            .collect(),
        Some(_) => Err(ParserError::Config(
            "'properties' must be an object".to_string(),
        )),
    }
}

/// A tool the backend may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Build from a JSON-schema object (`{"type": "object", "properties": {...},
    /// "required": [...]}`). Property order is preserved.
    pub fn from_json_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: &Value,
    ) -> ParserResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParserError::Config("tool name must not be empty".to_string()));
        }

        let parameters = match schema {
            Value::Null => Vec::new(),
            Value::Object(map) => parse_properties(map.get("properties"), map.get("required"))?,
            _ => {
                return Err(ParserError::Config(format!(
                    "parameters schema for '{}' must be an object",
                    name
                )));
            }
        };

        Ok(Self {
            name,
            description: description.into(),
            parameters,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Function declaration as it appears in JSON tool-calling requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

impl TryFrom<FunctionDefinition> for ToolDefinition {
    type Error = ParserError;

    fn try_from(function: FunctionDefinition) -> ParserResult<Self> {
        ToolDefinition::from_json_schema(
            function.name,
            function.description.unwrap_or_default(),
            &function.parameters,
        )
    }
}

/// Tool definitions supplied for one request, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    /// Fails if two definitions share a name.
    pub fn new(tools: Vec<ToolDefinition>) -> ParserResult<Self> {
        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if index.insert(tool.name.clone(), i).is_some() {
                return Err(ParserError::Config(format!(
                    "duplicate tool name: {}",
                    tool.name
                )));
            }
        }
        Ok(Self { tools, index })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from JSON function declarations.
    pub fn from_functions(functions: Vec<FunctionDefinition>) -> ParserResult<Self> {
        let tools = functions
            .into_iter()
            .map(ToolDefinition::try_from)
            .collect::<ParserResult<Vec<_>>>()?;
        Self::new(tools)
    }

    /// Build from a JSON array of function declarations.
    pub fn from_json(functions: Value) -> ParserResult<Self> {
        let functions: Vec<FunctionDefinition> = serde_json::from_value(functions)?;
        Self::from_functions(functions)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
