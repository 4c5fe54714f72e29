// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data type descriptors and the runtime value model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name of the builtin execution-flow data type.
pub const EXEC: &str = "Exec";
/// Name of the builtin wildcard data type.
pub const ANY: &str = "Any";
/// Name of the builtin string data type.
pub const STRING: &str = "String";
/// Name of the builtin numeric data type.
pub const NUMERIC: &str = "Numeric";
/// Name of the builtin boolean data type.
pub const BOOLEAN: &str = "Boolean";
/// Name of the builtin list data type.
pub const LIST: &str = "List";
/// Name of the builtin dictionary data type.
pub const DICT: &str = "Dict";

/// Value that can be stored in a port, a variable or a node property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// String value.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed mapping of values.
    Dict(IndexMap<String, Value>),
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Any,
            Self::Bool(_) => ValueKind::Boolean,
            Self::Number(_) => ValueKind::Numeric,
            Self::String(_) => ValueKind::String,
            Self::List(_) => ValueKind::List,
            Self::Dict(_) => ValueKind::Dict,
        }
    }

    /// Returns whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns whether this value is the empty/zero value of its kind.
    ///
    /// Verification treats an unconnected required input holding such a
    /// value as missing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(value) => !value,
            Self::Number(value) => *value == 0.0,
            Self::String(value) => value.is_empty(),
            Self::List(values) => values.is_empty(),
            Self::Dict(values) => values.is_empty(),
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the numeric payload, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the list payload, if any.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

/// Kind of payload a data type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Control-flow sequencing, carries no payload.
    Exec,
    /// Any payload.
    Any,
    /// Boolean payload.
    Boolean,
    /// Numeric payload.
    Numeric,
    /// String payload.
    String,
    /// List payload.
    List,
    /// Dictionary payload.
    Dict,
}

/// Descriptor for a named, colored value type ports and variables carry.
///
/// Descriptors are registered once per name (case-insensitive) in the
/// factory and are immutable afterwards. `is_runtime` flags container-like
/// types whose values cannot be deep-copied cheaply; callers routing
/// multi-output results use it to keep a whole list on a single port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    /// Registered type name.
    pub name: String,
    /// Kind of payload values of this type carry.
    pub kind: ValueKind,
    /// Default value assigned to freshly created ports and variables.
    pub default: Value,
    /// Whether values of this type are runtime containers.
    pub is_runtime: bool,
    /// Display color (RGBA).
    pub color: [u8; 4],
}

impl DataType {
    /// Creates a custom data type descriptor.
    pub fn new(name: impl Into<String>, kind: ValueKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            is_runtime: false,
            color: [128, 128, 128, 255],
        }
    }

    /// Sets the display color.
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = color;
        self
    }

    /// Marks the type as a runtime container.
    pub fn runtime(mut self) -> Self {
        self.is_runtime = true;
        self
    }

    /// The builtin execution-flow type.
    pub fn exec() -> Self {
        Self::new(EXEC, ValueKind::Exec, Value::Null).with_color([255, 255, 255, 255])
    }

    /// The builtin wildcard type.
    pub fn any() -> Self {
        Self::new(ANY, ValueKind::Any, Value::Null).with_color([150, 150, 150, 255])
    }

    /// The builtin string type.
    pub fn string() -> Self {
        Self::new(STRING, ValueKind::String, Value::String(String::new()))
            .with_color([200, 180, 150, 255])
    }

    /// The builtin numeric type.
    pub fn numeric() -> Self {
        Self::new(NUMERIC, ValueKind::Numeric, Value::Number(0.0)).with_color([80, 200, 80, 255])
    }

    /// The builtin boolean type.
    pub fn boolean() -> Self {
        Self::new(BOOLEAN, ValueKind::Boolean, Value::Bool(false)).with_color([200, 80, 80, 255])
    }

    /// The builtin list type.
    pub fn list() -> Self {
        Self::new(LIST, ValueKind::List, Value::List(Vec::new()))
            .with_color([80, 200, 200, 255])
            .runtime()
    }

    /// The builtin dictionary type.
    pub fn dict() -> Self {
        Self::new(DICT, ValueKind::Dict, Value::Dict(IndexMap::new()))
            .with_color([200, 100, 200, 255])
            .runtime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::Bool(true).kind(), ValueKind::Boolean);
        assert_eq!(Value::Number(1.0).kind(), ValueKind::Numeric);
        assert_eq!(Value::from("a").kind(), ValueKind::String);
        assert_eq!(Value::List(vec![]).kind(), ValueKind::List);
        assert_eq!(Value::Null.kind(), ValueKind::Any);
    }

    #[test]
    fn test_empty_values() {
        assert!(Value::Null.is_empty());
        assert!(Value::Number(0.0).is_empty());
        assert!(Value::from("").is_empty());
        assert!(!Value::Number(2.0).is_empty());
        assert!(!Value::from("x").is_empty());
    }

    #[test]
    fn test_builtin_descriptors() {
        let list = DataType::list();
        assert!(list.is_runtime);
        assert_eq!(list.default, Value::List(Vec::new()));

        let numeric = DataType::numeric();
        assert!(!numeric.is_runtime);
        assert_eq!(numeric.kind, ValueKind::Numeric);
    }

    #[test]
    fn test_value_json_shape() {
        let value = Value::List(vec![Value::Number(1.0), Value::from("a"), Value::Bool(true)]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"[1.0,"a",true]"#);
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }
}
