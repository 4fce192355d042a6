use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Data types a model property or action argument may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Double,
    Bool,
    AsciiCharPtr,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Double => "double",
            DataType::Bool => "bool",
            DataType::AsciiCharPtr => "ascii_char_ptr",
        }
    }

    /// Converts a JSON parameter into a typed value, or `None` if the JSON
    /// shape does not fit this type.
    pub fn from_json(&self, value: &JsonValue) -> Option<AgentDataValue> {
        match self {
            DataType::Int => value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(AgentDataValue::Int),
            DataType::Double => value.as_f64().map(AgentDataValue::Double),
            DataType::Bool => value.as_bool().map(AgentDataValue::Bool),
            DataType::AsciiCharPtr => value
                .as_str()
                .filter(|s| s.is_ascii())
                .map(|s| AgentDataValue::AsciiCharPtr(s.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed property or argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentDataValue {
    Int(i32),
    Double(f64),
    Bool(bool),
    AsciiCharPtr(String),
}

impl AgentDataValue {
    pub fn data_type(&self) -> DataType {
        match self {
            AgentDataValue::Int(_) => DataType::Int,
            AgentDataValue::Double(_) => DataType::Double,
            AgentDataValue::Bool(_) => DataType::Bool,
            AgentDataValue::AsciiCharPtr(_) => DataType::AsciiCharPtr,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            AgentDataValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AgentDataValue::AsciiCharPtr(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            AgentDataValue::Int(n) => JsonValue::from(*n),
            AgentDataValue::Double(d) => JsonValue::from(*d),
            AgentDataValue::Bool(b) => JsonValue::from(*b),
            AgentDataValue::AsciiCharPtr(s) => JsonValue::from(s.as_str()),
        }
    }
}

impl From<i32> for AgentDataValue {
    fn from(value: i32) -> Self {
        AgentDataValue::Int(value)
    }
}

impl From<f64> for AgentDataValue {
    fn from(value: f64) -> Self {
        AgentDataValue::Double(value)
    }
}

impl From<bool> for AgentDataValue {
    fn from(value: bool) -> Self {
        AgentDataValue::Bool(value)
    }
}

impl From<&str> for AgentDataValue {
    fn from(value: &str) -> Self {
        AgentDataValue::AsciiCharPtr(value.to_string())
    }
}

impl From<String> for AgentDataValue {
    fn from(value: String) -> Self {
        AgentDataValue::AsciiCharPtr(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_from_json_rejects_out_of_range() {
        assert_eq!(DataType::Int.from_json(&json!(7)), Some(AgentDataValue::Int(7)));
        assert_eq!(DataType::Int.from_json(&json!(5_000_000_000i64)), None);
        assert_eq!(DataType::Int.from_json(&json!("7")), None);
    }

    #[test]
    fn test_ascii_from_json_rejects_non_ascii() {
        assert_eq!(
            DataType::AsciiCharPtr.from_json(&json!("Mon Jan  1 00:00:00 2024")),
            Some(AgentDataValue::AsciiCharPtr("Mon Jan  1 00:00:00 2024".into()))
        );
        assert_eq!(DataType::AsciiCharPtr.from_json(&json!("grüße")), None);
    }
}
