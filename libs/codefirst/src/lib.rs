//! Code-first telemetry models.
//!
//! A device model is declared as a [`ModelSchema`]: a set of typed data
//! properties plus a set of actions the cloud may invoke. A [`ModelInstance`]
//! holds property values and action handlers for one schema. Instances are
//! serialized to the JSON wire form with [`serialize`], and inbound command
//! payloads are dispatched to action handlers with [`execute_command`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod command;
pub mod encoder;
pub mod instance;
pub mod schema;
pub mod value;

pub use command::{execute_command, ActionArgs, CommandPayload};
pub use encoder::serialize;
pub use instance::{ActionHandler, ModelInstance};
pub use schema::{ActionSchema, ArgumentSchema, ModelSchema, PropertySchema};
pub use value::{AgentDataValue, DataType};

/// Outcome reported back to the transport after a command was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteCommandResult {
    Success,
    Failed,
    Error,
}

impl ExecuteCommandResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecuteCommandResult::Success => "EXECUTE_COMMAND_SUCCESS",
            ExecuteCommandResult::Failed => "EXECUTE_COMMAND_FAILED",
            ExecuteCommandResult::Error => "EXECUTE_COMMAND_ERROR",
        }
    }
}

/// Errors emitted while declaring, populating or serializing a model.
#[derive(Debug, Error)]
pub enum CodeFirstError {
    #[error("Invalid model schema: {message}")]
    InvalidSchema { message: String },

    #[error("Unknown property '{property}' on model '{model}'")]
    UnknownProperty { model: String, property: String },

    #[error("Type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Property '{property}' on model '{model}' has no value")]
    PropertyNotSet { model: String, property: String },

    #[error("Unknown action '{action}' on model '{model}'")]
    UnknownAction { model: String, action: String },

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for CodeFirstError {
    fn from(err: serde_json::Error) -> Self {
        CodeFirstError::Encoding(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_command_result_names() {
        assert_eq!(
            ExecuteCommandResult::Success.as_str(),
            "EXECUTE_COMMAND_SUCCESS"
        );
        assert_eq!(ExecuteCommandResult::Error.as_str(), "EXECUTE_COMMAND_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = CodeFirstError::TypeMismatch {
            name: "UniqueId".to_string(),
            expected: DataType::Int,
            actual: DataType::AsciiCharPtr,
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch for 'UniqueId': expected int, got ascii_char_ptr"
        );
    }
}
