use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::{AgentDataValue, ExecuteCommandResult, ModelInstance};

/// Wire form of a cloud-to-device command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Parameters", default)]
    pub parameters: Map<String, JsonValue>,
}

/// Typed arguments handed to an action handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    values: BTreeMap<String, AgentDataValue>,
}

impl ActionArgs {
    pub fn get(&self, name: &str) -> Option<&AgentDataValue> {
        self.values.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(AgentDataValue::as_int)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AgentDataValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parses `command` and invokes the matching action handler on `instance`.
pub fn execute_command(instance: &ModelInstance, command: &str) -> ExecuteCommandResult {
    let payload: CommandPayload = match serde_json::from_str(command) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "command payload is not a valid command document");
            return ExecuteCommandResult::Error;
        }
    };

    let schema = instance.schema();
    let Some(action) = schema.action(&payload.name) else {
        warn!(model = %schema.name, action = %payload.name, "command names an unknown action");
        return ExecuteCommandResult::Error;
    };

    let mut args = ActionArgs::default();
    for argument in &action.arguments {
        let Some(raw) = payload.parameters.get(&argument.name) else {
            warn!(
                action = %action.name,
                argument = %argument.name,
                "command is missing a declared argument"
            );
            return ExecuteCommandResult::Error;
        };

        let Some(value) = argument.data_type.from_json(raw) else {
            warn!(
                action = %action.name,
                argument = %argument.name,
                expected = %argument.data_type,
                "command argument has the wrong type"
            );
            return ExecuteCommandResult::Error;
        };

        args.values.insert(argument.name.clone(), value);
    }

    let Some(handler) = instance.handler(&action.name) else {
        warn!(action = %action.name, "no handler installed for action");
        return ExecuteCommandResult::Failed;
    };

    let result = handler(&args);
    debug!(action = %action.name, result = result.as_str(), "executed command");
    result
}
