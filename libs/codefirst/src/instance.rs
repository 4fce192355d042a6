use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::debug;

use crate::{ActionArgs, AgentDataValue, CodeFirstError, ExecuteCommandResult, ModelSchema};

pub type ActionHandler = Box<dyn Fn(&ActionArgs) -> ExecuteCommandResult + Send + Sync>;

/// One live instance of a declared model.
pub struct ModelInstance {
    schema: ModelSchema,
    values: BTreeMap<String, AgentDataValue>,
    handlers: HashMap<String, ActionHandler>,
}

impl ModelInstance {
    pub fn new(schema: ModelSchema) -> Result<Self, CodeFirstError> {
        schema.validate()?;
        debug!(model = %schema.name, "created model instance");
        Ok(Self {
            schema,
            values: BTreeMap::new(),
            handlers: HashMap::new(),
        })
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<AgentDataValue>,
    ) -> Result<(), CodeFirstError> {
        let value = value.into();
        let property = self
            .schema
            .property(name)
            .ok_or_else(|| CodeFirstError::UnknownProperty {
                model: self.schema.name.clone(),
                property: name.to_string(),
            })?;

        if property.data_type != value.data_type() {
            return Err(CodeFirstError::TypeMismatch {
                name: name.to_string(),
                expected: property.data_type,
                actual: value.data_type(),
            });
        }

        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AgentDataValue> {
        self.values.get(name)
    }

    /// Installs the handler invoked when the cloud calls `action`.
    pub fn on_action<F>(&mut self, action: &str, handler: F) -> Result<(), CodeFirstError>
    where
        F: Fn(&ActionArgs) -> ExecuteCommandResult + Send + Sync + 'static,
    {
        if self.schema.action(action).is_none() {
            return Err(CodeFirstError::UnknownAction {
                model: self.schema.name.clone(),
                action: action.to_string(),
            });
        }
        self.handlers.insert(action.to_string(), Box::new(handler));
        Ok(())
    }

    pub(crate) fn handler(&self, action: &str) -> Option<&ActionHandler> {
        self.handlers.get(action)
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model", &self.schema.name)
            .field("values", &self.values)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
