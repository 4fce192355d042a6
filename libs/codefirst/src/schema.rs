use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{CodeFirstError, DataType};

/// Declaration of a device model: its data properties and its actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    pub properties: Vec<PropertySchema>,
    pub actions: Vec<ActionSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    pub name: String,
    pub arguments: Vec<ArgumentSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    pub name: String,
    pub data_type: DataType,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_data(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.properties.push(PropertySchema {
            name: name.into(),
            data_type,
        });
        self
    }

    pub fn with_action(mut self, name: impl Into<String>, arguments: &[(&str, DataType)]) -> Self {
        self.actions.push(ActionSchema {
            name: name.into(),
            arguments: arguments
                .iter()
                .map(|(arg, data_type)| ArgumentSchema {
                    name: (*arg).to_string(),
                    data_type: *data_type,
                })
                .collect(),
        });
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionSchema> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn validate(&self) -> Result<(), CodeFirstError> {
        if self.name.trim().is_empty() {
            return Err(invalid("model name cannot be empty"));
        }

        if self.properties.is_empty() && self.actions.is_empty() {
            return Err(invalid(format!(
                "model '{}' declares no data and no actions",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for property in &self.properties {
            check_identifier(&property.name)?;
            if !seen.insert(property.name.as_str()) {
                return Err(invalid(format!("duplicate property '{}'", property.name)));
            }
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            check_identifier(&action.name)?;
            if !seen.insert(action.name.as_str()) {
                return Err(invalid(format!("duplicate action '{}'", action.name)));
            }

            let mut args = HashSet::new();
            for argument in &action.arguments {
                check_identifier(&argument.name)?;
                if !args.insert(argument.name.as_str()) {
                    return Err(invalid(format!(
                        "duplicate argument '{}' on action '{}'",
                        argument.name, action.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), CodeFirstError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(invalid(format!("'{name}' is not a valid identifier")))
    }
}

fn invalid(message: impl Into<String>) -> CodeFirstError {
    CodeFirstError::InvalidSchema {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_data_and_action() {
        let schema = ModelSchema::new("deviceModel")
            .with_data("property1", DataType::AsciiCharPtr)
            .with_data("UniqueId", DataType::Int)
            .with_action(
                "dataMacroCallback",
                &[("property1", DataType::AsciiCharPtr), ("UniqueId", DataType::Int)],
            );
        assert!(schema.validate().is_ok());
        assert!(schema.action("dataMacroCallback").is_some());
        assert_eq!(
            schema.property("UniqueId").map(|p| p.data_type),
            Some(DataType::Int)
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let schema = ModelSchema::new("m")
            .with_data("a", DataType::Int)
            .with_data("a", DataType::Bool);
        assert!(matches!(
            schema.validate(),
            Err(CodeFirstError::InvalidSchema { .. })
        ));

        let schema = ModelSchema::new("m").with_action(
            "act",
            &[("x", DataType::Int), ("x", DataType::Int)],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_and_bad_names() {
        assert!(ModelSchema::new("empty").validate().is_err());
        assert!(ModelSchema::new("")
            .with_data("a", DataType::Int)
            .validate()
            .is_err());
        assert!(ModelSchema::new("m")
            .with_data("1abc", DataType::Int)
            .validate()
            .is_err());
    }
}
