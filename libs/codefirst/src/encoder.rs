use tracing::debug;

use crate::{AgentDataValue, CodeFirstError, ModelInstance};

const MEMBER_SEPARATOR: &str = ", ";

/// Serializes every data property of `instance` into the JSON wire form.
///
/// Members appear in byte order of their names, separated by `", "`, with no
/// space between a key and its value: `{"UniqueId":7, "property1":"x"}`.
pub fn serialize(instance: &ModelInstance) -> Result<Vec<u8>, CodeFirstError> {
    let schema = instance.schema();
    let mut names: Vec<&str> = schema.properties.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();

    let mut members = Vec::with_capacity(names.len());
    for name in names {
        let value = instance
            .get(name)
            .ok_or_else(|| CodeFirstError::PropertyNotSet {
                model: schema.name.clone(),
                property: name.to_string(),
            })?;
        members.push(format!("{}:{}", serde_json::to_string(name)?, encode_value(value)?));
    }

    let document = format!("{{{}}}", members.join(MEMBER_SEPARATOR));
    debug!(
        model = %schema.name,
        bytes = document.len(),
        "serialized model instance"
    );
    Ok(document.into_bytes())
}

fn encode_value(value: &AgentDataValue) -> Result<String, CodeFirstError> {
    match value {
        AgentDataValue::Double(d) if !d.is_finite() => Err(CodeFirstError::Encoding(format!(
            "non-finite double {d} cannot be encoded"
        ))),
        other => Ok(serde_json::to_string(&other.to_json())?),
    }
}
