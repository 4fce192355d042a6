use telemetry_codefirst::{serialize, DataType, ModelInstance, ModelSchema};

use crate::templates::MACRO_ACTION;
use crate::{HarnessError, UniqueId};

pub const DEVICE_MODEL: &str = "deviceModel";

/// The model every macro scenario uses: two data properties and one action
/// taking the same two values.
pub fn device_model_schema() -> ModelSchema {
    ModelSchema::new(DEVICE_MODEL)
        .with_data("property1", DataType::AsciiCharPtr)
        .with_data("UniqueId", DataType::Int)
        .with_action(
            MACRO_ACTION,
            &[("property1", DataType::AsciiCharPtr), ("UniqueId", DataType::Int)],
        )
}

pub fn device_model() -> Result<ModelInstance, HarnessError> {
    Ok(ModelInstance::new(device_model_schema())?)
}

/// Populates `instance` and serializes it.
pub fn serialize_reading(
    instance: &mut ModelInstance,
    timestamp: &str,
    unique_id: UniqueId,
) -> Result<Vec<u8>, HarnessError> {
    instance.set("property1", timestamp)?;
    instance.set("UniqueId", unique_id)?;
    Ok(serialize(instance)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::macro_send_expected;

    #[test]
    fn test_serialized_reading_matches_expected_template() {
        let mut instance = device_model().unwrap();
        let bytes = serialize_reading(&mut instance, "Mon Jan 1 00:00:00 2024", 7).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            macro_send_expected("Mon Jan 1 00:00:00 2024", 7)
        );
    }

    #[test]
    fn test_unpopulated_model_does_not_serialize() {
        let instance = device_model().unwrap();
        assert!(serialize(&instance).is_err());
    }
}
