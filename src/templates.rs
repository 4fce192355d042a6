//! Payload templates. Each takes the truncated timestamp and the case's
//! unique id.

use crate::UniqueId;

/// Name of the model action the cloud invokes on the receive path.
pub const MACRO_ACTION: &str = "dataMacroCallback";

/// Timestamps are cut to this many characters before substitution.
pub const TIMESTAMP_LEN: usize = 24;

/// Plain event sent by the raw send path.
pub fn raw_send_payload(timestamp: &str, unique_id: UniqueId) -> String {
    format!(r#"{{"ExampleData": {{ "SendDate": "{timestamp}", "UniqueId":{unique_id}}} }}"#)
}

/// Command pushed to the device on the raw receive path; also what the
/// device must see byte for byte.
pub fn raw_receive_payload(timestamp: &str, unique_id: UniqueId) -> String {
    format!(
        r#"{{"Name": "testaction", "Parameters": {{ "property1": "{timestamp}", "UniqueId":{unique_id}}} }}"#
    )
}

/// What the serializer emits for the device model on the macro send path.
pub fn macro_send_expected(timestamp: &str, unique_id: UniqueId) -> String {
    format!(r#"{{"UniqueId":{unique_id}, "property1":"{timestamp}"}}"#)
}

/// Command invoking [`MACRO_ACTION`] on the macro receive path.
pub fn macro_receive_payload(timestamp: &str, unique_id: UniqueId) -> String {
    format!(
        r#"{{"Name":"{MACRO_ACTION}", "Parameters":{{"property1":"{timestamp}", "UniqueId": {unique_id}}}}}"#
    )
}

/// First [`TIMESTAMP_LEN`] characters of `timestamp`.
pub fn truncate_timestamp(timestamp: &str) -> String {
    timestamp.chars().take(TIMESTAMP_LEN).collect()
}
