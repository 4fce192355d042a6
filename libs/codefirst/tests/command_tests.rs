//! Command dispatch tests

use std::sync::{Arc, Mutex};

use telemetry_codefirst::{execute_command, DataType, ExecuteCommandResult, ModelInstance, ModelSchema};

fn device_model() -> ModelSchema {
    ModelSchema::new("deviceModel")
        .with_data("property1", DataType::AsciiCharPtr)
        .with_data("UniqueId", DataType::Int)
        .with_action(
            "dataMacroCallback",
            &[("property1", DataType::AsciiCharPtr), ("UniqueId", DataType::Int)],
        )
}

fn recording_instance() -> (ModelInstance, Arc<Mutex<Vec<(String, i32)>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut instance = ModelInstance::new(device_model()).unwrap();
    let sink = Arc::clone(&calls);
    instance
        .on_action("dataMacroCallback", move |args| {
            let property1 = args.str("property1").unwrap_or_default().to_string();
            let unique_id = args.int("UniqueId").unwrap_or_default();
            sink.lock().unwrap().push((property1, unique_id));
            ExecuteCommandResult::Success
        })
        .unwrap();
    (instance, calls)
}

#[test]
fn test_dispatch_invokes_handler_with_typed_args() {
    let (instance, calls) = recording_instance();
    let command = r#"{"Name":"dataMacroCallback","Parameters":{"property1":"Mon Jan 1 00:00:00 2024","UniqueId":7}}"#;

    assert_eq!(execute_command(&instance, command), ExecuteCommandResult::Success);
    assert_eq!(
        calls.lock().unwrap().as_slice(),
        &[("Mon Jan 1 00:00:00 2024".to_string(), 7)]
    );
}

#[test]
fn test_dispatch_tolerates_whitespace_and_member_order() {
    let (instance, calls) = recording_instance();
    let command = r#"{"Name": "dataMacroCallback", "Parameters":{"UniqueId": 3, "property1":"x"}}"#;

    assert_eq!(execute_command(&instance, command), ExecuteCommandResult::Success);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn test_dispatch_rejects_bad_payloads() {
    let (instance, calls) = recording_instance();

    assert_eq!(execute_command(&instance, "not json"), ExecuteCommandResult::Error);
    assert_eq!(
        execute_command(&instance, r#"{"Name":"reboot","Parameters":{}}"#),
        ExecuteCommandResult::Error
    );
    assert_eq!(
        execute_command(
            &instance,
            r#"{"Name":"dataMacroCallback","Parameters":{"property1":"x"}}"#
        ),
        ExecuteCommandResult::Error
    );
    assert_eq!(
        execute_command(
            &instance,
            r#"{"Name":"dataMacroCallback","Parameters":{"property1":"x","UniqueId":"7"}}"#
        ),
        ExecuteCommandResult::Error
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_dispatch_without_handler_fails() {
    let instance = ModelInstance::new(device_model()).unwrap();
    let command = r#"{"Name":"dataMacroCallback","Parameters":{"property1":"x","UniqueId":1}}"#;
    assert_eq!(execute_command(&instance, command), ExecuteCommandResult::Failed);
}
