//! Adapters handed to the device client, the serializer and the hub listener.
//!
//! None of them can fail the transport. A lock failure is logged and the
//! flag stays unset; the driver's next check under the same lock reports it.

use std::sync::Arc;

use iothub_device_client::{
    ConfirmationCallback, ConfirmationResult, Message, MessageCallback, MessageDisposition,
};
use iothub_test_harness::{ListenControl, ReceivedEvent};
use telemetry_codefirst::{execute_command, ActionArgs, ExecuteCommandResult, ModelInstance};
use tracing::{debug, error, warn};

use crate::fixture::{ReceiveFixture, SendFixture};

/// Raises `data_was_sent` whatever the confirmation result.
pub fn on_send_confirmation(fixture: &SendFixture, result: ConfirmationResult) {
    debug!(unique_id = fixture.unique_id(), %result, "send confirmation");
    if let Err(err) = fixture.mark_sent() {
        error!(error = %err, "send confirmation could not record delivery");
    }
}

/// Listener callback: stop draining once the expected event shows up.
pub fn on_hub_event(fixture: &SendFixture, event: &ReceivedEvent) -> ListenControl {
    match fixture.match_event(&event.body) {
        Ok(true) => ListenControl::Stop,
        Ok(false) => ListenControl::Continue,
        Err(err) => {
            error!(error = %err, partition = event.partition, "hub event comparison failed");
            ListenControl::Stop
        }
    }
}

/// Byte comparison of a cloud-to-device message. Always accepted.
pub fn on_device_message(fixture: &ReceiveFixture, message: &Message) -> MessageDisposition {
    match fixture.match_bytes(message.bytes()) {
        Ok(matched) => debug!(unique_id = fixture.unique_id(), matched, "device message"),
        Err(err) => error!(error = %err, "device message comparison failed"),
    }
    MessageDisposition::Accepted
}

/// Handler for the model's action.
pub fn on_macro_action(fixture: &ReceiveFixture, args: &ActionArgs) -> ExecuteCommandResult {
    let (Some(property1), Some(unique_id)) = (args.str("property1"), args.int("UniqueId")) else {
        warn!("action invoked without property1 or UniqueId");
        return ExecuteCommandResult::Failed;
    };

    match fixture.match_action(property1, unique_id) {
        Ok(matched) => {
            debug!(unique_id, matched, "model action invoked");
            ExecuteCommandResult::Success
        }
        Err(err) => {
            error!(error = %err, "model action comparison failed");
            ExecuteCommandResult::Error
        }
    }
}

pub fn confirmation_handler(fixture: Arc<SendFixture>) -> ConfirmationCallback {
    Box::new(move |result| on_send_confirmation(&fixture, result))
}

/// Feeds every inbound message to the serializer's command dispatcher and
/// accepts it regardless of the command outcome.
pub fn model_message_handler(instance: Arc<ModelInstance>) -> MessageCallback {
    Arc::new(move |message: &Message| {
        match std::str::from_utf8(message.bytes()) {
            Ok(command) => {
                let result = execute_command(&instance, command);
                debug!(result = result.as_str(), "executed command");
            }
            Err(err) => warn!(error = %err, "device message is not UTF-8; not dispatched"),
        }
        MessageDisposition::Accepted
    })
}

pub fn macro_action_handler(
    fixture: Arc<ReceiveFixture>,
) -> impl Fn(&ActionArgs) -> ExecuteCommandResult + Send + Sync + 'static {
    move |args: &ActionArgs| on_macro_action(&fixture, args)
}

pub fn raw_message_handler(fixture: Arc<ReceiveFixture>) -> MessageCallback {
    Arc::new(move |message: &Message| on_device_message(&fixture, message))
}
