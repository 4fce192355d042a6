use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::transport::{create_transport, OptionValue, Transport};
use crate::{
    ClientConfig, ClientError, ConfirmationCallback, ConfirmationResult, Message,
    MessageCallback, MessageDisposition,
};

/// Upper bound on cloud-to-device messages handled by one `do_work` call.
const MAX_MESSAGES_PER_WORK: usize = 16;

struct PendingEvent {
    message: Message,
    callback: Option<ConfirmationCallback>,
}

/// Low-level device client. Nothing moves unless the caller pumps
/// [`DeviceClientLl::do_work`].
pub struct DeviceClientLl {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    message_callback: Option<MessageCallback>,
    outbound: VecDeque<PendingEvent>,
}

impl DeviceClientLl {
    pub fn create(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = create_transport(&config)?;
        Self::with_transport(config, transport)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        info!(
            device_id = %config.device_id,
            protocol = %transport.protocol(),
            "device client created"
        );
        Ok(Self {
            config,
            transport,
            message_callback: None,
            outbound: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_message_callback(&mut self, callback: MessageCallback) -> Result<(), ClientError> {
        self.message_callback = Some(callback);
        Ok(())
    }

    /// Queues `message`; `callback` fires from a later `do_work` once the hub
    /// has settled it, or with `BecauseDestroy` if the client goes first.
    pub fn send_event_async(
        &mut self,
        message: Message,
        callback: Option<ConfirmationCallback>,
    ) -> Result<(), ClientError> {
        if message.is_empty() {
            return Err(ClientError::InvalidArg("event body cannot be empty".into()));
        }
        self.outbound.push_back(PendingEvent { message, callback });
        Ok(())
    }

    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), ClientError> {
        self.transport.set_option(name, &value)
    }

    pub fn pending_events(&self) -> usize {
        self.outbound.len()
    }

    pub async fn do_work(&mut self) {
        while let Some(event) = self.outbound.pop_front() {
            let result = match self.transport.send_event(&event.message).await {
                Ok(()) => ConfirmationResult::Ok,
                Err(ClientError::Timeout(what)) => {
                    warn!(device_id = %self.config.device_id, what, "event confirmation timed out");
                    ConfirmationResult::MessageTimeout
                }
                Err(err) => {
                    warn!(device_id = %self.config.device_id, error = %err, "event send failed");
                    ConfirmationResult::Error
                }
            };
            debug!(device_id = %self.config.device_id, %result, "event confirmed");
            if let Some(callback) = event.callback {
                callback(result);
            }
        }

        let Some(callback) = self.message_callback.as_ref().map(Arc::clone) else {
            return;
        };

        for _ in 0..MAX_MESSAGES_PER_WORK {
            let received = match self.transport.receive().await {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(err) => {
                    warn!(device_id = %self.config.device_id, error = %err, "receive failed");
                    break;
                }
            };

            let disposition = callback(&received.message);
            debug!(
                device_id = %self.config.device_id,
                lock_token = %received.lock_token,
                ?disposition,
                "cloud-to-device message handled"
            );
            if let Err(err) = self
                .transport
                .settle(&received.lock_token, disposition)
                .await
            {
                warn!(device_id = %self.config.device_id, error = %err, "settle failed");
            }
        }
    }

    pub async fn destroy(mut self) {
        self.transport.close().await;
        info!(device_id = %self.config.device_id, "device client destroyed");
    }

    fn abandon_pending(&mut self) {
        for event in self.outbound.drain(..) {
            if let Some(callback) = event.callback {
                callback(ConfirmationResult::BecauseDestroy);
            }
        }
    }
}

impl Drop for DeviceClientLl {
    fn drop(&mut self) {
        self.abandon_pending();
    }
}

/// The default message handler accepts everything.
pub fn accept_all() -> MessageCallback {
    Arc::new(|_| MessageDisposition::Accepted)
}
