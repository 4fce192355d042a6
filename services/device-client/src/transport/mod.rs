use async_trait::async_trait;
use chrono::Utc;

use crate::sas::generate_sas_token;
use crate::{ClientConfig, ClientError, Message, MessageDisposition, Protocol, ReceivedMessage};

mod amqp;
pub mod frame;
mod http;

pub use amqp::AmqpTransport;
pub use frame::{DeliveryOutcome, FrameContent, LinkFrame};
pub use http::HttpTransport;

pub const OPTION_MINIMUM_POLLING_TIME: &str = "MinimumPollingTime";
pub const OPTION_TIMEOUT: &str = "timeout";
pub const OPTION_MESSAGE_TIMEOUT: &str = "messageTimeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    U64(u64),
    Bool(bool),
    Str(String),
}

impl OptionValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            OptionValue::U64(value) => Some(*value),
            _ => None,
        }
    }
}

/// Moves events and cloud-to-device messages between a device and its hub.
#[async_trait]
pub trait Transport: Send {
    fn protocol(&self) -> Protocol;

    /// Sends one event and returns once the hub has accepted it.
    async fn send_event(&mut self, message: &Message) -> Result<(), ClientError>;

    /// Returns the next cloud-to-device message if one is available now.
    async fn receive(&mut self) -> Result<Option<ReceivedMessage>, ClientError>;

    async fn settle(
        &mut self,
        lock_token: &str,
        disposition: MessageDisposition,
    ) -> Result<(), ClientError>;

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), ClientError>;

    async fn close(&mut self);
}

pub fn create_transport(config: &ClientConfig) -> Result<Box<dyn Transport>, ClientError> {
    match config.protocol {
        Protocol::Http => Ok(Box::new(HttpTransport::new(config.clone())?)),
        Protocol::Amqp => Ok(Box::new(AmqpTransport::new(config.clone()))),
    }
}

pub(crate) fn device_token(config: &ClientConfig) -> Result<String, ClientError> {
    let expiry = Utc::now().timestamp() + config.token_lifetime_secs;
    Ok(generate_sas_token(
        &config.device_resource(),
        &config.device_key,
        None,
        expiry,
    )?)
}
