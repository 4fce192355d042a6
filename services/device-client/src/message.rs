use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A device-to-cloud event or a cloud-to-device message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    body: Bytes,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl Message {
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            message_id: None,
            correlation_id: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn from_string(body: &str) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(body.as_bytes()))
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A message handed to the device together with the token that settles it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub lock_token: String,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationResult {
    Ok,
    BecauseDestroy,
    MessageTimeout,
    Error,
}

impl fmt::Display for ConfirmationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfirmationResult::Ok => "IOTHUB_CLIENT_CONFIRMATION_OK",
            ConfirmationResult::BecauseDestroy => "IOTHUB_CLIENT_CONFIRMATION_BECAUSE_DESTROY",
            ConfirmationResult::MessageTimeout => "IOTHUB_CLIENT_CONFIRMATION_MESSAGE_TIMEOUT",
            ConfirmationResult::Error => "IOTHUB_CLIENT_CONFIRMATION_ERROR",
        };
        f.write_str(name)
    }
}

/// How the device settles a cloud-to-device message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDisposition {
    Accepted,
    Rejected,
    Abandoned,
}

pub type ConfirmationCallback = Box<dyn FnOnce(ConfirmationResult) + Send>;
pub type MessageCallback = std::sync::Arc<dyn Fn(&Message) -> MessageDisposition + Send + Sync>;
