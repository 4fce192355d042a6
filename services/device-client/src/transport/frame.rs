use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ClientError, Message, MessageDisposition, ReceivedMessage};

/// Text frames exchanged on the persistent device link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkFrame {
    /// Device to hub telemetry, settled by a `Settled` frame.
    Transfer {
        delivery_id: u64,
        content: FrameContent,
    },
    Settled {
        delivery_id: u64,
        outcome: DeliveryOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Hub to device message, settled by a `Disposition` frame.
    Deliver {
        lock_token: String,
        content: FrameContent,
    },
    Disposition {
        lock_token: String,
        outcome: MessageDisposition,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Accepted,
    Rejected,
}

/// Message body (base64) and system/application properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameContent {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl FrameContent {
    pub fn from_message(message: &Message) -> Self {
        Self {
            body: STANDARD.encode(message.bytes()),
            message_id: message.message_id.clone(),
            correlation_id: message.correlation_id.clone(),
            properties: message.properties.clone(),
        }
    }

    pub fn decode_body(&self) -> Result<Bytes, ClientError> {
        STANDARD
            .decode(&self.body)
            .map(Bytes::from)
            .map_err(|err| ClientError::Encoding(err.to_string()))
    }

    pub fn into_message(self) -> Result<Message, ClientError> {
        let mut message = Message::from_bytes(self.decode_body()?);
        message.message_id = self.message_id;
        message.correlation_id = self.correlation_id;
        message.properties = self.properties;
        Ok(message)
    }
}

impl LinkFrame {
    pub fn encode(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ClientError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn into_received(self) -> Result<Option<ReceivedMessage>, ClientError> {
        match self {
            LinkFrame::Deliver {
                lock_token,
                content,
            } => Ok(Some(ReceivedMessage {
                lock_token,
                message: content.into_message()?,
            })),
            _ => Ok(None),
        }
    }
}
