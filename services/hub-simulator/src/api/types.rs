use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{PartitionInfo, StoredEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    #[serde(default)]
    pub primary_key: Option<String>,
}

/// Service-side cloud-to-device send. `body` is base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendC2dRequest {
    pub body: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendC2dResponse {
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    pub from_sequence: Option<u64>,
    /// Unix milliseconds; older events are skipped.
    pub enqueued_after_ms: Option<i64>,
    pub max_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub partition: u32,
    pub sequence_number: u64,
    pub enqueued_time: DateTime<Utc>,
    pub device_id: String,
    pub body: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl From<StoredEvent> for EventData {
    fn from(event: StoredEvent) -> Self {
        Self {
            partition: event.partition,
            sequence_number: event.sequence_number,
            enqueued_time: event.enqueued_time,
            device_id: event.device_id,
            body: STANDARD.encode(&event.message.body),
            message_id: event.message.message_id,
            correlation_id: event.message.correlation_id,
            properties: event.message.properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub partition: u32,
    pub events: Vec<EventData>,
    /// Sequence number to resume from on the next read.
    pub next_sequence: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionsResponse {
    pub partition_count: u32,
    pub partitions: Vec<PartitionInfo>,
}
