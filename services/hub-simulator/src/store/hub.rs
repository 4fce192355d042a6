use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::HubError;
use crate::config::SimulatorConfig;

const DEFAULT_RETENTION: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub primary_key: String,
    pub created_at: DateTime<Utc>,
}

/// Body and metadata of a message entering the hub from either side.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub body: Bytes,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// A device-to-cloud event as stored in an event-hub partition.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub partition: u32,
    pub sequence_number: u64,
    pub enqueued_time: DateTime<Utc>,
    pub device_id: String,
    pub message: NewMessage,
    visible_at: Instant,
}

/// A cloud-to-device message waiting for, or locked by, its device.
#[derive(Debug, Clone)]
pub struct CloudMessage {
    pub message_id: String,
    pub message: NewMessage,
    pub enqueued_time: DateTime<Utc>,
    pub delivery_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionInfo {
    pub id: u32,
    pub event_count: usize,
    pub last_sequence_number: Option<u64>,
    pub last_enqueued_time: Option<DateTime<Utc>>,
}

/// Window of a partition read. `from_sequence` is inclusive.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub from_sequence: u64,
    pub enqueued_after: Option<DateTime<Utc>>,
    pub max_count: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            from_sequence: 0,
            enqueued_after: None,
            max_count: 100,
        }
    }
}

struct DeviceEntry {
    identity: DeviceIdentity,
    queue: VecDeque<CloudMessage>,
    locked: HashMap<String, CloudMessage>,
    signal: Arc<Notify>,
}

#[derive(Default)]
struct Partition {
    events: VecDeque<StoredEvent>,
    next_sequence: u64,
}

/// In-memory state of the simulated hub: identity registry, device-bound
/// queues and the event-hub partitions telemetry lands in.
pub struct HubStore {
    devices: DashMap<String, DeviceEntry>,
    partitions: DashMap<u32, Partition>,
    partition_count: u32,
    travel_delay: Duration,
    max_delivery_count: u32,
    retention: usize,
}

impl HubStore {
    pub fn new(partition_count: u32, travel_delay: Duration, max_delivery_count: u32) -> Self {
        let partitions = DashMap::new();
        for id in 0..partition_count {
            partitions.insert(id, Partition::default());
        }
        Self {
            devices: DashMap::new(),
            partitions,
            partition_count,
            travel_delay,
            max_delivery_count,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Caps how many events each partition keeps.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(
            config.partition_count,
            Duration::from_millis(config.travel_delay_ms),
            config.max_delivery_count,
        )
        .with_retention(config.partition_retention)
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Creates the device, or updates its key when one is given. Without a
    /// key a new device gets a random one and an existing device keeps its own.
    pub fn register_device(
        &self,
        device_id: &str,
        primary_key: Option<String>,
    ) -> Result<DeviceIdentity, HubError> {
        validate_device_id(device_id)?;
        if let Some(key) = &primary_key {
            STANDARD
                .decode(key)
                .map_err(|err| HubError::InvalidKey(err.to_string()))?;
        }

        let mut entry = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                info!(device_id, "device registered");
                DeviceEntry {
                    identity: DeviceIdentity {
                        device_id: device_id.to_string(),
                        primary_key: random_key(),
                        created_at: Utc::now(),
                    },
                    queue: VecDeque::new(),
                    locked: HashMap::new(),
                    signal: Arc::new(Notify::new()),
                }
            });
        if let Some(key) = primary_key {
            entry.identity.primary_key = key;
        }
        Ok(entry.identity.clone())
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceIdentity> {
        self.devices.get(device_id).map(|entry| entry.identity.clone())
    }

    pub fn remove_device(&self, device_id: &str) -> Result<(), HubError> {
        match self.devices.remove(device_id) {
            Some(_) => {
                info!(device_id, "device removed");
                Ok(())
            }
            None => Err(HubError::DeviceNotFound(device_id.to_string())),
        }
    }

    /// Appends a telemetry event to the partition owning `device_id`.
    pub fn enqueue_event(
        &self,
        device_id: &str,
        message: NewMessage,
    ) -> Result<StoredEvent, HubError> {
        if !self.devices.contains_key(device_id) {
            return Err(HubError::DeviceNotFound(device_id.to_string()));
        }

        let partition_id = partition_for(device_id, self.partition_count);
        let mut partition = self
            .partitions
            .get_mut(&partition_id)
            .ok_or(HubError::InvalidPartition {
                partition: partition_id,
                count: self.partition_count,
            })?;

        let event = StoredEvent {
            partition: partition_id,
            sequence_number: partition.next_sequence,
            enqueued_time: Utc::now(),
            device_id: device_id.to_string(),
            message,
            visible_at: Instant::now() + self.travel_delay,
        };
        partition.next_sequence += 1;
        partition.events.push_back(event.clone());
        if partition.events.len() > self.retention {
            let excess = partition.events.len() - self.retention;
            partition.events.drain(..excess);
        }

        debug!(
            device_id,
            partition = partition_id,
            sequence_number = event.sequence_number,
            bytes = event.message.body.len(),
            "event enqueued"
        );
        Ok(event)
    }

    /// Events of one partition that have finished travelling, oldest first.
    pub fn read_events(
        &self,
        partition_id: u32,
        query: &EventQuery,
    ) -> Result<Vec<StoredEvent>, HubError> {
        let partition = self
            .partitions
            .get(&partition_id)
            .ok_or(HubError::InvalidPartition {
                partition: partition_id,
                count: self.partition_count,
            })?;

        let now = Instant::now();
        let start = partition
            .events
            .partition_point(|event| event.sequence_number < query.from_sequence);
        Ok(partition
            .events
            .range(start..)
            .take_while(|event| event.visible_at <= now)
            .filter(|event| {
                query
                    .enqueued_after
                    .map_or(true, |after| event.enqueued_time >= after)
            })
            .take(query.max_count)
            .cloned()
            .collect())
    }

    pub fn partition_info(&self) -> Vec<PartitionInfo> {
        let mut infos: Vec<PartitionInfo> = self
            .partitions
            .iter()
            .map(|entry| {
                let last = entry.events.back();
                PartitionInfo {
                    id: *entry.key(),
                    event_count: entry.events.len(),
                    last_sequence_number: last.map(|event| event.sequence_number),
                    last_enqueued_time: last.map(|event| event.enqueued_time),
                }
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Queues a cloud-to-device message and wakes any open device link.
    pub fn send_c2d(&self, device_id: &str, message: NewMessage) -> Result<String, HubError> {
        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| HubError::DeviceNotFound(device_id.to_string()))?;

        let message_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        entry.queue.push_back(CloudMessage {
            message_id: message_id.clone(),
            message,
            enqueued_time: Utc::now(),
            delivery_count: 0,
        });
        entry.signal.notify_one();

        debug!(device_id, %message_id, queued = entry.queue.len(), "cloud-to-device message queued");
        Ok(message_id)
    }

    /// Locks the oldest queued message for `device_id`.
    pub fn receive_c2d(&self, device_id: &str) -> Result<Option<(String, CloudMessage)>, HubError> {
        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| HubError::DeviceNotFound(device_id.to_string()))?;

        let Some(mut message) = entry.queue.pop_front() else {
            return Ok(None);
        };
        message.delivery_count += 1;
        let lock_token = Uuid::new_v4().to_string();
        entry.locked.insert(lock_token.clone(), message.clone());
        Ok(Some((lock_token, message)))
    }

    pub fn complete_c2d(&self, device_id: &str, lock_token: &str) -> Result<(), HubError> {
        let message = self.take_locked(device_id, lock_token)?;
        debug!(device_id, message_id = %message.message_id, "cloud-to-device message completed");
        Ok(())
    }

    pub fn reject_c2d(&self, device_id: &str, lock_token: &str) -> Result<(), HubError> {
        let message = self.take_locked(device_id, lock_token)?;
        warn!(device_id, message_id = %message.message_id, "cloud-to-device message rejected");
        Ok(())
    }

    /// Puts the message back at the head of the queue unless it has used up
    /// its deliveries, in which case it is dropped.
    pub fn abandon_c2d(&self, device_id: &str, lock_token: &str) -> Result<(), HubError> {
        let message = self.take_locked(device_id, lock_token)?;
        if message.delivery_count >= self.max_delivery_count {
            warn!(
                device_id,
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "cloud-to-device message dead-lettered"
            );
            return Ok(());
        }

        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| HubError::DeviceNotFound(device_id.to_string()))?;
        entry.queue.push_front(message);
        entry.signal.notify_one();
        Ok(())
    }

    /// Returns a message that never reached its device to the head of the
    /// queue. The delivery does not count against the message.
    pub fn release_c2d(&self, device_id: &str, lock_token: &str) -> Result<(), HubError> {
        let mut message = self.take_locked(device_id, lock_token)?;
        message.delivery_count = message.delivery_count.saturating_sub(1);

        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| HubError::DeviceNotFound(device_id.to_string()))?;
        debug!(device_id, message_id = %message.message_id, "cloud-to-device message released");
        entry.queue.push_front(message);
        entry.signal.notify_one();
        Ok(())
    }

    pub fn pending_c2d(&self, device_id: &str) -> usize {
        self.devices
            .get(device_id)
            .map_or(0, |entry| entry.queue.len())
    }

    /// Wake-up handle fired whenever a message becomes receivable.
    pub fn c2d_signal(&self, device_id: &str) -> Result<Arc<Notify>, HubError> {
        self.devices
            .get(device_id)
            .map(|entry| Arc::clone(&entry.signal))
            .ok_or_else(|| HubError::DeviceNotFound(device_id.to_string()))
    }

    fn take_locked(&self, device_id: &str, lock_token: &str) -> Result<CloudMessage, HubError> {
        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| HubError::DeviceNotFound(device_id.to_string()))?;
        entry
            .locked
            .remove(lock_token)
            .ok_or_else(|| HubError::LockNotFound {
                device_id: device_id.to_string(),
                lock_token: lock_token.to_string(),
            })
    }
}

/// Stable FNV-1a assignment of a device to a partition.
pub fn partition_for(device_id: &str, partition_count: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in device_id.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % partition_count.max(1)
}

fn validate_device_id(device_id: &str) -> Result<(), HubError> {
    if device_id.is_empty() || device_id.len() > 128 {
        return Err(HubError::InvalidDeviceId(format!(
            "'{device_id}' must be 1 to 128 characters"
        )));
    }
    if device_id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || "-.:_".contains(c)))
    {
        return Err(HubError::InvalidDeviceId(format!(
            "'{device_id}' contains unsupported characters"
        )));
    }
    Ok(())
}

fn random_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}
