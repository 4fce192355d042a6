use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use iothub_device_client::sas::generate_sas_token;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{AccountInfo, HubTestError};

const TOKEN_LIFETIME_SECS: i64 = 3600;
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BATCH: usize = 100;

/// Returned by a listen callback to keep draining or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub max_drain_time: Duration,
    pub poll_interval: Duration,
    /// How far before the listen call events are still considered.
    pub lookback: Duration,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            max_drain_time: Duration::from_secs(100),
            poll_interval: Duration::from_millis(100),
            lookback: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSummary {
    /// Whether the callback asked to stop before the drain time ran out.
    pub matched: bool,
    pub events_seen: usize,
    pub elapsed: Duration,
}

/// A telemetry event as read back from the event-hub endpoint.
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub partition: u32,
    pub sequence_number: u64,
    pub enqueued_time: DateTime<Utc>,
    pub device_id: String,
    pub body: Vec<u8>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    partition: u32,
    sequence_number: u64,
    enqueued_time: DateTime<Utc>,
    device_id: String,
    body: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireBatch {
    events: Vec<WireEvent>,
    next_sequence: u64,
}

#[derive(Debug, Serialize)]
struct WireSend<'a> {
    body: String,
    message_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WireSent {
    message_id: String,
}

/// Service-side test client: sends cloud-to-device messages to the account's
/// device and drains telemetry from the event-hub endpoint.
pub struct HubTestClient {
    account: AccountInfo,
    http: Client,
    base_url: String,
    cursors: HashMap<u32, u64>,
}

impl HubTestClient {
    pub fn initialize(account: &AccountInfo) -> Result<Self, HubTestError> {
        account.validate()?;
        let http = Client::builder()
            .user_agent("iothub-test-harness/0.1.0")
            .build()?;
        info!(
            host_name = %account.host_name(),
            device_id = %account.device_id,
            consumer_group = %account.consumer_group,
            "hub test client initialized"
        );
        Ok(Self {
            base_url: account.service_base_url(),
            account: account.clone(),
            http,
            cursors: HashMap::new(),
        })
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    /// Sends `data` to the account's device; returns the hub's message id.
    pub async fn send_message(&self, data: &[u8]) -> Result<String, HubTestError> {
        if data.is_empty() {
            return Err(HubTestError::InvalidArg("message data cannot be empty".into()));
        }

        let url = format!(
            "{}/service/devices/{}/messages",
            self.base_url, self.account.device_id
        );
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.service_token()?)
            .json(&WireSend {
                body: STANDARD.encode(data),
                message_id: None,
            })
            .send()
            .await?;
        let sent: WireSent = check_status("send message", response).await?.json().await?;

        debug!(
            device_id = %self.account.device_id,
            message_id = %sent.message_id,
            bytes = data.len(),
            "cloud-to-device message sent"
        );
        Ok(sent.message_id)
    }

    /// Feeds events from every partition to `callback` until it returns
    /// [`ListenControl::Stop`] or `max_drain_time` passes. Running out of
    /// time is not an error; check [`ListenSummary::matched`].
    pub async fn listen_for_event_for_max_drain_time<F>(
        &mut self,
        partition_count: u32,
        options: &ListenOptions,
        mut callback: F,
    ) -> Result<ListenSummary, HubTestError>
    where
        F: FnMut(&ReceivedEvent) -> ListenControl,
    {
        if partition_count == 0 {
            return Err(HubTestError::InvalidArg(
                "partition count must be greater than zero".into(),
            ));
        }

        let started = Instant::now();
        let enqueued_after = Utc::now()
            - chrono::Duration::from_std(options.lookback)
                .map_err(|err| HubTestError::InvalidArg(err.to_string()))?;
        let mut events_seen = 0;

        loop {
            let mut batch_seen = 0;
            for partition in 0..partition_count {
                let remaining = options.max_drain_time.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    break;
                }

                let events = match self
                    .read_partition(partition, enqueued_after, remaining.min(MAX_REQUEST_TIMEOUT))
                    .await
                {
                    Ok(events) => events,
                    Err(HubTestError::Http(err))
                        if err.is_timeout() && started.elapsed() >= options.max_drain_time =>
                    {
                        debug!(partition, "partition read cut off by the drain deadline");
                        break;
                    }
                    Err(err) => return Err(err),
                };
                for event in events {
                    events_seen += 1;
                    batch_seen += 1;
                    if callback(&event) == ListenControl::Stop {
                        let summary = ListenSummary {
                            matched: true,
                            events_seen,
                            elapsed: started.elapsed(),
                        };
                        info!(
                            events_seen,
                            elapsed_ms = summary.elapsed.as_millis() as u64,
                            "listener matched an event"
                        );
                        return Ok(summary);
                    }
                }
            }

            let remaining = options.max_drain_time.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(
                    events_seen,
                    max_drain_secs = options.max_drain_time.as_secs(),
                    "listener drained without a match"
                );
                return Ok(ListenSummary {
                    matched: false,
                    events_seen,
                    elapsed: started.elapsed(),
                });
            }
            if batch_seen == 0 {
                sleep(options.poll_interval.min(remaining)).await;
            }
        }
    }

    pub fn deinit(self) {
        debug!(device_id = %self.account.device_id, "hub test client released");
    }

    async fn read_partition(
        &mut self,
        partition: u32,
        enqueued_after: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<ReceivedEvent>, HubTestError> {
        let from_sequence = self.cursors.get(&partition).copied().unwrap_or(0);
        let url = format!("{}/eventhub/partitions/{partition}/events", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.listen_token()?)
            .query(&[
                ("from_sequence", from_sequence.to_string()),
                (
                    "enqueued_after_ms",
                    enqueued_after.timestamp_millis().to_string(),
                ),
                ("max_count", READ_BATCH.to_string()),
            ])
            .timeout(timeout)
            .send()
            .await?;
        let batch: WireBatch = check_status("read events", response).await?.json().await?;
        self.cursors.insert(partition, batch.next_sequence);

        batch
            .events
            .into_iter()
            .map(|event| {
                let body = STANDARD
                    .decode(&event.body)
                    .map_err(|err| HubTestError::Decode(err.to_string()))?;
                Ok(ReceivedEvent {
                    partition: event.partition,
                    sequence_number: event.sequence_number,
                    enqueued_time: event.enqueued_time,
                    device_id: event.device_id,
                    body,
                    properties: event.properties,
                })
            })
            .collect()
    }

    fn service_token(&self) -> Result<String, HubTestError> {
        Ok(generate_sas_token(
            &self.account.iothub.host_name,
            &self.account.iothub.key,
            Some(&self.account.iothub.key_name),
            Utc::now().timestamp() + TOKEN_LIFETIME_SECS,
        )?)
    }

    fn listen_token(&self) -> Result<String, HubTestError> {
        Ok(generate_sas_token(
            &self.account.iothub.host_name,
            &self.account.eventhub.key,
            Some(&self.account.eventhub.key_name),
            Utc::now().timestamp() + TOKEN_LIFETIME_SECS,
        )?)
    }
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response, HubTestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HubTestError::HubStatus {
        operation,
        status: status.as_u16(),
        body,
    })
}
