use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, ETAG};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use super::{
    device_token, OptionValue, Transport, OPTION_MINIMUM_POLLING_TIME, OPTION_TIMEOUT,
};
use crate::{ClientConfig, ClientError, Message, MessageDisposition, Protocol, ReceivedMessage};

const HEADER_MESSAGE_ID: &str = "iothub-messageid";
const HEADER_CORRELATION_ID: &str = "iothub-correlationid";
const HEADER_APP_PREFIX: &str = "iothub-app-";

const DEFAULT_MINIMUM_POLLING_SECS: u64 = 1500;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 240_000;

/// Request/response transport. Cloud-to-device messages are polled, at most
/// once per `MinimumPollingTime`.
pub struct HttpTransport {
    config: ClientConfig,
    client: Client,
    base_url: String,
    minimum_polling: Duration,
    request_timeout: Duration,
    last_poll: Option<Instant>,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent("iothub-device-client/0.1.0")
            .build()?;
        let base_url = format!(
            "{}/devices/{}",
            config.http_base_url(),
            config.device_id
        );
        Ok(Self {
            config,
            client,
            base_url,
            minimum_polling: Duration::from_secs(DEFAULT_MINIMUM_POLLING_SECS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            last_poll: None,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        Ok(request
            .header(AUTHORIZATION, device_token(&self.config)?)
            .timeout(self.request_timeout))
    }

    fn poll_due(&self) -> bool {
        match self.last_poll {
            Some(at) => at.elapsed() >= self.minimum_polling,
            None => true,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn send_event(&mut self, message: &Message) -> Result<(), ClientError> {
        let url = format!("{}/messages/events", self.base_url);
        let mut request = self.authorized(self.client.post(&url))?;
        if let Some(id) = &message.message_id {
            request = request.header(HEADER_MESSAGE_ID, id);
        }
        if let Some(id) = &message.correlation_id {
            request = request.header(HEADER_CORRELATION_ID, id);
        }
        for (name, value) in &message.properties {
            request = request.header(format!("{HEADER_APP_PREFIX}{name}"), value);
        }

        let response = request
            .body(message.body())
            .send()
            .await
            .map_err(request_error("event post"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HubStatus {
                operation: "send event",
                status: status.as_u16(),
                body,
            });
        }

        debug!(device_id = %self.config.device_id, bytes = message.len(), "event posted");
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<ReceivedMessage>, ClientError> {
        if !self.poll_due() {
            return Ok(None);
        }
        self.last_poll = Some(Instant::now());

        let url = format!("{}/messages/devicebound", self.base_url);
        let response = self
            .authorized(self.client.get(&url))?
            .send()
            .await
            .map_err(request_error("device-bound poll"))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let headers = response.headers().clone();
                let lock_token = headers
                    .get(ETAG)
                    .and_then(|value| value.to_str().ok())
                    .map(|etag| etag.trim_matches('"').to_string())
                    .ok_or_else(|| ClientError::HubStatus {
                        operation: "receive",
                        status: status.as_u16(),
                        body: "response carried no ETag".to_string(),
                    })?;
                let body = response.bytes().await?;

                let mut message = Message::from_bytes(body);
                apply_headers(&mut message, &headers);
                debug!(
                    device_id = %self.config.device_id,
                    lock_token = %lock_token,
                    "received cloud-to-device message"
                );
                Ok(Some(ReceivedMessage {
                    lock_token,
                    message,
                }))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::HubStatus {
                    operation: "receive",
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn settle(
        &mut self,
        lock_token: &str,
        disposition: MessageDisposition,
    ) -> Result<(), ClientError> {
        let url = format!("{}/messages/devicebound/{lock_token}", self.base_url);
        let request = match disposition {
            MessageDisposition::Accepted => self.client.delete(&url),
            MessageDisposition::Rejected => self.client.delete(format!("{url}?reject")),
            MessageDisposition::Abandoned => self.client.post(format!("{url}/abandon")),
        };

        let response = self
            .authorized(request)?
            .send()
            .await
            .map_err(request_error("settlement"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HubStatus {
                operation: "settle",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), ClientError> {
        match name {
            OPTION_MINIMUM_POLLING_TIME => {
                let secs = value.as_u64().ok_or_else(|| {
                    ClientError::InvalidArg(format!("{name} expects an unsigned integer"))
                })?;
                self.minimum_polling = Duration::from_secs(secs);
                Ok(())
            }
            OPTION_TIMEOUT => {
                let millis = value.as_u64().ok_or_else(|| {
                    ClientError::InvalidArg(format!("{name} expects an unsigned integer"))
                })?;
                if millis == 0 {
                    return Err(ClientError::InvalidArg(format!("{name} must be positive")));
                }
                self.request_timeout = Duration::from_millis(millis);
                Ok(())
            }
            other => Err(ClientError::InvalidOption(other.to_string())),
        }
    }

    async fn close(&mut self) {
        self.last_poll = None;
    }
}

/// Requests cut off by the `timeout` option surface as [`ClientError::Timeout`].
fn request_error(what: &'static str) -> impl Fn(reqwest::Error) -> ClientError {
    move |err| {
        if err.is_timeout() {
            ClientError::Timeout(what)
        } else {
            ClientError::Http(err)
        }
    }
}

fn apply_headers(message: &mut Message, headers: &HeaderMap) {
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let name = name.as_str();
        if name == HEADER_MESSAGE_ID {
            message.message_id = Some(value.to_string());
        } else if name == HEADER_CORRELATION_ID {
            message.correlation_id = Some(value.to_string());
        } else if let Some(property) = name.strip_prefix(HEADER_APP_PREFIX) {
            message
                .properties
                .insert(property.to_string(), value.to_string());
        }
    }
}
