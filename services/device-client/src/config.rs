use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Amqp,
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Amqp => "amqp",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amqp" | "amqp_ws" | "amqpws" => Ok(Protocol::Amqp),
            "http" | "https" => Ok(Protocol::Http),
            other => Err(ClientError::InvalidConfig(format!(
                "unknown protocol '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub iothub_name: String,
    pub iothub_suffix: String,
    pub device_id: String,
    pub device_key: String,
    pub protocol: Protocol,
    /// Host (and optional port) to connect to instead of `{name}.{suffix}`.
    pub gateway_host_name: Option<String>,
    pub use_tls: bool,
    pub token_lifetime_secs: i64,
}

impl ClientConfig {
    pub fn new(
        iothub_name: impl Into<String>,
        iothub_suffix: impl Into<String>,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            iothub_name: iothub_name.into(),
            iothub_suffix: iothub_suffix.into(),
            device_id: device_id.into(),
            device_key: device_key.into(),
            protocol,
            gateway_host_name: None,
            use_tls: true,
            token_lifetime_secs: 3600,
        }
    }

    pub fn with_gateway(mut self, host: impl Into<String>, use_tls: bool) -> Self {
        self.gateway_host_name = Some(host.into());
        self.use_tls = use_tls;
        self
    }

    /// Fully qualified hub host name; the audience of device tokens.
    pub fn hub_host_name(&self) -> String {
        format!("{}.{}", self.iothub_name, self.iothub_suffix)
    }

    pub fn connect_host(&self) -> String {
        self.gateway_host_name
            .clone()
            .unwrap_or_else(|| self.hub_host_name())
    }

    pub fn http_base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}", self.connect_host())
    }

    pub fn link_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}/devices/{}/amqp",
            self.connect_host(),
            self.device_id
        )
    }

    pub fn device_resource(&self) -> String {
        format!("{}/devices/{}", self.hub_host_name(), self.device_id)
    }

    pub fn validate(&self) -> Result<&Self, ClientError> {
        if self.iothub_name.trim().is_empty() {
            return Err(ClientError::InvalidConfig("iothub_name cannot be empty".into()));
        }
        if self.iothub_suffix.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "iothub_suffix cannot be empty".into(),
            ));
        }
        if self.device_id.trim().is_empty() {
            return Err(ClientError::InvalidConfig("device_id cannot be empty".into()));
        }
        if self
            .device_id
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || "-.:_".contains(c)))
        {
            return Err(ClientError::InvalidConfig(format!(
                "device_id '{}' contains unsupported characters",
                self.device_id
            )));
        }
        if self.device_key.trim().is_empty() {
            return Err(ClientError::InvalidConfig("device_key cannot be empty".into()));
        }
        if self.token_lifetime_secs <= 0 {
            return Err(ClientError::InvalidConfig(
                "token_lifetime_secs must be greater than 0".into(),
            ));
        }
        Ok(self)
    }
}
