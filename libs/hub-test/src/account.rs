use std::env;

use iothub_device_client::{ClientConfig, Protocol};

use crate::connection_string::{EventHubConnection, IotHubConnection};
use crate::HubTestError;

pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

/// Credentials and coordinates of the hub a suite runs against.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub iothub: IotHubConnection,
    pub eventhub: EventHubConnection,
    pub consumer_group: String,
    pub partition_count: u32,
    pub device_id: String,
    pub device_key: String,
    /// `host:port` to reach instead of the hub host name. Gateway
    /// connections are plain text.
    pub gateway_host: Option<String>,
}

impl AccountInfo {
    pub fn new(
        iothub_connection_string: &str,
        eventhub_connection_string: &str,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
        partition_count: u32,
    ) -> Result<Self, HubTestError> {
        let account = Self {
            iothub: IotHubConnection::parse(iothub_connection_string)?,
            eventhub: EventHubConnection::parse(eventhub_connection_string)?,
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            partition_count,
            device_id: device_id.into(),
            device_key: device_key.into(),
            gateway_host: None,
        };
        account.validate()?;
        Ok(account)
    }

    pub fn with_gateway(mut self, host: impl Into<String>) -> Self {
        self.gateway_host = Some(host.into());
        self
    }

    pub fn from_env() -> Result<Self, HubTestError> {
        let iothub = required_env("IOTHUB_CONNECTION_STRING")?;
        let eventhub = required_env("IOTHUB_EVENTHUB_CONNECTION_STRING")?;
        let device_id = required_env("IOTHUB_DEVICE_ID")?;
        let device_key = required_env("IOTHUB_DEVICE_KEY")?;
        let partition_count = required_env("IOTHUB_PARTITION_COUNT")?
            .parse()
            .map_err(|_| {
                HubTestError::Config("IOTHUB_PARTITION_COUNT must be a positive integer".into())
            })?;

        let mut account = Self::new(&iothub, &eventhub, device_id, device_key, partition_count)?;
        if let Ok(group) = env::var("IOTHUB_EVENTHUB_CONSUMER_GROUP") {
            account.consumer_group = group;
        }
        if let Ok(host) = env::var("IOTHUB_GATEWAY_HOST") {
            account.gateway_host = Some(host);
        }
        account.validate()?;
        Ok(account)
    }

    pub fn validate(&self) -> Result<(), HubTestError> {
        self.iothub.name_and_suffix()?;
        if self.partition_count == 0 {
            return Err(HubTestError::Config(
                "partition count must be greater than zero".into(),
            ));
        }
        if self.device_id.trim().is_empty() {
            return Err(HubTestError::Config("device id cannot be empty".into()));
        }
        if self.device_key.trim().is_empty() {
            return Err(HubTestError::Config("device key cannot be empty".into()));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(HubTestError::Config("consumer group cannot be empty".into()));
        }
        Ok(())
    }

    pub fn host_name(&self) -> &str {
        &self.iothub.host_name
    }

    pub fn iothub_name(&self) -> &str {
        self.iothub
            .name_and_suffix()
            .map(|(name, _)| name)
            .unwrap_or(&self.iothub.host_name)
    }

    pub fn iothub_suffix(&self) -> &str {
        self.iothub
            .name_and_suffix()
            .map(|(_, suffix)| suffix)
            .unwrap_or_default()
    }

    pub fn use_tls(&self) -> bool {
        self.gateway_host.is_none()
    }

    /// Base URL of the hub's service and event-hub routes.
    pub fn service_base_url(&self) -> String {
        match &self.gateway_host {
            Some(host) => format!("http://{host}"),
            None => format!("https://{}", self.iothub.host_name),
        }
    }

    /// Device client configuration for this account's device.
    pub fn client_config(&self, protocol: Protocol) -> ClientConfig {
        let config = ClientConfig::new(
            self.iothub_name(),
            self.iothub_suffix(),
            self.device_id.clone(),
            self.device_key.clone(),
            protocol,
        );
        match &self.gateway_host {
            Some(host) => config.with_gateway(host.clone(), false),
            None => config,
        }
    }
}

fn required_env(name: &'static str) -> Result<String, HubTestError> {
    env::var(name).map_err(|_| HubTestError::Config(format!("{name} is not set")))
}
