//! `Name=value;Name=value` connection strings for the hub and its
//! event-hub endpoint.

use std::collections::BTreeMap;

use crate::HubTestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    values: BTreeMap<String, String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, HubTestError> {
        let mut values = BTreeMap::new();
        for part in raw.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            // keys may end in '=' padding, so split on the first '=' only
            let (name, value) = part.split_once('=').ok_or_else(|| {
                HubTestError::ConnectionString(format!("'{part}' is not a Name=value pair"))
            })?;
            if name.is_empty() {
                return Err(HubTestError::ConnectionString(format!(
                    "'{part}' has an empty name"
                )));
            }
            values.insert(name.to_string(), value.to_string());
        }
        if values.is_empty() {
            return Err(HubTestError::ConnectionString("empty connection string".into()));
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> Result<&str, HubTestError> {
        self.get(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| HubTestError::ConnectionString(format!("missing {name}")))
    }
}

/// Service credentials of a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IotHubConnection {
    pub host_name: String,
    pub key_name: String,
    pub key: String,
}

impl IotHubConnection {
    pub fn parse(raw: &str) -> Result<Self, HubTestError> {
        let parsed = ConnectionString::parse(raw)?;
        Ok(Self {
            host_name: parsed.required("HostName")?.to_string(),
            key_name: parsed.required("SharedAccessKeyName")?.to_string(),
            key: parsed.required("SharedAccessKey")?.to_string(),
        })
    }

    /// `(hub name, suffix)` split at the first dot of the host name.
    pub fn name_and_suffix(&self) -> Result<(&str, &str), HubTestError> {
        self.host_name
            .split_once('.')
            .filter(|(name, suffix)| !name.is_empty() && !suffix.is_empty())
            .ok_or_else(|| {
                HubTestError::ConnectionString(format!(
                    "HostName '{}' has no suffix",
                    self.host_name
                ))
            })
    }

    pub fn to_connection_string(&self) -> String {
        format!(
            "HostName={};SharedAccessKeyName={};SharedAccessKey={}",
            self.host_name, self.key_name, self.key
        )
    }
}

/// Listen credentials of the hub's event-hub compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHubConnection {
    pub endpoint: String,
    pub key_name: String,
    pub key: String,
    pub entity_path: Option<String>,
}

impl EventHubConnection {
    pub fn parse(raw: &str) -> Result<Self, HubTestError> {
        let parsed = ConnectionString::parse(raw)?;
        let endpoint = parsed.required("Endpoint")?;
        let endpoint = endpoint
            .strip_prefix("sb://")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            endpoint,
            key_name: parsed.required("SharedAccessKeyName")?.to_string(),
            key: parsed.required("SharedAccessKey")?.to_string(),
            entity_path: parsed.get("EntityPath").map(str::to_string),
        })
    }

    pub fn to_connection_string(&self) -> String {
        let mut raw = format!(
            "Endpoint=sb://{}/;SharedAccessKeyName={};SharedAccessKey={}",
            self.endpoint, self.key_name, self.key
        );
        if let Some(path) = &self.entity_path {
            raw.push_str(&format!(";EntityPath={path}"));
        }
        raw
    }
}
