use std::env;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Name devices and services sign their tokens for, `{hub}.{suffix}`.
    pub host_name: String,
    pub partition_count: u32,
    pub service_key: String,
    pub listen_key: String,
    pub travel_delay_ms: u64,
    pub max_delivery_count: u32,
    /// Events kept per partition; the oldest are dropped past this.
    pub partition_retention: usize,
    pub log_level: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8190,
            host_name: "e2e-hub.local".to_string(),
            partition_count: 4,
            service_key: "bG9jYWwtaHViLXNlcnZpY2Uta2V5LTAwMDAwMDAwMDAwMA==".to_string(),
            listen_key: "bG9jYWwtaHViLWxpc3Rlbi1rZXktMDAwMDAwMDAwMDAwMA==".to_string(),
            travel_delay_ms: 0,
            max_delivery_count: 10,
            partition_retention: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("HUB_SIM_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("HUB_SIM_PORT") {
            cfg.server_port = port.parse().context("HUB_SIM_PORT must be a valid u16")?;
        }
        if let Ok(name) = env::var("HUB_SIM_HOST_NAME") {
            cfg.host_name = name;
        }
        if let Ok(count) = env::var("HUB_SIM_PARTITION_COUNT") {
            cfg.partition_count = count
                .parse()
                .context("HUB_SIM_PARTITION_COUNT must be a positive integer")?;
        }
        if let Ok(key) = env::var("HUB_SIM_SERVICE_KEY") {
            cfg.service_key = key;
        }
        if let Ok(key) = env::var("HUB_SIM_LISTEN_KEY") {
            cfg.listen_key = key;
        }
        if let Ok(delay) = env::var("HUB_SIM_TRAVEL_DELAY_MS") {
            cfg.travel_delay_ms = delay
                .parse()
                .context("HUB_SIM_TRAVEL_DELAY_MS must be a non-negative integer")?;
        }
        if let Ok(count) = env::var("HUB_SIM_MAX_DELIVERY_COUNT") {
            cfg.max_delivery_count = count
                .parse()
                .context("HUB_SIM_MAX_DELIVERY_COUNT must be a positive integer")?;
        }
        if let Ok(retention) = env::var("HUB_SIM_PARTITION_RETENTION") {
            cfg.partition_retention = retention
                .parse()
                .context("HUB_SIM_PARTITION_RETENTION must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Loopback configuration on an ephemeral port.
    pub fn ephemeral() -> Self {
        Self {
            server_port: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_name.trim().is_empty() || !self.host_name.contains('.') {
            anyhow::bail!("HUB_SIM_HOST_NAME must look like '<hub>.<suffix>'");
        }
        if self.partition_count == 0 || self.partition_count > 32 {
            anyhow::bail!("HUB_SIM_PARTITION_COUNT must be between 1 and 32");
        }
        if self.max_delivery_count == 0 {
            anyhow::bail!("HUB_SIM_MAX_DELIVERY_COUNT must be greater than zero");
        }
        if self.partition_retention == 0 {
            anyhow::bail!("HUB_SIM_PARTITION_RETENTION must be greater than zero");
        }
        ensure_key("HUB_SIM_SERVICE_KEY", &self.service_key)?;
        ensure_key("HUB_SIM_LISTEN_KEY", &self.listen_key)?;
        Ok(())
    }

    pub fn hub_name(&self) -> &str {
        self.host_name
            .split_once('.')
            .map(|(name, _)| name)
            .unwrap_or(&self.host_name)
    }

    pub fn hub_suffix(&self) -> &str {
        self.host_name
            .split_once('.')
            .map(|(_, suffix)| suffix)
            .unwrap_or_default()
    }
}

fn ensure_key(name: &str, key: &str) -> Result<()> {
    let decoded = STANDARD
        .decode(key)
        .with_context(|| format!("{name} must be base64"))?;
    if decoded.len() < 16 {
        anyhow::bail!("{name} must decode to at least 16 bytes");
    }
    Ok(())
}
