use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use iothub_test_harness::ListenOptions;

/// Where the suite finds its hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubTarget {
    /// An in-process simulator started by the suite.
    Local,
    /// A hub described by the `IOTHUB_*` environment.
    External,
}

impl FromStr for HubTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(HubTarget::Local),
            "external" => Ok(HubTarget::External),
            other => anyhow::bail!("unknown hub target '{other}'"),
        }
    }
}

impl fmt::Display for HubTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubTarget::Local => f.write_str("local"),
            HubTarget::External => f.write_str("external"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct E2eConfig {
    pub max_drain_time: Duration,
    pub max_cloud_travel_time: Duration,
    pub poll_interval: Duration,
    pub hub_target: HubTarget,
    pub partition_count: u32,
    /// Delay the local hub adds before events become readable.
    pub cloud_travel_delay: Duration,
    pub log_level: String,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            max_drain_time: Duration::from_secs(100),
            max_cloud_travel_time: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            hub_target: if cfg!(feature = "external-hub") {
                HubTarget::External
            } else {
                HubTarget::Local
            },
            partition_count: 4,
            cloud_travel_delay: Duration::ZERO,
            log_level: "info".to_string(),
        }
    }
}

impl E2eConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(secs) = env::var("E2E_MAX_DRAIN_TIME_SECS") {
            cfg.max_drain_time = Duration::from_secs(
                secs.parse()
                    .context("E2E_MAX_DRAIN_TIME_SECS must be a positive integer")?,
            );
        }
        if let Ok(secs) = env::var("E2E_MAX_CLOUD_TRAVEL_TIME_SECS") {
            cfg.max_cloud_travel_time = Duration::from_secs(
                secs.parse()
                    .context("E2E_MAX_CLOUD_TRAVEL_TIME_SECS must be a positive integer")?,
            );
        }
        if let Ok(millis) = env::var("E2E_POLL_INTERVAL_MS") {
            cfg.poll_interval = Duration::from_millis(
                millis
                    .parse()
                    .context("E2E_POLL_INTERVAL_MS must be a positive integer")?,
            );
        }
        if let Ok(target) = env::var("E2E_HUB_TARGET") {
            cfg.hub_target = target.parse()?;
        }
        if let Ok(count) = env::var("E2E_PARTITION_COUNT") {
            cfg.partition_count = count
                .parse()
                .context("E2E_PARTITION_COUNT must be a positive integer")?;
        }
        if let Ok(millis) = env::var("E2E_CLOUD_TRAVEL_DELAY_MS") {
            cfg.cloud_travel_delay = Duration::from_millis(
                millis
                    .parse()
                    .context("E2E_CLOUD_TRAVEL_DELAY_MS must be a non-negative integer")?,
            );
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_drain_time.is_zero() {
            anyhow::bail!("E2E_MAX_DRAIN_TIME_SECS must be greater than zero");
        }
        if self.max_cloud_travel_time.is_zero() {
            anyhow::bail!("E2E_MAX_CLOUD_TRAVEL_TIME_SECS must be greater than zero");
        }
        if self.poll_interval.is_zero() {
            anyhow::bail!("E2E_POLL_INTERVAL_MS must be greater than zero");
        }
        if self.partition_count == 0 {
            anyhow::bail!("E2E_PARTITION_COUNT must be greater than zero");
        }
        if self.cloud_travel_delay >= self.max_cloud_travel_time {
            anyhow::bail!("E2E_CLOUD_TRAVEL_DELAY_MS must be below the cloud travel ceiling");
        }
        Ok(())
    }

    /// Listener settings: drain for `max_drain_time`, accepting anything
    /// enqueued within one cloud travel time before the call.
    pub fn listen_options(&self) -> ListenOptions {
        ListenOptions {
            max_drain_time: self.max_drain_time,
            poll_interval: self.poll_interval,
            lookback: self.max_cloud_travel_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ceilings() {
        let config = E2eConfig::default();
        assert_eq!(config.max_drain_time, Duration::from_secs(100));
        assert_eq!(config.max_cloud_travel_time, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = E2eConfig {
            poll_interval: Duration::ZERO,
            ..E2eConfig::default()
        };
        assert!(config.validate().is_err());

        config.poll_interval = Duration::from_millis(100);
        config.cloud_travel_delay = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hub_target_parsing() {
        assert_eq!("LOCAL".parse::<HubTarget>().unwrap(), HubTarget::Local);
        assert_eq!("external".parse::<HubTarget>().unwrap(), HubTarget::External);
        assert!("cloud".parse::<HubTarget>().is_err());
    }
}
