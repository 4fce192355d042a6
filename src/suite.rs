//! Suite lifecycle: the state every case shares, handed out explicitly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use iothub_simulator::{LocalHub, SimulatorConfig};
use iothub_test_harness::AccountInfo;
use rand::Rng;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{E2eConfig, HubTarget};
use crate::factory::FixtureFactory;
use crate::polling::PollingDriver;
use crate::UniqueId;

const LOCAL_SERVICE_KEY_NAME: &str = "iothubowner";
const LOCAL_LISTEN_KEY_NAME: &str = "service";

/// Shared by all cases of a run: configuration, account, fixture factory,
/// the case counter and the lock that keeps cases from overlapping.
pub struct SuiteContext {
    config: E2eConfig,
    account: AccountInfo,
    factory: FixtureFactory,
    polling: PollingDriver,
    last_id: AtomicI32,
    serial: Mutex<()>,
    local_hub: Option<LocalHub>,
}

/// Held for the duration of one case. Dropping it lets the next case start.
pub struct TestCase<'a> {
    _serial: MutexGuard<'a, ()>,
    unique_id: UniqueId,
}

impl TestCase<'_> {
    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }
}

impl SuiteContext {
    pub fn from_env() -> Result<Self> {
        Self::from_config(E2eConfig::from_env()?)
    }

    pub fn from_config(config: E2eConfig) -> Result<Self> {
        config.validate()?;
        init_tracing(&config.log_level);

        let suite = match config.hub_target {
            HubTarget::Local => Self::local(config)?,
            HubTarget::External => Self::external(config)?,
        };
        info!(
            target_hub = %suite.config.hub_target,
            host_name = suite.account.host_name(),
            device_id = %suite.account.device_id,
            partitions = suite.account.partition_count,
            "suite initialized"
        );
        Ok(suite)
    }

    /// Starts an in-process hub and provisions a fresh device on it.
    fn local(config: E2eConfig) -> Result<Self> {
        let sim_config = SimulatorConfig {
            partition_count: config.partition_count,
            travel_delay_ms: config.cloud_travel_delay.as_millis() as u64,
            log_level: config.log_level.clone(),
            ..SimulatorConfig::ephemeral()
        };
        let hub = LocalHub::start(sim_config).context("failed to start local hub")?;

        let device_id = random_device_id();
        let identity = hub
            .store()
            .register_device(&device_id, None)
            .context("failed to provision local device")?;

        let sim = hub.config();
        let iothub = format!(
            "HostName={};SharedAccessKeyName={};SharedAccessKey={}",
            sim.host_name, LOCAL_SERVICE_KEY_NAME, sim.service_key
        );
        let eventhub = format!(
            "Endpoint=sb://{}/;SharedAccessKeyName={};SharedAccessKey={};EntityPath={}",
            sim.host_name,
            LOCAL_LISTEN_KEY_NAME,
            sim.listen_key,
            sim.hub_name()
        );
        let account = AccountInfo::new(
            &iothub,
            &eventhub,
            identity.device_id,
            identity.primary_key,
            sim.partition_count,
        )
        .context("local account is invalid")?
        .with_gateway(hub.gateway_host());

        Ok(Self::assemble(config, account, Some(hub)))
    }

    /// Uses the hub named by the `IOTHUB_*` environment. The device must
    /// already exist there.
    fn external(config: E2eConfig) -> Result<Self> {
        let account = AccountInfo::from_env().context("failed to read hub account from env")?;
        Ok(Self::assemble(config, account, None))
    }

    fn assemble(config: E2eConfig, account: AccountInfo, local_hub: Option<LocalHub>) -> Self {
        Self {
            polling: PollingDriver::new(config.poll_interval),
            config,
            account,
            factory: FixtureFactory::default(),
            last_id: AtomicI32::new(0),
            serial: Mutex::new(()),
            local_hub,
        }
    }

    pub fn with_factory(mut self, factory: FixtureFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Waits for any running case to finish, then hands out the next id.
    pub async fn begin_case(&self) -> TestCase<'_> {
        let serial = self.serial.lock().await;
        let unique_id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!(unique_id, "test case started");
        TestCase {
            _serial: serial,
            unique_id,
        }
    }

    /// Id handed to the most recent case, or 0 before the first one.
    pub fn last_unique_id(&self) -> UniqueId {
        self.last_id.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    pub fn factory(&self) -> &FixtureFactory {
        &self.factory
    }

    pub fn polling(&self) -> PollingDriver {
        self.polling
    }

    pub fn max_cloud_travel_time(&self) -> Duration {
        self.config.max_cloud_travel_time
    }

    pub fn local_hub(&self) -> Option<&LocalHub> {
        self.local_hub.as_ref()
    }
}

/// Installs the test-writer subscriber once per process; later calls are
/// no-ops.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn random_device_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("e2e-device-{suffix:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> E2eConfig {
        E2eConfig {
            hub_target: HubTarget::Local,
            partition_count: 2,
            ..E2eConfig::default()
        }
    }

    #[tokio::test]
    async fn test_ids_increment_once_per_case() {
        let suite = SuiteContext::from_config(local_config()).unwrap();
        assert_eq!(suite.last_unique_id(), 0);

        let first = suite.begin_case().await.unique_id();
        let second = suite.begin_case().await.unique_id();
        let third = suite.begin_case().await.unique_id();

        assert_eq!((first, second, third), (1, 2, 3));
        assert_eq!(suite.last_unique_id(), 3);
    }

    #[tokio::test]
    async fn test_cases_are_serialized() {
        let suite = SuiteContext::from_config(local_config()).unwrap();
        let held = suite.begin_case().await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(100), suite.begin_case()).await;
        assert!(blocked.is_err());

        drop(held);
        let next = suite.begin_case().await;
        assert_eq!(next.unique_id(), 2);
    }

    #[test]
    fn test_local_suite_provisions_device() {
        let suite = SuiteContext::from_config(local_config()).unwrap();
        let hub = suite.local_hub().expect("local hub running");
        let account = suite.account();

        assert_eq!(account.partition_count, 2);
        assert_eq!(account.gateway_host.as_deref(), Some(hub.gateway_host().as_str()));
        let identity = hub.store().device(&account.device_id).expect("device provisioned");
        assert_eq!(identity.primary_key, account.device_key);
        assert!(!account.use_tls());
    }

    #[test]
    fn test_random_device_ids_differ() {
        assert_ne!(random_device_id(), random_device_id());
    }
}
