//! Bounded waits on fixture flags.

use std::time::Duration;

use async_trait::async_trait;
use iothub_device_client::DeviceClientLl;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Observed,
    TimedOut,
}

impl PollOutcome {
    pub fn is_observed(&self) -> bool {
        matches!(self, PollOutcome::Observed)
    }
}

/// Something that must be driven by the caller for I/O to progress.
#[async_trait]
pub trait Pump: Send {
    async fn pump(&mut self);
}

#[async_trait]
impl Pump for DeviceClientLl {
    async fn pump(&mut self) {
        self.do_work().await;
    }
}

/// Checks a condition until it holds or a ceiling passes. Between checks the
/// driver waits at most `interval`.
#[derive(Debug, Clone, Copy)]
pub struct PollingDriver {
    interval: Duration,
}

impl PollingDriver {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Re-checks whenever `wake` fires or `interval` passes, whichever comes
    /// first. `check` should read a flag under its fixture lock; an error
    /// ends the wait immediately.
    pub async fn wait_for<F>(
        &self,
        ceiling: Duration,
        wake: &Notify,
        mut check: F,
    ) -> Result<PollOutcome, HarnessError>
    where
        F: FnMut() -> Result<bool, HarnessError>,
    {
        let started = Instant::now();
        loop {
            if check()? {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "condition observed");
                return Ok(PollOutcome::Observed);
            }
            let elapsed = started.elapsed();
            if elapsed >= ceiling {
                return Ok(PollOutcome::TimedOut);
            }
            let _ = timeout(self.interval.min(ceiling - elapsed), wake.notified()).await;
        }
    }

    /// Like [`wait_for`](Self::wait_for), but pumps `pump` before each check
    /// and sleeps a full interval between rounds.
    pub async fn wait_for_pumped<P, F>(
        &self,
        ceiling: Duration,
        pump: &mut P,
        mut check: F,
    ) -> Result<PollOutcome, HarnessError>
    where
        P: Pump + ?Sized,
        F: FnMut() -> Result<bool, HarnessError>,
    {
        let started = Instant::now();
        loop {
            pump.pump().await;
            if check()? {
                return Ok(PollOutcome::Observed);
            }
            let elapsed = started.elapsed();
            if elapsed >= ceiling {
                return Ok(PollOutcome::TimedOut);
            }
            sleep(self.interval.min(ceiling - elapsed)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingPump {
        rounds: usize,
    }

    #[async_trait]
    impl Pump for CountingPump {
        async fn pump(&mut self) {
            self.rounds += 1;
        }
    }

    #[tokio::test]
    async fn test_times_out_when_flag_stays_false() {
        let driver = PollingDriver::new(Duration::from_millis(20));
        let wake = Notify::new();
        let started = std::time::Instant::now();

        let outcome = driver
            .wait_for(Duration::from_millis(150), &wake, || Ok(false))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_notify_wakes_before_interval() {
        let driver = PollingDriver::new(Duration::from_secs(5));
        let wake = Arc::new(Notify::new());
        let flag = Arc::new(AtomicBool::new(false));

        tokio::spawn({
            let wake = Arc::clone(&wake);
            let flag = Arc::clone(&flag);
            async move {
                sleep(Duration::from_millis(30)).await;
                flag.store(true, Ordering::SeqCst);
                wake.notify_one();
            }
        });

        let started = std::time::Instant::now();
        let outcome = driver
            .wait_for(Duration::from_secs(10), &wake, || Ok(flag.load(Ordering::SeqCst)))
            .await
            .unwrap();

        assert!(outcome.is_observed());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_check_error_aborts_wait() {
        let driver = PollingDriver::new(Duration::from_millis(10));
        let wake = Notify::new();
        let result = driver
            .wait_for(Duration::from_secs(10), &wake, || {
                Err(HarnessError::LockFailed("test"))
            })
            .await;
        assert!(matches!(result, Err(HarnessError::LockFailed("test"))));
    }

    #[tokio::test]
    async fn test_pumped_wait_drives_pump_each_round() {
        let driver = PollingDriver::new(Duration::from_millis(5));
        let mut pump = CountingPump { rounds: 0 };
        let mut checks = 0;

        let outcome = driver
            .wait_for_pumped(Duration::from_secs(5), &mut pump, || {
                checks += 1;
                Ok(checks >= 3)
            })
            .await
            .unwrap();

        assert!(outcome.is_observed());
        assert_eq!(pump.rounds, 3);
    }

    #[tokio::test]
    async fn test_pumped_wait_times_out() {
        let driver = PollingDriver::new(Duration::from_millis(20));
        let mut pump = CountingPump { rounds: 0 };

        let outcome = driver
            .wait_for_pumped(Duration::from_millis(100), &mut pump, || Ok(false))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(pump.rounds >= 2);
    }
}
