use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::transport::OptionValue;
use crate::{
    ClientConfig, ClientError, ConfirmationCallback, DeviceClientLl, Message, MessageCallback,
};

pub const DO_WORK_INTERVAL: Duration = Duration::from_millis(10);

/// Device client with its own worker task pumping the low-level client.
///
/// Must be created from within a Tokio runtime. Callbacks run on the worker.
pub struct DeviceClient {
    inner: Arc<Mutex<DeviceClientLl>>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl DeviceClient {
    pub fn create(config: ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::from_ll(DeviceClientLl::create(config)?))
    }

    pub fn from_ll(client: DeviceClientLl) -> Self {
        let inner = Arc::new(Mutex::new(client));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                loop {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = sleep(DO_WORK_INTERVAL) => {
                            inner.lock().await.do_work().await;
                        }
                    }
                }
                debug!("device client worker stopped");
            }
        });

        Self {
            inner,
            shutdown,
            worker: Some(worker),
        }
    }

    pub async fn set_message_callback(&self, callback: MessageCallback) -> Result<(), ClientError> {
        self.inner.lock().await.set_message_callback(callback)
    }

    pub async fn send_event_async(
        &self,
        message: Message,
        callback: Option<ConfirmationCallback>,
    ) -> Result<(), ClientError> {
        self.inner.lock().await.send_event_async(message, callback)
    }

    pub async fn set_option(&self, name: &str, value: OptionValue) -> Result<(), ClientError> {
        self.inner.lock().await.set_option(name, value)
    }

    /// Stops the worker, then tears the low-level client down.
    pub async fn destroy(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(error = %err, "device client worker ended abnormally");
            }
        }

        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().destroy().await,
            Err(_) => warn!("device client still shared at destroy; leaving it to drop"),
        }
    }
}
