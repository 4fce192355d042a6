use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::api::{create_router, ApiState};
use crate::config::SimulatorConfig;
use crate::store::HubStore;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A simulator serving from its own thread and runtime, so it outlives any
/// single test runtime. Stops when dropped.
pub struct LocalHub {
    addr: SocketAddr,
    config: SimulatorConfig,
    store: Arc<HubStore>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LocalHub {
    pub fn start(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;

        let bind = format!("{}:{}", config.server_host, config.server_port);
        let listener = StdTcpListener::bind(&bind)
            .with_context(|| format!("failed to bind simulator listener on {bind}"))?;
        listener
            .set_nonblocking(true)
            .context("failed to make simulator listener non-blocking")?;
        let addr = listener
            .local_addr()
            .context("failed to read simulator address")?;

        let store = Arc::new(HubStore::from_config(&config));
        let state = Arc::new(ApiState::new(Arc::clone(&store), config.clone()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("iothub-simulator")
            .enable_all()
            .build()
            .context("failed to build simulator runtime")?;

        let thread = std::thread::Builder::new()
            .name("iothub-simulator".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(err) => {
                            error!(error = %err, "simulator listener unusable");
                            return;
                        }
                    };
                    let (stopped_tx, stopped_rx) = oneshot::channel::<()>();
                    let server = axum::serve(listener, create_router(state).into_make_service())
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.await;
                            let _ = stopped_tx.send(());
                        });

                    tokio::select! {
                        result = server => {
                            if let Err(err) = result {
                                error!(error = %err, "simulator server failed");
                            }
                        }
                        _ = async {
                            let _ = stopped_rx.await;
                            tokio::time::sleep(SHUTDOWN_GRACE).await;
                        } => {}
                    }
                });
            })
            .context("failed to spawn simulator thread")?;

        info!(%addr, host_name = %config.host_name, "local hub started");
        Ok(Self {
            addr,
            config,
            store,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` devices and services connect to.
    pub fn gateway_host(&self) -> String {
        self.addr.to_string()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<HubStore> {
        &self.store
    }
}

impl Drop for LocalHub {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("simulator thread panicked");
            }
        }
        info!(addr = %self.addr, "local hub stopped");
    }
}
