use std::sync::Arc;

pub mod auth;
pub mod handlers;
pub mod link;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use crate::config::SimulatorConfig;
use crate::store::HubStore;

pub struct ApiState {
    pub store: Arc<HubStore>,
    pub config: Arc<SimulatorConfig>,
}

impl ApiState {
    pub fn new(store: Arc<HubStore>, config: SimulatorConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}
