pub mod api;
pub mod config;
pub mod local;
pub mod store;

pub use api::{create_router, ApiState, ErrorResponse, EventBatch, EventData, SendC2dRequest};
pub use config::SimulatorConfig;
pub use local::LocalHub;
pub use store::{partition_for, DeviceIdentity, HubError, HubStore, NewMessage, StoredEvent};
