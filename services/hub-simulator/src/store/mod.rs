mod error;
mod hub;

pub use error::HubError;
pub use hub::{
    partition_for, CloudMessage, DeviceIdentity, EventQuery, HubStore, NewMessage,
    PartitionInfo, StoredEvent,
};
