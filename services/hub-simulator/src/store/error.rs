use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Device '{0}' is not registered")]
    DeviceNotFound(String),

    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Partition {partition} does not exist (hub has {count})")]
    InvalidPartition { partition: u32, count: u32 },

    #[error("Lock token '{lock_token}' is not held for device '{device_id}'")]
    LockNotFound {
        device_id: String,
        lock_token: String,
    },

    #[error("Invalid device key: {0}")]
    InvalidKey(String),
}
