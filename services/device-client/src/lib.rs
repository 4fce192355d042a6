pub mod client;
pub mod client_ll;
pub mod config;
pub mod error;
pub mod message;
pub mod sas;
pub mod transport;

pub use client::{DeviceClient, DO_WORK_INTERVAL};
pub use client_ll::{accept_all, DeviceClientLl};
pub use config::{ClientConfig, Protocol};
pub use error::ClientError;
pub use message::{
    ConfirmationCallback, ConfirmationResult, Message, MessageCallback, MessageDisposition,
    ReceivedMessage,
};
pub use transport::{
    OptionValue, Transport, OPTION_MESSAGE_TIMEOUT, OPTION_MINIMUM_POLLING_TIME, OPTION_TIMEOUT,
};
