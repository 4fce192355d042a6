pub mod account;
pub mod client;
pub mod connection_string;
pub mod error;

pub use account::{AccountInfo, DEFAULT_CONSUMER_GROUP};
pub use client::{HubTestClient, ListenControl, ListenOptions, ListenSummary, ReceivedEvent};
pub use connection_string::{ConnectionString, EventHubConnection, IotHubConnection};
pub use error::HubTestError;
