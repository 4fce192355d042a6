use iothub_device_client::sas::SasError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubTestError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("invalid connection string: {0}")]
    ConnectionString(String),

    #[error("account configuration error: {0}")]
    Config(String),

    #[error("hub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned {status}: {body}")]
    HubStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("token generation failed: {0}")]
    Token(#[from] SasError),

    #[error("undecodable event: {0}")]
    Decode(String),
}
