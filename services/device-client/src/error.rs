use thiserror::Error;

use crate::sas::SasError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown or unsupported option '{0}'")]
    InvalidOption(String),

    #[error("Hub returned {status} for {operation}: {body}")]
    HubStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Link error: {0}")]
    Link(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Frame encoding error: {0}")]
    Encoding(String),

    #[error("Token error: {0}")]
    Token(#[from] SasError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Link(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Encoding(err.to_string())
    }
}
