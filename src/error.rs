use iothub_device_client::ClientError;
use iothub_test_harness::HubTestError;
use telemetry_codefirst::CodeFirstError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// A fixture mutex could not be taken. Never retried.
    #[error("unable to lock {0}")]
    LockFailed(&'static str),

    #[error("serializer error: {0}")]
    CodeFirst(#[from] CodeFirstError),

    #[error("device client error: {0}")]
    Client(#[from] ClientError),

    #[error("hub test client error: {0}")]
    HubTest(#[from] HubTestError),
}
