//! Serializer end-to-end harness.
//!
//! Fixtures, callback adapters, the polling driver and the suite context
//! used by `tests/e2e` to check that models serialized by
//! `telemetry-codefirst` survive a trip through the device client and hub,
//! in both directions, over AMQP and HTTP.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod factory;
pub mod fixture;
pub mod model;
pub mod polling;
pub mod scenarios;
pub mod suite;
pub mod templates;

/// Per-case disambiguator embedded in every payload.
pub type UniqueId = i32;

pub use config::{E2eConfig, HubTarget};
pub use error::HarnessError;
pub use factory::{Clock, FixedClock, FixtureFactory, SystemClock};
pub use fixture::{ReceiveFixture, SendFixture};
pub use polling::{PollOutcome, PollingDriver, Pump};
pub use scenarios::ClientFlavor;
pub use suite::{init_tracing, random_device_id, SuiteContext, TestCase};
