use std::sync::Arc;

use chrono::Local;

use crate::fixture::{ReceiveFixture, SendFixture};
use crate::templates::{
    macro_receive_payload, macro_send_expected, raw_receive_payload, raw_send_payload,
    truncate_timestamp,
};
use crate::UniqueId;

/// Source of the human-readable timestamp embedded in payloads.
pub trait Clock: Send + Sync {
    fn now(&self) -> String;
}

/// Local wall clock, formatted like `Mon Jan  1 00:00:00 2024`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now(&self) -> String {
        self.0.clone()
    }
}

/// Builds fixtures from the payload templates, the clock and a case id.
#[derive(Clone)]
pub struct FixtureFactory {
    clock: Arc<dyn Clock>,
}

impl Default for FixtureFactory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl FixtureFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn fixed(timestamp: impl Into<String>) -> Self {
        Self::new(Arc::new(FixedClock(timestamp.into())))
    }

    pub fn timestamp(&self) -> String {
        truncate_timestamp(&self.clock.now())
    }

    /// Raw send: the event body and the expected event are the same text.
    pub fn send_fixture(&self, unique_id: UniqueId) -> SendFixture {
        SendFixture::new(raw_send_payload(&self.timestamp(), unique_id), unique_id)
    }

    /// Macro send: the expected text the serializer must emit for a model
    /// populated with `timestamp` and `unique_id`.
    pub fn macro_send_fixture(&self, timestamp: &str, unique_id: UniqueId) -> SendFixture {
        SendFixture::new(macro_send_expected(timestamp, unique_id), unique_id)
    }

    pub fn receive_fixture(&self, unique_id: UniqueId) -> ReceiveFixture {
        let payload = raw_receive_payload(&self.timestamp(), unique_id);
        ReceiveFixture::new(payload.clone(), payload, unique_id)
    }

    /// Macro receive: pushes an action command; the action must see the
    /// timestamp alone as `property1`.
    pub fn macro_receive_fixture(&self, unique_id: UniqueId) -> ReceiveFixture {
        let timestamp = self.timestamp();
        ReceiveFixture::new(
            macro_receive_payload(&timestamp, unique_id),
            timestamp,
            unique_id,
        )
    }
}

impl std::fmt::Debug for FixtureFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureFactory").finish_non_exhaustive()
    }
}
