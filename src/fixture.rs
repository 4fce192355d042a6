//! Per-case fixtures shared between the test driver and client callbacks.
//!
//! Every flag lives behind the fixture's own mutex and only ever moves from
//! `false` to `true`. Each change also wakes the fixture's [`Notify`] so the
//! polling driver can re-check before its interval elapses.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use crate::{HarnessError, UniqueId};

#[derive(Debug, Default)]
struct SendFlags {
    was_found: bool,
    data_was_sent: bool,
}

/// Expected device-to-cloud payload plus the flags the send path raises.
#[derive(Debug)]
pub struct SendFixture {
    expected: String,
    unique_id: UniqueId,
    flags: Mutex<SendFlags>,
    changed: Notify,
}

impl SendFixture {
    pub fn new(expected: impl Into<String>, unique_id: UniqueId) -> Self {
        Self {
            expected: expected.into(),
            unique_id,
            flags: Mutex::new(SendFlags::default()),
            changed: Notify::new(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, SendFlags>, HarnessError> {
        self.flags
            .lock()
            .map_err(|_| HarnessError::LockFailed("send fixture"))
    }

    /// Records that the client confirmed the event.
    pub fn mark_sent(&self) -> Result<(), HarnessError> {
        self.lock()?.data_was_sent = true;
        self.changed.notify_one();
        Ok(())
    }

    pub fn was_found(&self) -> Result<bool, HarnessError> {
        Ok(self.lock()?.was_found)
    }

    pub fn data_was_sent(&self) -> Result<bool, HarnessError> {
        Ok(self.lock()?.data_was_sent)
    }

    /// Compares an event body with the expected payload, length first, and
    /// raises `was_found` on an exact match.
    pub fn match_event(&self, body: &[u8]) -> Result<bool, HarnessError> {
        let mut flags = self.lock()?;
        let matched = body.len() == self.expected.len() && body == self.expected.as_bytes();
        if matched {
            flags.was_found = true;
            drop(flags);
            debug!(unique_id = self.unique_id, "send fixture matched event");
            self.changed.notify_one();
        }
        Ok(matched)
    }

    pub fn wake(&self) -> &Notify {
        &self.changed
    }
}

/// Cloud-to-device payload to push plus the data the device must observe.
#[derive(Debug)]
pub struct ReceiveFixture {
    outbound: String,
    compare: String,
    unique_id: UniqueId,
    was_found: Mutex<bool>,
    changed: Notify,
}

impl ReceiveFixture {
    pub fn new(
        outbound: impl Into<String>,
        compare: impl Into<String>,
        unique_id: UniqueId,
    ) -> Self {
        Self {
            outbound: outbound.into(),
            compare: compare.into(),
            unique_id,
            was_found: Mutex::new(false),
            changed: Notify::new(),
        }
    }

    pub fn outbound(&self) -> &str {
        &self.outbound
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn compare(&self) -> &str {
        &self.compare
    }

    pub fn compare_len(&self) -> usize {
        self.compare.len()
    }

    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, bool>, HarnessError> {
        self.was_found
            .lock()
            .map_err(|_| HarnessError::LockFailed("receive fixture"))
    }

    pub fn was_found(&self) -> Result<bool, HarnessError> {
        Ok(*self.lock()?)
    }

    /// Byte comparison against the comparison payload. A mismatch leaves the
    /// flag untouched, including after an earlier match.
    pub fn match_bytes(&self, body: &[u8]) -> Result<bool, HarnessError> {
        let mut found = self.lock()?;
        let matched = body.len() == self.compare.len() && body == self.compare.as_bytes();
        if matched {
            *found = true;
            drop(found);
            self.changed.notify_one();
        }
        Ok(matched)
    }

    /// Matches the arguments of a dispatched model action: the id must be this
    /// case's id and `property1` must equal the comparison data.
    pub fn match_action(
        &self,
        property1: &str,
        unique_id: UniqueId,
    ) -> Result<bool, HarnessError> {
        let mut found = self.lock()?;
        let matched = unique_id == self.unique_id && property1 == self.compare;
        if matched {
            *found = true;
            drop(found);
            self.changed.notify_one();
        }
        Ok(matched)
    }

    pub fn wake(&self) -> &Notify {
        &self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_flags_start_false() {
        let fixture = SendFixture::new("{}", 1);
        assert!(!fixture.was_found().unwrap());
        assert!(!fixture.data_was_sent().unwrap());
    }

    #[test]
    fn test_send_flags_are_monotonic() {
        let fixture = SendFixture::new(r#"{"UniqueId":1}"#, 1);
        fixture.mark_sent().unwrap();
        assert!(fixture.match_event(br#"{"UniqueId":1}"#).unwrap());

        assert!(!fixture.match_event(b"something else").unwrap());
        assert!(!fixture.match_event(br#"{"UniqueId":2}"#).unwrap());
        fixture.mark_sent().unwrap();

        assert!(fixture.was_found().unwrap());
        assert!(fixture.data_was_sent().unwrap());
    }

    #[test]
    fn test_match_event_requires_exact_bytes() {
        let fixture = SendFixture::new("abc", 1);
        assert!(!fixture.match_event(b"abcd").unwrap());
        assert!(!fixture.match_event(b"ab").unwrap());
        assert!(!fixture.was_found().unwrap());
        assert!(fixture.match_event(b"abc").unwrap());
    }

    #[test]
    fn test_receive_flag_survives_mismatches() {
        let fixture = ReceiveFixture::new("out", "Mon Jan 1 00:00:00 2024", 7);
        assert!(!fixture.match_action("Mon Jan 1 00:00:00 2024", 6).unwrap());
        assert!(!fixture.was_found().unwrap());

        assert!(fixture.match_action("Mon Jan 1 00:00:00 2024", 7).unwrap());
        assert!(!fixture.match_action("other", 7).unwrap());
        assert!(!fixture.match_bytes(b"out").unwrap());
        assert!(fixture.was_found().unwrap());
    }

    #[test]
    fn test_receive_lengths() {
        let fixture = ReceiveFixture::new("12345", "123", 1);
        assert_eq!(fixture.outbound_len(), 5);
        assert_eq!(fixture.compare_len(), 3);
        assert!(fixture.match_bytes(b"123").unwrap());
    }

    #[test]
    fn test_poisoned_fixture_reports_lock_failure() {
        let fixture = std::sync::Arc::new(SendFixture::new("x", 1));
        let poison = std::sync::Arc::clone(&fixture);
        let _ = std::thread::spawn(move || {
            let _guard = poison.flags.lock().unwrap();
            panic!("poison the fixture");
        })
        .join();

        assert!(matches!(
            fixture.was_found(),
            Err(HarnessError::LockFailed("send fixture"))
        ));
        assert!(matches!(
            fixture.mark_sent(),
            Err(HarnessError::LockFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_mutation_leaves_wake_permit() {
        let fixture = SendFixture::new("x", 1);
        fixture.mark_sent().unwrap();
        tokio::time::timeout(std::time::Duration::from_millis(100), fixture.wake().notified())
            .await
            .expect("permit stored by mark_sent");
    }
}
