//! Failure paths, each on its own local hub with short ceilings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use iothub_device_client::{Message, Protocol};
use serializer_e2e::scenarios::{deliver_to_model, drain_for, send_and_drain};
use serializer_e2e::templates::macro_receive_payload;
use serializer_e2e::{
    ClientFlavor, E2eConfig, FixtureFactory, HubTarget, ReceiveFixture, SendFixture, SuiteContext,
};

use super::FIXED_TIMESTAMP;

fn short_suite() -> SuiteContext {
    let config = E2eConfig {
        max_drain_time: Duration::from_secs(1),
        max_cloud_travel_time: Duration::from_secs(2),
        poll_interval: Duration::from_millis(50),
        hub_target: HubTarget::Local,
        partition_count: 2,
        ..E2eConfig::default()
    };
    SuiteContext::from_config(config)
        .expect("short suite")
        .with_factory(FixtureFactory::fixed(FIXED_TIMESTAMP))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drain_without_match_returns_after_drain_time() {
    let suite = short_suite();
    let fixture = SendFixture::new("never sent", 99);

    let started = Instant::now();
    let summary = drain_for(&suite, &fixture).await.unwrap();

    assert!(!summary.matched);
    assert!(!fixture.was_found().unwrap());
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_fails_when_hub_never_sees_expected_event() {
    let suite = short_suite();
    let case = suite.begin_case().await;
    let fixture = Arc::new(suite.factory().send_fixture(case.unique_id()));

    let started = Instant::now();
    let result = send_and_drain(
        &suite,
        &fixture,
        Message::from_string("{\"unexpected\":true}"),
        Protocol::Http,
        ClientFlavor::Pumped,
    )
    .await;

    let err = result.expect_err("mismatched event must fail the case");
    assert!(err.to_string().contains("was_found never became true"));
    assert!(fixture.data_was_sent().unwrap());
    assert!(!fixture.was_found().unwrap());
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_receive_fails_when_action_sees_other_id() {
    let suite = short_suite();
    let _case = suite.begin_case().await;
    let fixture = Arc::new(ReceiveFixture::new(
        macro_receive_payload(FIXED_TIMESTAMP, 8),
        FIXED_TIMESTAMP,
        7,
    ));

    let started = Instant::now();
    let result = deliver_to_model(&suite, &fixture, Protocol::Amqp, ClientFlavor::Threaded).await;

    assert!(result.is_err());
    assert!(!fixture.was_found().unwrap());
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_raw_send_round_trips_on_fresh_hub() {
    let suite = short_suite();
    let case = suite.begin_case().await;
    let fixture = Arc::new(suite.factory().send_fixture(case.unique_id()));

    send_and_drain(
        &suite,
        &fixture,
        Message::from_string(fixture.expected()),
        Protocol::Amqp,
        ClientFlavor::Threaded,
    )
    .await
    .unwrap();

    assert!(fixture.data_was_sent().unwrap());
    assert!(fixture.was_found().unwrap());
}
