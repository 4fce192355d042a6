use std::time::Duration;

use iothub_test_harness::{AccountInfo, HubTestClient, HubTestError, ListenControl, ListenOptions};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IOTHUB: &str =
    "HostName=e2e-hub.local;SharedAccessKeyName=iothubowner;SharedAccessKey=c2VydmljZS1rZXk=";
const EVENTHUB: &str =
    "Endpoint=sb://e2e-hub.local/;SharedAccessKeyName=service;SharedAccessKey=bGlzdGVuLWtleQ==";

fn account(server: &MockServer) -> AccountInfo {
    AccountInfo::new(IOTHUB, EVENTHUB, "dev-1", "ZGV2aWNlLWtleQ==", 2)
        .unwrap()
        .with_gateway(server.address().to_string())
}

fn options(max_drain_ms: u64) -> ListenOptions {
    ListenOptions {
        max_drain_time: Duration::from_millis(max_drain_ms),
        poll_interval: Duration::from_millis(20),
        ..ListenOptions::default()
    }
}

fn batch(partition: u32, bodies: &[&str]) -> serde_json::Value {
    let events: Vec<_> = bodies
        .iter()
        .enumerate()
        .map(|(index, body)| {
            json!({
                "partition": partition,
                "sequence_number": index,
                "enqueued_time": "2024-01-01T00:00:00Z",
                "device_id": "dev-1",
                "body": base64_of(body),
            })
        })
        .collect();
    json!({ "partition": partition, "events": events, "next_sequence": bodies.len() })
}

fn base64_of(text: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(text)
}

async fn mount_partition(server: &MockServer, partition: u32, bodies: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/eventhub/partitions/{partition}/events")))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch(partition, bodies)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_listen_stops_on_match() {
    let server = MockServer::start().await;
    mount_partition(&server, 0, &[]).await;
    mount_partition(&server, 1, &["other", "wanted"]).await;

    let mut client = HubTestClient::initialize(&account(&server)).unwrap();
    let summary = client
        .listen_for_event_for_max_drain_time(2, &options(5_000), |event| {
            if event.body == b"wanted" {
                ListenControl::Stop
            } else {
                ListenControl::Continue
            }
        })
        .await
        .unwrap();

    assert!(summary.matched);
    assert_eq!(summary.events_seen, 2);
    assert!(summary.elapsed < Duration::from_secs(5));
    client.deinit();
}

#[tokio::test]
async fn test_listen_gives_up_after_drain_time() {
    let server = MockServer::start().await;
    mount_partition(&server, 0, &[]).await;
    mount_partition(&server, 1, &[]).await;

    let mut client = HubTestClient::initialize(&account(&server)).unwrap();
    let summary = client
        .listen_for_event_for_max_drain_time(2, &options(300), |_| ListenControl::Stop)
        .await
        .unwrap();

    assert!(!summary.matched);
    assert_eq!(summary.events_seen, 0);
    assert!(summary.elapsed >= Duration::from_millis(300));
    assert!(summary.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_read_in_flight_at_deadline_is_not_an_error() {
    let server = MockServer::start().await;
    for partition in 0..2 {
        Mock::given(method("GET"))
            .and(path(format!("/eventhub/partitions/{partition}/events")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(batch(partition, &[]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
    }

    let mut client = HubTestClient::initialize(&account(&server)).unwrap();
    let summary = client
        .listen_for_event_for_max_drain_time(2, &options(500), |_| ListenControl::Continue)
        .await
        .unwrap();

    assert!(!summary.matched);
    assert_eq!(summary.events_seen, 0);
    assert!(summary.elapsed >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_listen_rejects_zero_partitions() {
    let server = MockServer::start().await;
    let mut client = HubTestClient::initialize(&account(&server)).unwrap();
    let result = client
        .listen_for_event_for_max_drain_time(0, &options(100), |_| ListenControl::Stop)
        .await;
    assert!(matches!(result, Err(HubTestError::InvalidArg(_))));
}

#[tokio::test]
async fn test_send_message_posts_base64_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/devices/dev-1/messages"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "body": base64_of("hello") })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message_id": "m-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HubTestClient::initialize(&account(&server)).unwrap();
    assert_eq!(client.send_message(b"hello").await.unwrap(), "m-42");
    assert!(matches!(
        client.send_message(b"").await,
        Err(HubTestError::InvalidArg(_))
    ));
}

#[tokio::test]
async fn test_hub_errors_surface_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/devices/dev-1/messages"))
        .respond_with(ResponseTemplate::new(404).set_body_string("device_not_found"))
        .mount(&server)
        .await;

    let client = HubTestClient::initialize(&account(&server)).unwrap();
    match client.send_message(b"hello").await {
        Err(HubTestError::HubStatus { status, body, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "device_not_found");
        }
        other => panic!("expected hub status error, got {other:?}"),
    }
}
