use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::routing::get;
use axum::Router;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use iothub_device_client::sas::generate_sas_token;
use iothub_device_client::{
    ClientConfig, ConfirmationResult, DeviceClientLl, Message, MessageDisposition, OptionValue,
    Protocol, OPTION_MESSAGE_TIMEOUT, OPTION_MINIMUM_POLLING_TIME,
};
use iothub_simulator::{partition_for, EventBatch, LocalHub, NewMessage, SimulatorConfig};
use serde_json::json;

fn start_hub() -> LocalHub {
    LocalHub::start(SimulatorConfig::ephemeral()).expect("simulator should start")
}

fn device_config(hub: &LocalHub, device_id: &str, protocol: Protocol) -> ClientConfig {
    let identity = hub
        .store()
        .register_device(device_id, None)
        .expect("device should register");
    ClientConfig::new(
        hub.config().hub_name(),
        hub.config().hub_suffix(),
        device_id,
        identity.primary_key,
        protocol,
    )
    .with_gateway(hub.gateway_host(), false)
}

fn token(hub: &LocalHub, key: &str, key_name: &str) -> String {
    generate_sas_token(
        &hub.config().host_name,
        key,
        Some(key_name),
        Utc::now().timestamp() + 300,
    )
    .unwrap()
}

async fn read_partition(hub: &LocalHub, device_id: &str) -> EventBatch {
    let partition = partition_for(device_id, hub.config().partition_count);
    reqwest::Client::new()
        .get(format!(
            "http://{}/eventhub/partitions/{partition}/events",
            hub.gateway_host()
        ))
        .header("Authorization", token(hub, &hub.config().listen_key, "service"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let hub = start_hub();
    let body: serde_json::Value = reqwest::get(format!("http://{}/health", hub.gateway_host()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["partition_count"], 4);
}

#[tokio::test]
async fn test_http_event_reaches_partition() {
    let hub = start_hub();
    let mut client =
        DeviceClientLl::create(device_config(&hub, "http-dev", Protocol::Http)).unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    client
        .send_event_async(
            Message::from_string(r#"{"UniqueId":3, "property1":"x"}"#).with_property("k", "v"),
            Some(Box::new(move |result| sink.lock().unwrap().push(result))),
        )
        .unwrap();
    client.do_work().await;
    assert_eq!(results.lock().unwrap().as_slice(), &[ConfirmationResult::Ok]);

    let batch = read_partition(&hub, "http-dev").await;
    assert_eq!(batch.events.len(), 1);
    let event = &batch.events[0];
    assert_eq!(event.device_id, "http-dev");
    assert_eq!(
        STANDARD.decode(&event.body).unwrap(),
        br#"{"UniqueId":3, "property1":"x"}"#
    );
    assert_eq!(event.properties.get("k").map(String::as_str), Some("v"));
    assert_eq!(batch.next_sequence, event.sequence_number + 1);

    client.destroy().await;
}

#[tokio::test]
async fn test_requests_without_valid_tokens_are_rejected() {
    let hub = start_hub();
    hub.store().register_device("locked-dev", None).unwrap();
    let http = reqwest::Client::new();
    let base = format!("http://{}", hub.gateway_host());

    let missing = http
        .post(format!("{base}/devices/locked-dev/messages/events"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 401);

    let listener_token = token(&hub, &hub.config().listen_key, "service");
    let wrong_role = http
        .put(format!("{base}/registry/devices/other-dev"))
        .header("Authorization", listener_token)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_role.status(), 401);
    assert!(hub.store().device("other-dev").is_none());
}

#[tokio::test]
async fn test_service_message_round_trip_over_http() {
    let hub = start_hub();
    let config = device_config(&hub, "c2d-dev", Protocol::Http);
    let http = reqwest::Client::new();

    let sent: serde_json::Value = http
        .post(format!(
            "http://{}/service/devices/c2d-dev/messages",
            hub.gateway_host()
        ))
        .header(
            "Authorization",
            token(&hub, &hub.config().service_key, "iothubowner"),
        )
        .json(&json!({ "body": STANDARD.encode("hello device"), "message_id": "msg-1" }))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sent["message_id"], "msg-1");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut client = DeviceClientLl::create(config).unwrap();
    client
        .set_option(OPTION_MINIMUM_POLLING_TIME, OptionValue::U64(0))
        .unwrap();
    client
        .set_message_callback(Arc::new(move |message: &Message| {
            sink.lock().unwrap().push(message.clone());
            MessageDisposition::Accepted
        }))
        .unwrap();
    client.do_work().await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].bytes(), b"hello device");
    assert_eq!(seen[0].message_id.as_deref(), Some("msg-1"));
    assert_eq!(hub.store().pending_c2d("c2d-dev"), 0);

    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_link_settles_events_and_pushes_messages() {
    let hub = start_hub();
    let mut client =
        DeviceClientLl::create(device_config(&hub, "link-dev", Protocol::Amqp)).unwrap();

    let confirmations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&confirmations);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let delivered_sink = Arc::clone(&delivered);
    client
        .set_message_callback(Arc::new(move |message: &Message| {
            delivered_sink
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(message.bytes()).to_string());
            MessageDisposition::Accepted
        }))
        .unwrap();
    client
        .send_event_async(
            Message::from_string("telemetry"),
            Some(Box::new(move |result| sink.lock().unwrap().push(result))),
        )
        .unwrap();
    client.do_work().await;
    assert_eq!(
        confirmations.lock().unwrap().as_slice(),
        &[ConfirmationResult::Ok]
    );
    assert_eq!(read_partition(&hub, "link-dev").await.events.len(), 1);

    hub.store()
        .send_c2d(
            "link-dev",
            NewMessage {
                body: "pushed".into(),
                ..NewMessage::default()
            },
        )
        .unwrap();

    for _ in 0..200 {
        client.do_work().await;
        if !delivered.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered.lock().unwrap().as_slice(), &["pushed".to_string()]);

    client.destroy().await;
}

fn pushed(text: &str) -> NewMessage {
    NewMessage {
        body: text.to_string().into(),
        ..NewMessage::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsettled_message_survives_closed_link() {
    let hub = start_hub();
    let config = device_config(&hub, "relink-dev", Protocol::Amqp);

    // No message callback: the first client holds the delivery unsettled.
    let mut first = DeviceClientLl::create(config.clone()).unwrap();
    first
        .send_event_async(Message::from_string("open the link"), None)
        .unwrap();
    first.do_work().await;

    hub.store().send_c2d("relink-dev", pushed("pushed")).unwrap();
    assert!(wait_until(|| hub.store().pending_c2d("relink-dev") == 0).await);

    first.destroy().await;
    assert!(wait_until(|| hub.store().pending_c2d("relink-dev") == 1).await);

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let mut second = DeviceClientLl::create(config).unwrap();
    second
        .set_message_callback(Arc::new(move |message: &Message| {
            sink.lock()
                .unwrap()
                .push(String::from_utf8_lossy(message.bytes()).to_string());
            MessageDisposition::Accepted
        }))
        .unwrap();
    for _ in 0..200 {
        second.do_work().await;
        if !delivered.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(delivered.lock().unwrap().as_slice(), &["pushed".to_string()]);
    second.destroy().await;
}

#[tokio::test]
async fn test_failed_http_delivery_requeues_message() {
    let hub = start_hub();
    let config = device_config(&hub, "bad-header-dev", Protocol::Http);
    let mut message = pushed("cmd");
    message
        .properties
        .insert("note".to_string(), "line\nbreak".to_string());
    hub.store().send_c2d("bad-header-dev", message).unwrap();

    let device_token = generate_sas_token(
        &config.device_resource(),
        &config.device_key,
        None,
        Utc::now().timestamp() + 300,
    )
    .unwrap();
    let response = reqwest::Client::new()
        .get(format!(
            "http://{}/devices/bad-header-dev/messages/devicebound",
            hub.gateway_host()
        ))
        .header("Authorization", device_token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(hub.store().pending_c2d("bad-header-dev"), 1);
}

/// A link endpoint that reads every frame and never settles anything.
async fn start_silent_link() -> String {
    let app = Router::new().route(
        "/devices/:device_id/amqp",
        get(|ws: WebSocketUpgrade| async move {
            ws.on_upgrade(|mut socket| async move {
                while let Some(Ok(_)) = socket.recv().await {}
            })
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsettled_event_confirms_message_timeout() {
    let gateway = start_silent_link().await;
    let config = ClientConfig::new(
        "silent-hub",
        "local",
        "quiet-dev",
        STANDARD.encode("quiet-device-key-0123456789"),
        Protocol::Amqp,
    )
    .with_gateway(gateway, false);

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    let mut client = DeviceClientLl::create(config).unwrap();
    client
        .set_option(OPTION_MESSAGE_TIMEOUT, OptionValue::U64(100))
        .unwrap();
    client
        .send_event_async(
            Message::from_string("never settled"),
            Some(Box::new(move |result| sink.lock().unwrap().push(result))),
        )
        .unwrap();

    let started = Instant::now();
    client.do_work().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        results.lock().unwrap().as_slice(),
        &[ConfirmationResult::MessageTimeout]
    );
    client.destroy().await;
}
