use std::sync::Arc;

use anyhow::Result;
use iothub_device_client::Protocol;
use serializer_e2e::scenarios::{
    amqp_macro_recv, amqp_macro_send, deliver_to_model, macro_receive, raw_receive, raw_send,
};
use serializer_e2e::{ClientFlavor, ReceiveFixture};

use super::{suite, FIXED_TIMESTAMP};

#[tokio::test(flavor = "multi_thread")]
async fn test_amqp_macro_recv_e2e() -> Result<()> {
    amqp_macro_recv(suite()).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_amqp_macro_send_e2e() -> Result<()> {
    amqp_macro_send(suite()).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_amqp_macro_recv_with_pumped_client() -> Result<()> {
    macro_receive(suite(), Protocol::Amqp, ClientFlavor::Pumped).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_amqp_raw_send_e2e() -> Result<()> {
    raw_send(suite(), Protocol::Amqp, ClientFlavor::Threaded).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_amqp_raw_receive_e2e() -> Result<()> {
    raw_receive(suite(), Protocol::Amqp, ClientFlavor::Threaded).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_compact_command_for_id_7_reaches_model_action() -> Result<()> {
    let suite = suite();
    let _case = suite.begin_case().await;
    let command = format!(
        r#"{{"Name":"dataMacroCallback","Parameters":{{"property1":"{FIXED_TIMESTAMP}","UniqueId":7}}}}"#
    );
    let fixture = Arc::new(ReceiveFixture::new(command, FIXED_TIMESTAMP, 7));

    let started = std::time::Instant::now();
    deliver_to_model(suite, &fixture, Protocol::Amqp, ClientFlavor::Threaded).await?;

    assert!(fixture.was_found()?);
    assert!(started.elapsed() < suite.max_cloud_travel_time());
    Ok(())
}
