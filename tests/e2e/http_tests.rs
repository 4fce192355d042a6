use anyhow::Result;
use iothub_device_client::Protocol;
use serializer_e2e::scenarios::{
    http_macro_recv, http_macro_send, macro_receive, macro_send, raw_receive, raw_send,
};
use serializer_e2e::ClientFlavor;

use super::suite;

#[tokio::test(flavor = "multi_thread")]
async fn test_http_macro_recv_e2e() -> Result<()> {
    http_macro_recv(suite()).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_macro_send_e2e() -> Result<()> {
    http_macro_send(suite()).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_macro_recv_with_threaded_client() -> Result<()> {
    macro_receive(suite(), Protocol::Http, ClientFlavor::Threaded).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_macro_send_with_threaded_client() -> Result<()> {
    macro_send(suite(), Protocol::Http, ClientFlavor::Threaded).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_raw_send_e2e() -> Result<()> {
    raw_send(suite(), Protocol::Http, ClientFlavor::Pumped).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_raw_receive_e2e() -> Result<()> {
    raw_receive(suite(), Protocol::Http, ClientFlavor::Pumped).await
}
