use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::frame::{DeliveryOutcome, FrameContent, LinkFrame};
use super::{device_token, OptionValue, Transport, OPTION_MESSAGE_TIMEOUT};
use crate::{ClientConfig, ClientError, Message, MessageDisposition, Protocol, ReceivedMessage};

const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 60_000;

struct Settlement {
    delivery_id: u64,
    outcome: DeliveryOutcome,
    reason: Option<String>,
}

/// An open link: a writer task draining `outbound` into the socket and a
/// reader task routing inbound frames to `settlements` and `deliveries`.
struct Link {
    outbound: mpsc::UnboundedSender<WsMessage>,
    settlements: mpsc::UnboundedReceiver<Settlement>,
    deliveries: mpsc::UnboundedReceiver<ReceivedMessage>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Link {
    fn send_frame(&self, frame: &LinkFrame) -> Result<(), ClientError> {
        self.outbound
            .send(WsMessage::Text(frame.encode()?))
            .map_err(|_| ClientError::Link("link writer has stopped".into()))
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

/// Persistent link transport. Events are settled per delivery; hub messages
/// are pushed by the hub and buffered until the next `receive`.
pub struct AmqpTransport {
    config: ClientConfig,
    link: Option<Link>,
    next_delivery_id: u64,
    message_timeout: Duration,
}

impl AmqpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            link: None,
            next_delivery_id: 1,
            message_timeout: Duration::from_millis(DEFAULT_MESSAGE_TIMEOUT_MS),
        }
    }

    async fn ensure_link(&mut self) -> Result<&mut Link, ClientError> {
        if self.link.is_none() {
            self.link = Some(self.open_link().await?);
        }
        self.link
            .as_mut()
            .ok_or_else(|| ClientError::Link("link unavailable".into()))
    }

    async fn open_link(&self) -> Result<Link, ClientError> {
        let url = self.config.link_url();
        let mut request = url.as_str().into_client_request()?;
        let token = HeaderValue::from_str(&device_token(&self.config)?)
            .map_err(|err| ClientError::Link(err.to_string()))?;
        request.headers_mut().insert("Authorization", token);

        let (socket, _response) = connect_async(request).await?;
        info!(device_id = %self.config.device_id, %url, "device link established");

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let device_id = self.config.device_id.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                let text = match message {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(frame) => {
                        debug!(%device_id, ?frame, "hub closed device link");
                        break;
                    }
                    _ => continue,
                };

                match LinkFrame::decode(&text) {
                    Ok(LinkFrame::Settled {
                        delivery_id,
                        outcome,
                        reason,
                    }) => {
                        let _ = settled_tx.send(Settlement {
                            delivery_id,
                            outcome,
                            reason,
                        });
                    }
                    Ok(frame @ LinkFrame::Deliver { .. }) => match frame.into_received() {
                        Ok(Some(received)) => {
                            let _ = deliver_tx.send(received);
                        }
                        Ok(None) => {}
                        Err(err) => warn!(%device_id, error = %err, "undecodable delivery"),
                    },
                    Ok(other) => warn!(%device_id, ?other, "unexpected frame from hub"),
                    Err(err) => warn!(%device_id, error = %err, "malformed frame from hub"),
                }
            }
        });

        Ok(Link {
            outbound: outbound_tx,
            settlements: settled_rx,
            deliveries: deliver_rx,
            writer,
            reader,
        })
    }

    fn drop_link(&mut self, reason: &str) {
        if self.link.take().is_some() {
            warn!(device_id = %self.config.device_id, reason, "device link dropped");
        }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Amqp
    }

    async fn send_event(&mut self, message: &Message) -> Result<(), ClientError> {
        let delivery_id = self.next_delivery_id;
        self.next_delivery_id += 1;
        let wait = self.message_timeout;

        let result = {
            let link = self.ensure_link().await?;
            link.send_frame(&LinkFrame::Transfer {
                delivery_id,
                content: FrameContent::from_message(message),
            })?;
            await_settlement(link, delivery_id, wait).await
        };

        if let Err(ClientError::Link(reason)) = &result {
            self.drop_link(reason);
        }
        result
    }

    async fn receive(&mut self) -> Result<Option<ReceivedMessage>, ClientError> {
        let link = self.ensure_link().await?;
        match link.deliveries.try_recv() {
            Ok(received) => Ok(Some(received)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.drop_link("delivery channel closed");
                Err(ClientError::Link("delivery channel closed".into()))
            }
        }
    }

    async fn settle(
        &mut self,
        lock_token: &str,
        disposition: MessageDisposition,
    ) -> Result<(), ClientError> {
        let link = self.ensure_link().await?;
        link.send_frame(&LinkFrame::Disposition {
            lock_token: lock_token.to_string(),
            outcome: disposition,
        })
    }

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), ClientError> {
        match name {
            OPTION_MESSAGE_TIMEOUT => {
                let millis = value.as_u64().ok_or_else(|| {
                    ClientError::InvalidArg(format!("{name} expects an unsigned integer"))
                })?;
                if millis == 0 {
                    return Err(ClientError::InvalidArg(format!("{name} must be positive")));
                }
                self.message_timeout = Duration::from_millis(millis);
                Ok(())
            }
            other => Err(ClientError::InvalidOption(other.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.outbound.send(WsMessage::Close(None));
            // give the writer a moment to flush the close frame
            let _ = timeout(Duration::from_millis(200), async {
                while !link.writer.is_finished() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            debug!(device_id = %self.config.device_id, "device link closed");
        }
    }
}

async fn await_settlement(
    link: &mut Link,
    delivery_id: u64,
    wait: Duration,
) -> Result<(), ClientError> {
    let settled = timeout(wait, async {
        loop {
            match link.settlements.recv().await {
                Some(settlement) if settlement.delivery_id == delivery_id => {
                    return Ok(settlement);
                }
                Some(stale) => {
                    debug!(delivery_id = stale.delivery_id, "ignoring stale settlement");
                }
                None => return Err(ClientError::Link("link closed before settlement".into())),
            }
        }
    })
    .await
    .map_err(|_| ClientError::Timeout("delivery settlement"))??;

    match settled.outcome {
        DeliveryOutcome::Accepted => Ok(()),
        DeliveryOutcome::Rejected => Err(ClientError::HubStatus {
            operation: "send event",
            status: 400,
            body: settled
                .reason
                .unwrap_or_else(|| "delivery rejected".to_string()),
        }),
    }
}
