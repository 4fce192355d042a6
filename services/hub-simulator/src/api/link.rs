use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::{SinkExt, StreamExt};
use iothub_device_client::transport::{DeliveryOutcome, FrameContent, LinkFrame};
use iothub_device_client::MessageDisposition;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::authorize_device;
use super::ApiState;
use crate::store::{HubError, NewMessage};

/// Upgrades an authorized device to a persistent link carrying JSON frames.
pub async fn device_link(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorize_device(&state, &headers, &device_id) {
        return rejection.into_response();
    }
    ws.on_upgrade(move |socket| handle_link(socket, state, device_id))
}

async fn handle_link(socket: WebSocket, state: Arc<ApiState>, device_id: String) {
    let connection_id = Uuid::new_v4();
    let signal = match state.store.c2d_signal(&device_id) {
        Ok(signal) => signal,
        Err(err) => {
            warn!(%connection_id, %device_id, error = %err, "device vanished before link opened");
            return;
        }
    };
    info!(%connection_id, %device_id, "device link connected");

    let (sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(128);

    let mut sink_task = tokio::spawn({
        let mut sink = sink;
        async move {
            while let Some(message) = out_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        }
    });

    // Lock tokens handed to this link and not yet settled by the device.
    let mut outstanding = HashSet::new();
    let mut open = deliver_pending(&state, &device_id, &out_tx, &mut outstanding)
        .await
        .is_ok();

    while open {
        tokio::select! {
            inbound = stream.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(%connection_id, error = %err, "device link read failed");
                        break;
                    }
                };

                let reply = match LinkFrame::decode(&text) {
                    Ok(frame) => handle_frame(&state, &device_id, frame, &mut outstanding),
                    Err(err) => {
                        warn!(%connection_id, error = %err, "malformed frame from device");
                        None
                    }
                };
                if let Some(reply) = reply {
                    if send_frame(&out_tx, &reply).await.is_err() {
                        break;
                    }
                }
            }
            _ = signal.notified() => {
                open = deliver_pending(&state, &device_id, &out_tx, &mut outstanding)
                    .await
                    .is_ok();
            }
            _ = &mut sink_task => break,
        }
    }

    sink_task.abort();
    release_outstanding(&state, &device_id, outstanding);
    info!(%connection_id, %device_id, "device link closed");
}

/// Puts every message the device never settled back on its queue.
fn release_outstanding(state: &ApiState, device_id: &str, outstanding: HashSet<String>) {
    for lock_token in outstanding {
        if let Err(err) = state.store.release_c2d(device_id, &lock_token) {
            debug!(device_id, %lock_token, error = %err, "unsettled message not released");
        }
    }
}

fn handle_frame(
    state: &ApiState,
    device_id: &str,
    frame: LinkFrame,
    outstanding: &mut HashSet<String>,
) -> Option<LinkFrame> {
    match frame {
        LinkFrame::Transfer {
            delivery_id,
            content,
        } => {
            let outcome = match STANDARD.decode(&content.body) {
                Ok(body) if !body.is_empty() => state
                    .store
                    .enqueue_event(
                        device_id,
                        NewMessage {
                            body: body.into(),
                            message_id: content.message_id,
                            correlation_id: content.correlation_id,
                            properties: content.properties,
                        },
                    )
                    .map(|_| ())
                    .map_err(|err| err.to_string()),
                Ok(_) => Err("event body cannot be empty".to_string()),
                Err(err) => Err(format!("body is not base64: {err}")),
            };

            Some(match outcome {
                Ok(()) => LinkFrame::Settled {
                    delivery_id,
                    outcome: DeliveryOutcome::Accepted,
                    reason: None,
                },
                Err(reason) => LinkFrame::Settled {
                    delivery_id,
                    outcome: DeliveryOutcome::Rejected,
                    reason: Some(reason),
                },
            })
        }
        LinkFrame::Disposition {
            lock_token,
            outcome,
        } => {
            outstanding.remove(&lock_token);
            let result = match outcome {
                MessageDisposition::Accepted => state.store.complete_c2d(device_id, &lock_token),
                MessageDisposition::Rejected => state.store.reject_c2d(device_id, &lock_token),
                MessageDisposition::Abandoned => state.store.abandon_c2d(device_id, &lock_token),
            };
            if let Err(err) = result {
                warn!(device_id, error = %err, "disposition not applied");
            }
            None
        }
        other => {
            warn!(device_id, ?other, "device sent a hub-only frame");
            None
        }
    }
}

async fn deliver_pending(
    state: &ApiState,
    device_id: &str,
    out_tx: &mpsc::Sender<Message>,
    outstanding: &mut HashSet<String>,
) -> Result<(), LinkClosed> {
    loop {
        let received = match state.store.receive_c2d(device_id) {
            Ok(Some(received)) => received,
            Ok(None) => return Ok(()),
            Err(HubError::DeviceNotFound(_)) => return Err(LinkClosed),
            Err(err) => {
                warn!(device_id, error = %err, "cloud-to-device receive failed");
                return Ok(());
            }
        };

        let (lock_token, cloud) = received;
        outstanding.insert(lock_token.clone());
        let frame = LinkFrame::Deliver {
            lock_token,
            content: FrameContent {
                body: STANDARD.encode(&cloud.message.body),
                message_id: Some(cloud.message_id),
                correlation_id: cloud.message.correlation_id,
                properties: cloud.message.properties,
            },
        };
        send_frame(out_tx, &frame).await?;
    }
}

struct LinkClosed;

async fn send_frame(out_tx: &mpsc::Sender<Message>, frame: &LinkFrame) -> Result<(), LinkClosed> {
    let text = match frame.encode() {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to encode link frame");
            return Ok(());
        }
    };
    out_tx.send(Message::Text(text)).await.map_err(|_| LinkClosed)
}
