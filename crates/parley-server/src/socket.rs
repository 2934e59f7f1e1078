//! WebSocket connection handling.
//!
//! A socket is registered with the hub as soon as it is upgraded and lives
//! independently of presence: it becomes associated with an identity only
//! when a liveness ping names one.

use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_protocol::{codec, ClientFrame, ServerFrame};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Sender = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (connection_id, mut outbound) = state.engine.connect();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let heartbeat = u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX);
    if send_frame(&mut sender, &ServerFrame::connected(&connection_id, heartbeat))
        .await
        .is_err()
    {
        error!(connection = %connection_id, "Failed to send Connected frame");
        state.engine.disconnect(&connection_id);
        return;
    }

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Committed events fanned out by the hub
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    // The hub dropped this connection
                    None => break,
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match codec::decode_text::<ClientFrame>(&text) {
                            Ok(frame) => {
                                if let Err(e) = handle_frame(frame, &connection_id, &state, &mut sender).await {
                                    error!(connection = %connection_id, error = %e, "Frame handling error");
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(connection = %connection_id, error = %e, "Ignoring undecodable text frame");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);

                        let mut failed = false;
                        loop {
                            match codec::decode_from::<ClientFrame>(&mut read_buffer) {
                                Ok(Some(frame)) => {
                                    if let Err(e) = handle_frame(frame, &connection_id, &state, &mut sender).await {
                                        error!(connection = %connection_id, error = %e, "Frame handling error");
                                        failed = true;
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(connection = %connection_id, error = %e, "Discarding malformed binary data");
                                    metrics::record_error("protocol");
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.engine.disconnect(&connection_id);
    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Handle a decoded client frame.
async fn handle_frame(
    frame: ClientFrame,
    connection_id: &str,
    state: &Arc<AppState>,
    sender: &mut Sender,
) -> Result<()> {
    metrics::record_frame(frame.frame_type().as_str(), "inbound");

    match frame {
        ClientFrame::Ping { user, timestamp } => {
            match state.engine.liveness(connection_id, user.as_deref()).await {
                Ok(true) => {
                    debug!(connection = %connection_id, identity = ?user, "Identity came online");
                }
                Ok(false) => {}
                Err(e) => {
                    error!(connection = %connection_id, error = %e, "Liveness update failed");
                    metrics::record_error(e.kind());
                    send_frame(sender, &ServerFrame::error(500, "presence update failed")).await?;
                }
            }

            send_frame(sender, &ServerFrame::pong(timestamp)).await?;
        }
    }

    Ok(())
}

/// Send a frame to the WebSocket as JSON text.
async fn send_frame(sender: &mut Sender, frame: &ServerFrame) -> Result<()> {
    let text = codec::encode_text(frame)?;
    metrics::record_frame(frame.frame_type().as_str(), "outbound");
    sender.send(Message::Text(text)).await?;
    Ok(())
}
