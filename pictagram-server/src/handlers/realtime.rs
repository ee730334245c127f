//! WebSocket endpoint feeding the realtime relay.

use std::net::SocketAddr;

use axum::{
    extract::{
        ConnectInfo, Extension, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use shared::models::ClientFrame;
use tracing::{debug, warn};

use crate::realtime::SharedRelay;

/// Upgrades the request to a WebSocket and hands the socket to the relay.
pub async fn ws_handler(
    Extension(relay): Extension<SharedRelay>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(relay, socket, addr))
}

/// Drives one connection: a spawned writer drains the relay's outbound
/// channel into the socket, while this task feeds inbound text frames to
/// the dispatcher in arrival order. Close or socket error tears the
/// connection down and unbinds its session.
async fn handle_socket(relay: SharedRelay, socket: WebSocket, addr: SocketAddr) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound) = relay.manager().accept(Some(addr)).await;

    let connection_id = handle.id();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(connection_id, error = %err, "failed to encode outbound frame");
                }
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => relay.dispatcher().handle_frame(&handle, frame).await,
                Err(err) => {
                    // Unparseable input is logged and dropped, never fatal.
                    warn!(connection_id, error = %err, "dropping unparseable frame");
                    metrics::counter!("realtime_frames_unparseable_total").increment(1);
                }
            },
            Ok(WsMessage::Close(_)) => {
                debug!(connection_id, "client closed connection");
                break;
            }
            Ok(_) => {
                // Binary, ping, and pong frames carry no protocol meaning.
            }
            Err(err) => {
                debug!(connection_id, error = %err, "socket error, closing connection");
                break;
            }
        }
    }

    relay.disconnect(&handle).await;
    writer.abort();
}
