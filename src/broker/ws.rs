//! src/broker/ws.rs
//!
//! Handles one participant's WebSocket connection to the broker.

use crate::broker::{BrokerHandle, BrokerState};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// The handler for WebSocket upgrade requests.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<BrokerState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state.handle, state.shutdown_token))
}

/// Registers the participant, then pumps frames both ways until either side
/// goes away. Nothing is read from the socket before registration completes,
/// so a client's first ping is only answered once it will receive broadcasts.
async fn handle_socket(
    mut socket: WebSocket,
    handle: BrokerHandle,
    shutdown_token: CancellationToken,
) {
    let mut channel = match handle.connect().await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(error = %e, "Could not register WebSocket participant");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let id = channel.id();
    tracing::debug!(connection = id, "WebSocket participant connected");

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            },
            relayed = channel.recv() => {
                let Some(data) = relayed else {
                    tracing::debug!(connection = id, "Broker closed. Disconnecting participant.");
                    break;
                };
                if socket.send(Message::Text(data.to_string())).await.is_err() {
                    tracing::debug!(connection = id, "Participant went away during send");
                    break;
                }
            },
            frame = socket.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if channel.send(text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection = id, "Participant closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(
                            connection = id,
                            error = %e,
                            "Participant connection failed"
                        );
                        break;
                    }
                }
            },
        }
    }
}
