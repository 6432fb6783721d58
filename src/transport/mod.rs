//! src/transport/mod.rs
//!
//! Defines the window-side `Transport` service, which owns the WebSocket
//! connection to the broker, and the `Outbox` the drag controller posts
//! protocol messages through.

use crate::{
    error::{Error, Result},
    session::protocol::ProtocolMessage,
};
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::Message, Error as WsError},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

const READY_PROBE: &[u8] = b"ready";

/// Fire-and-forget sender for outgoing protocol messages. Posting never
/// blocks: when the queue is full the message is dropped.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::Sender<ProtocolMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<ProtocolMessage>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProtocolMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn post(&self, msg: ProtocolMessage) {
        let kind = msg.kind();
        match self.tx.try_send(msg) {
            Ok(()) => tracing::trace!(?kind, "Queued protocol message"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(?kind, "Outbox full. Dropping protocol message.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(?kind, "Transport is gone. Dropping protocol message.");
            }
        }
    }
}

type BrokerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A registered connection to the broker.
pub struct Transport {
    socket: BrokerSocket,
    outbound_rx: mpsc::Receiver<ProtocolMessage>,
    inbound_tx: mpsc::Sender<ProtocolMessage>,
    early: Vec<ProtocolMessage>,
}

impl Transport {
    /// Connects to the broker and waits until it has registered this window.
    ///
    /// The broker only starts reading a connection after registering it, so
    /// the pong to our first ping proves registration. Broadcasts that
    /// arrive before the pong are kept and delivered first.
    pub async fn connect(
        url: &str,
        outbound_rx: mpsc::Receiver<ProtocolMessage>,
        inbound_tx: mpsc::Sender<ProtocolMessage>,
    ) -> Result<Self> {
        let (mut socket, _) = connect_async(url).await?;
        socket.send(Message::Ping(READY_PROBE.to_vec())).await?;

        let mut early = Vec::new();
        loop {
            match socket.next().await {
                Some(Ok(Message::Pong(_))) => break,
                Some(Ok(Message::Text(text))) => {
                    if let Some(msg) = decode_inbound(&text) {
                        early.push(msg);
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(Error::BrokerUnavailable),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
        tracing::info!(broker = %url, "Registered with broker");

        Ok(Self {
            socket,
            outbound_rx,
            inbound_tx,
            early,
        })
    }

    /// The main run loop for the `Transport` service.
    pub async fn run(mut self, shutdown_token: CancellationToken) {
        for msg in std::mem::take(&mut self.early) {
            if self.inbound_tx.send(msg).await.is_err() {
                tracing::warn!("Inbound message channel is closed.");
                return;
            }
        }

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Transport service received shutdown signal.");
                    let _ = self.socket.close(None).await;
                    break;
                },
                Some(msg) = self.outbound_rx.recv() => {
                    let text = match msg.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                kind = ?msg.kind(),
                                "Failed to serialize protocol message"
                            );
                            continue;
                        }
                    };
                    if let Err(e) = self.socket.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "Failed to post message to broker");
                        if matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed) {
                            break;
                        }
                    }
                },
                frame = self.socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(msg) = decode_inbound(&text) {
                                if self.inbound_tx.send(msg).await.is_err() {
                                    tracing::warn!("Inbound message channel is closed.");
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Broker closed the connection.");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Broker connection failed");
                            break;
                        }
                    }
                },
                else => {
                    tracing::info!("Channel closed. Transport service shutting down.");
                    break;
                }
            }
        }
    }
}

fn decode_inbound(text: &str) -> Option<ProtocolMessage> {
    match ProtocolMessage::decode(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::debug!(error = %e, "Discarding malformed broker message");
            None
        }
    }
}
