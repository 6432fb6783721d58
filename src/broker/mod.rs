//! src/broker/mod.rs
//!
//! Defines the `Broker` service, the shared relay every participating window
//! connects to, and the `BrokerServer` that exposes it over WebSocket.
//!
//! The broker is content-agnostic: whatever one participant publishes is
//! delivered verbatim to every registered participant, the publisher
//! included. Windows filter their own echoes by session identity.

use crate::error::{Error, Result};
use axum::{routing::get, Router};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub mod ws;

pub type ConnectionId = u64;

enum BrokerCommand {
    Register {
        reply: oneshot::Sender<(ConnectionId, mpsc::Receiver<Arc<str>>)>,
    },
    Publish {
        from: ConnectionId,
        data: Arc<str>,
    },
    Disconnect(ConnectionId),
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// The relay actor. Owns the participant registry.
pub struct Broker {
    commands_rx: mpsc::Receiver<BrokerCommand>,
    participants: HashMap<ConnectionId, mpsc::Sender<Arc<str>>>,
    next_id: ConnectionId,
    channel_capacity: usize,
}

impl Broker {
    /// Creates the broker and the handle participants connect through.
    pub fn new(channel_capacity: usize) -> (Self, BrokerHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(channel_capacity.max(1) * 4);
        let broker = Self {
            commands_rx,
            participants: HashMap::new(),
            next_id: 1,
            channel_capacity: channel_capacity.max(1),
        };
        (broker, BrokerHandle { commands_tx })
    }

    /// The main run loop for the `Broker` service.
    pub async fn run(mut self, shutdown_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Broker received shutdown signal.");
                    break;
                },
                Some(command) = self.commands_rx.recv() => self.handle_command(command),
                else => {
                    tracing::info!("All broker handles dropped. Broker shutting down.");
                    break;
                }
            }
        }
        // Dropping the senders ends every participant's stream.
        self.participants.clear();
    }

    fn handle_command(&mut self, command: BrokerCommand) {
        match command {
            BrokerCommand::Register { reply } => {
                let id = self.next_id;
                self.next_id += 1;
                let (tx, rx) = mpsc::channel(self.channel_capacity);
                if reply.send((id, rx)).is_ok() {
                    self.participants.insert(id, tx);
                    tracing::info!(
                        connection = id,
                        participants = self.participants.len(),
                        "Participant registered"
                    );
                }
            }
            BrokerCommand::Publish { from, data } => self.broadcast(from, data),
            BrokerCommand::Disconnect(id) => {
                if self.participants.remove(&id).is_some() {
                    tracing::info!(
                        connection = id,
                        participants = self.participants.len(),
                        "Participant disconnected"
                    );
                }
            }
            BrokerCommand::Count { reply } => {
                let _ = reply.send(self.participants.len());
            }
        }
    }

    /// Delivers `data` to every participant. A full queue loses this message
    /// for that participant only; a closed one is pruned.
    fn broadcast(&mut self, from: ConnectionId, data: Arc<str>) {
        tracing::trace!(connection = from, bytes = data.len(), "Relaying message");
        self.participants.retain(|&id, tx| match tx.try_send(data.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection = id, "Participant queue full. Dropping message.");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::info!(connection = id, "Pruning closed participant");
                false
            }
        });
    }
}

/// A cloneable handle to the running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    commands_tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    /// Registers a new participant. Once this returns, every subsequent
    /// broadcast reaches the returned channel.
    pub async fn connect(&self) -> Result<BrokerChannel> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(BrokerCommand::Register { reply })
            .await
            .map_err(|_| Error::BrokerUnavailable)?;
        let (id, rx) = reply_rx.await.map_err(|_| Error::BrokerUnavailable)?;
        Ok(BrokerChannel {
            id,
            commands_tx: self.commands_tx.clone(),
            rx,
        })
    }

    pub async fn connection_count(&self) -> Result<usize> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(BrokerCommand::Count { reply })
            .await
            .map_err(|_| Error::BrokerUnavailable)?;
        reply_rx.await.map_err(|_| Error::BrokerUnavailable)
    }
}

/// One participant's attachment to the broker. Dropping it disconnects.
pub struct BrokerChannel {
    id: ConnectionId,
    commands_tx: mpsc::Sender<BrokerCommand>,
    rx: mpsc::Receiver<Arc<str>>,
}

impl BrokerChannel {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Publishes `data` to every participant, this one included.
    pub async fn send(&self, data: impl Into<Arc<str>>) -> Result<()> {
        self.commands_tx
            .send(BrokerCommand::Publish {
                from: self.id,
                data: data.into(),
            })
            .await
            .map_err(|_| Error::BrokerUnavailable)
    }

    /// Next relayed message. `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }
}

impl Drop for BrokerChannel {
    fn drop(&mut self) {
        // If the command queue is full the closed receiver gets pruned on the
        // next broadcast instead.
        let _ = self.commands_tx.try_send(BrokerCommand::Disconnect(self.id));
    }
}

/// The shared state accessible by all Axum handlers.
#[derive(Clone)]
pub struct BrokerState {
    pub handle: BrokerHandle,
    pub shutdown_token: CancellationToken,
}

/// Serves the broker on `/ws`.
pub struct BrokerServer {
    bind_addr: SocketAddr,
    handle: BrokerHandle,
}

impl BrokerServer {
    pub fn new(bind_addr: SocketAddr, handle: BrokerHandle) -> Self {
        Self { bind_addr, handle }
    }

    pub async fn run(self, shutdown_token: CancellationToken) -> Result<()> {
        let state = BrokerState {
            handle: self.handle,
            shutdown_token: shutdown_token.clone(),
        };

        let app = Router::new()
            .route("/ws", get(ws::websocket_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(listen_addr = %self.bind_addr, "Broker listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
                tracing::info!("Broker server received shutdown signal.");
            })
            .await?;

        Ok(())
    }
}
