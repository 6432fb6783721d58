//! src/app.rs
//!
//! Defines the main `App` struct, which runs the shared drag relay: the
//! `Broker` actor and the WebSocket server windows connect to.

use crate::{
    broker::{Broker, BrokerServer},
    config::Config,
    error::Result,
};
use tokio_util::sync::CancellationToken;

/// Encapsulates the relay process and the lifecycle of its services.
pub struct App {
    config: Config,
    shutdown_token: CancellationToken,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self::with_shutdown_token(config, CancellationToken::new())
    }

    /// Creates an `App` that stops when `shutdown_token` is cancelled.
    pub fn with_shutdown_token(config: Config, shutdown_token: CancellationToken) -> Self {
        Self {
            config,
            shutdown_token,
        }
    }

    /// Spawns the broker and its server, then waits for shutdown (Ctrl+C or
    /// the token) and for both services to finish. A server that fails to
    /// start, e.g. on a port already in use, shuts the relay down and its
    /// error is returned.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            bind_addr = %self.config.broker.bind_addr,
            channel_capacity = self.config.broker.channel_capacity,
            "Starting drag relay"
        );

        let (broker, handle) = Broker::new(self.config.broker.channel_capacity);
        let broker_task = tokio::spawn(broker.run(self.shutdown_token.clone()));
        tracing::debug!("Broker service spawned.");

        let server = BrokerServer::new(self.config.broker.bind_addr, handle);
        let mut server_task = tokio::spawn(server.run(self.shutdown_token.clone()));
        tracing::debug!("Broker server spawned.");

        let shutdown_token = self.shutdown_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                        return;
                    }
                    tracing::info!("Ctrl+C received. Initiating graceful shutdown...");
                    shutdown_token.cancel();
                },
                _ = shutdown_token.cancelled() => {},
            }
        });

        // The server only returns on its own when it could not serve.
        let stopped_early = tokio::select! {
            _ = self.shutdown_token.cancelled() => None,
            served = &mut server_task => Some(served),
        };
        if stopped_early.is_some() {
            tracing::error!("Broker server stopped before shutdown was requested");
            self.shutdown_token.cancel();
        }

        if let Err(e) = broker_task.await {
            tracing::error!(error = ?e, "Broker service task failed");
        }
        let served = match stopped_early {
            Some(served) => served?,
            None => server_task.await?,
        };
        match &served {
            Ok(()) => tracing::info!("Drag relay has shut down gracefully."),
            Err(e) => tracing::error!(error = %e, "Drag relay failed"),
        }
        served
    }
}
