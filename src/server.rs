use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;

/// The relay process: one coordinator shared by every HTTP request.
pub struct RelayServer {
    pub config: ServerConfig,
    pub coordinator: Arc<Coordinator>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Arc::new(Coordinator::new(config.timing.clone()));
        Self {
            config,
            coordinator,
        }
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    addr = %self.config.listen_addr,
                    error = %e,
                    "Failed to bind relay API server"
                );
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let timing = &self.config.timing;
        tracing::info!(
            liveness_threshold = ?timing.liveness_threshold,
            stale_after = ?timing.stale_after,
            rendezvous_timeout = ?timing.rendezvous_timeout,
            poll_interval = ?timing.poll_interval,
            result_retention = ?timing.result_retention,
            "Relay timing configured"
        );

        api::serve(listener, ApiState::new(self.coordinator), shutdown).await
    }

    /// Bind an ephemeral port on localhost and serve in the background.
    ///
    /// Returns the bound address. Used by tests and local tooling.
    pub async fn start_local(
        self,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(self.serve(listener, shutdown));
        Ok((addr, handle))
    }
}
