//! TCP listener for prediction connections

use super::MigrationEngine;
use crate::error::ServerError;
use crate::health::components;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Well-known port for prediction traffic
pub const DEFAULT_PREDICTION_PORT: u16 = 5051;

/// Pause after a failed accept so a persistent error does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts prediction connections and spawns one task per connection
pub struct PredictionListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl PredictionListener {
    /// Bind the listener; failure here is fatal for the server
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|cause| ServerError::Bind { addr, cause })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until shutdown is signalled
    ///
    /// Handlers run in their own tasks; the accept loop never waits on them.
    /// The listener component is healthy while the loop runs, degraded after
    /// repeated accept failures and unhealthy once the loop has exited.
    pub async fn run(self, engine: Arc<MigrationEngine>, mut shutdown: broadcast::Receiver<()>) {
        info!(addr = %self.local_addr, "Migration server listening on TCP");
        engine.health().set_healthy(components::LISTENER).await;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            engine.health().record_accept_outcome(false).await;
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    engine.health().record_accept_outcome(true).await;
                    engine.metrics().inc_connections_accepted();

                    if !engine.migrate_enabled() {
                        warn!(
                            peer = %peer,
                            "Migration feature is disabled, ignoring prediction connection"
                        );
                        engine.metrics().inc_connections_ignored();
                        continue;
                    }

                    debug!(peer = %peer, "Accepted connection from prediction client");
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine.handle_connection(stream).await;
                    });
                }
                _ = shutdown.recv() => {
                    info!("Shutting down prediction listener");
                    break;
                }
            }
        }

        engine
            .health()
            .set_unhealthy(components::LISTENER, "Listener stopped")
            .await;
    }
}
