//! Migration dispatch
//!
//! The server does not move containers itself. A dispatcher hands the
//! directive to whatever performs the migration and reports the outcome.

use crate::clock::{Clock, SystemClock};
use crate::error::DispatchError;
use crate::models::MigrationDirective;
use crate::protocol::{read_frame, write_frame, MigrationCommand, MigrationOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Default port of the migration agent running on every host
pub const DEFAULT_AGENT_PORT: u16 = 5052;

/// Hands migration directives to the migration mechanism
#[async_trait]
pub trait MigrationDispatcher: Send + Sync {
    /// Attempt the migration; `Ok` means the container now runs on the destination
    async fn dispatch(&self, directive: &MigrationDirective) -> Result<(), DispatchError>;
}

/// Sends directives to the migration agent on the container's source host
pub struct RemoteDispatcher {
    agent_port: u16,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl RemoteDispatcher {
    pub fn new(agent_port: u16, timeout: Duration) -> Self {
        Self {
            agent_port,
            timeout,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn agent_addr(&self, host: &str) -> String {
        format!("{}:{}", host, self.agent_port)
    }

    async fn exchange(
        &self,
        addr: &str,
        command: &MigrationCommand,
    ) -> Result<MigrationOutcome, DispatchError> {
        let mut stream =
            TcpStream::connect(addr)
                .await
                .map_err(|cause| DispatchError::Unreachable {
                    addr: addr.to_string(),
                    cause,
                })?;

        write_frame(&mut stream, command).await?;
        debug!(addr = %addr, container_id = %command.container_id, "Migration command sent");

        Ok(read_frame(&mut stream).await?)
    }
}

#[async_trait]
impl MigrationDispatcher for RemoteDispatcher {
    async fn dispatch(&self, directive: &MigrationDirective) -> Result<(), DispatchError> {
        let addr = self.agent_addr(&directive.source_host);
        let command = MigrationCommand::from_directive(directive, self.clock.now());

        let outcome = tokio::time::timeout(self.timeout, self.exchange(&addr, &command))
            .await
            .map_err(|_| DispatchError::Timeout {
                container_id: directive.container_id.clone(),
                secs: self.timeout.as_secs(),
            })??;

        if outcome.success {
            Ok(())
        } else {
            Err(DispatchError::Rejected {
                container_id: directive.container_id.clone(),
                message: outcome.message,
            })
        }
    }
}

/// Logs directives and reports success without contacting any agent
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDispatcher;

#[async_trait]
impl MigrationDispatcher for DryRunDispatcher {
    async fn dispatch(&self, directive: &MigrationDirective) -> Result<(), DispatchError> {
        info!(
            container_id = %directive.container_id,
            source_host = %directive.source_host,
            destination_host = %directive.destination_host,
            "Dry run: migration not performed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn directive() -> MigrationDirective {
        MigrationDirective {
            container_id: "c1".to_string(),
            source_host: "127.0.0.1".to_string(),
            destination_host: "node-b".to_string(),
        }
    }

    /// Fake agent answering a single command
    async fn spawn_agent(outcome: MigrationOutcome) -> (u16, tokio::task::JoinHandle<MigrationCommand>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let command: MigrationCommand = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &outcome).await.unwrap();
            command
        });

        (port, handle)
    }

    #[tokio::test]
    async fn test_remote_dispatch_success() {
        let (port, agent) = spawn_agent(MigrationOutcome {
            success: true,
            message: String::new(),
        })
        .await;

        let clock = Arc::new(crate::clock::ManualClock::new(1234));
        let dispatcher = RemoteDispatcher::new(port, Duration::from_secs(5)).with_clock(clock);
        dispatcher.dispatch(&directive()).await.unwrap();

        let command = agent.await.unwrap();
        assert_eq!(command.container_id, "c1");
        assert_eq!(command.destination_host, "node-b");
        assert_eq!(command.issued_at, 1234);
    }

    #[tokio::test]
    async fn test_remote_dispatch_rejected() {
        let (port, _agent) = spawn_agent(MigrationOutcome {
            success: false,
            message: "checkpoint failed".to_string(),
        })
        .await;

        let dispatcher = RemoteDispatcher::new(port, Duration::from_secs(5));
        let err = dispatcher.dispatch(&directive()).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Rejected { ref message, .. } if message == "checkpoint failed"
        ));
    }

    #[tokio::test]
    async fn test_remote_dispatch_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dispatcher = RemoteDispatcher::new(port, Duration::from_secs(5));
        let err = dispatcher.dispatch(&directive()).await.unwrap_err();

        assert!(matches!(err, DispatchError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_remote_dispatch_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let dispatcher = RemoteDispatcher::new(port, Duration::from_millis(100));
        let err = dispatcher.dispatch(&directive()).await.unwrap_err();

        assert!(matches!(err, DispatchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_succeeds() {
        assert!(DryRunDispatcher.dispatch(&directive()).await.is_ok());
    }
}
