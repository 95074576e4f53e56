//! TCP listener accepting controller connections
//!
//! The accept loop never blocks for longer than the poll interval, so a
//! shutdown request is noticed promptly even when no client ever connects.

use crate::bank::ServoBank;
use crate::connection::ConnectionHandler;
use crate::error::ServerError;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Longest single wait on `accept` before the shutdown flag is checked again
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Servo command server
pub struct Server {
    listener: TcpListener,
    bank: Arc<ServoBank>,
    accept_poll: Duration,
}

impl Server {
    pub async fn bind(addr: &str, bank: Arc<ServoBank>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            bank,
            accept_poll: ACCEPT_POLL_INTERVAL,
        })
    }

    pub fn with_accept_poll(mut self, accept_poll: Duration) -> Self {
        self.accept_poll = accept_poll;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn bank(&self) -> Arc<ServoBank> {
        Arc::clone(&self.bank)
    }

    /// Accepts connections until `shutdown` turns true or its sender is dropped
    ///
    /// On the way out, open connections are aborted and every servo is
    /// released.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Reap finished connection tasks
            while let Some(result) = connections.try_join_next() {
                if let Err(e) = result {
                    error!("Connection task failed: {}", e);
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }
                accepted = timeout(self.accept_poll, self.listener.accept()) => {
                    match accepted {
                        // Poll interval elapsed, check the flag again
                        Err(_) => continue,
                        Ok(Ok((stream, peer))) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                            }
                            let handler = ConnectionHandler::new(stream, peer, Arc::clone(&self.bank));
                            connections.spawn(handler.run());
                        }
                        Ok(Err(e)) => {
                            warn!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }

        info!(
            "Shutting down, closing {} open connection(s)",
            connections.len()
        );
        connections.shutdown().await;

        if let Err(e) = self.bank.release_all().await {
            error!("Failed to release servos during shutdown: {}", e);
        }
        info!("All servos released");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankLayout;
    use shared::Response;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    fn bank() -> Arc<ServoBank> {
        Arc::new(ServoBank::simulated(BankLayout::default()).unwrap())
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = Server::bind("127.0.0.1:0", bank()).await.unwrap();
        let addr = first.local_addr().unwrap().to_string();

        match Server::bind(&addr, bank()).await {
            Err(ServerError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            Err(other) => panic!("Expected bind error, got {}", other),
            Ok(_) => panic!("Second bind on {} succeeded", addr),
        }
    }

    #[tokio::test]
    async fn test_serves_requests_and_releases_on_shutdown() {
        let bank = bank();
        let server = Server::bind("127.0.0.1:0", Arc::clone(&bank))
            .await
            .unwrap()
            .with_accept_poll(Duration::from_millis(50));
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(shutdown_rx));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"cmd\":\"set\",\"servo\":4,\"angle\":30}\n")
            .await
            .unwrap();
        let response = Response::decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(response.is_ok());
        assert_eq!(bank.angle(4).await.unwrap(), Some(30.0));

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(bank.angle(4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_server() {
        let server = Server::bind("127.0.0.1:0", bank())
            .await
            .unwrap()
            .with_accept_poll(Duration::from_millis(20));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(shutdown_rx));
        drop(shutdown_tx);

        assert!(timeout(Duration::from_secs(5), task).await.is_ok());
    }
}
