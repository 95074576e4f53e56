//! Per-connection request loop
//!
//! Each accepted socket is driven by one `ConnectionHandler`, which moves
//! through explicit states until the peer goes away:
//!
//! ```text
//! Reading -> Decoding -> Dispatching -> Writing -> Decoding ...
//!    ^          |
//!    +----------+ (no complete line buffered)
//! ```
//!
//! Requests on one connection are answered strictly in order.

use crate::bank::ServoBank;
use crate::dispatch::handle_line;
use log::{debug, info, warn};
use shared::{LineFramer, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Waiting for bytes from the peer
    Reading,
    /// Looking for a complete line in the buffer
    Decoding,
    /// Executing one request line
    Dispatching(String),
    /// Sending one encoded response
    Writing(String),
    Closed,
}

pub struct ConnectionHandler<S> {
    stream: S,
    peer: SocketAddr,
    bank: Arc<ServoBank>,
    framer: LineFramer,
    state: ConnectionState,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, bank: Arc<ServoBank>) -> Self {
        Self {
            stream,
            peer,
            bank,
            framer: LineFramer::new(),
            state: ConnectionState::Reading,
        }
    }

    /// Serves the connection until EOF or an I/O error, returning the number
    /// of responses written
    pub async fn run(mut self) -> usize {
        info!("Client connected: {}", self.peer);

        let mut buffer = [0u8; READ_CHUNK_SIZE];
        let mut responses = 0;

        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.stream.read(&mut buffer).await {
                    Ok(0) => ConnectionState::Closed,
                    Ok(n) => {
                        self.framer.push(&buffer[..n]);
                        ConnectionState::Decoding
                    }
                    Err(e) => {
                        warn!("Read from {} failed: {}", self.peer, e);
                        ConnectionState::Closed
                    }
                },

                ConnectionState::Decoding => match self.framer.next_line() {
                    None => ConnectionState::Reading,
                    Some(Ok(line)) => ConnectionState::Dispatching(line),
                    Some(Err(e)) => {
                        warn!("Malformed input from {}: {}", self.peer, e);
                        ConnectionState::Writing(Response::from(e).to_line())
                    }
                },

                ConnectionState::Dispatching(line) => {
                    debug!("{} -> {}", self.peer, line);
                    let response = handle_line(&self.bank, &line).await;
                    ConnectionState::Writing(response.to_line())
                }

                ConnectionState::Writing(line) => match self.write_line(&line).await {
                    Ok(()) => {
                        responses += 1;
                        ConnectionState::Decoding
                    }
                    Err(e) => {
                        warn!("Write to {} failed: {}", self.peer, e);
                        ConnectionState::Closed
                    }
                },

                ConnectionState::Closed => break,
            };
        }

        info!(
            "Client disconnected: {} ({} responses)",
            self.peer, responses
        );
        responses
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await
    }
}
