//! Connection to a servo server
//!
//! One persistent TCP stream; every call writes one request line and waits
//! for exactly one response line.

use log::{debug, info};
use serde_json::Value;
use shared::{Command, LineFramer, ProtocolError, Response, DEFAULT_SWEEP_DELAY};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server closed the connection")]
    ConnectionClosed,

    /// The server answered with `status: error`
    #[error("Server error: {0}")]
    Server(String),
}

pub struct ServoClient {
    stream: TcpStream,
    framer: LineFramer,
}

impl ServoClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);

        Ok(Self {
            stream,
            framer: LineFramer::new(),
        })
    }

    /// Sends a command and returns the response as received, whatever its status
    pub async fn request(&mut self, command: &Command) -> Result<Response, ClientError> {
        let line = command.to_line()?;
        debug!("-> {}", line.trim_end());

        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;

        let reply = self.read_line().await?;
        debug!("<- {}", reply);
        Ok(Response::decode(&reply)?)
    }

    /// Like [`request`](Self::request), but an error status becomes `Err`
    pub async fn call(&mut self, command: &Command) -> Result<Response, ClientError> {
        let response = self.request(command).await?;
        if response.is_ok() {
            Ok(response)
        } else {
            let message = response.message().unwrap_or("unknown error").to_string();
            Err(ClientError::Server(message))
        }
    }

    async fn read_line(&mut self) -> Result<String, ClientError> {
        let mut buffer = [0u8; 4096];
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(line?);
            }

            let n = self.stream.read(&mut buffer).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.framer.push(&buffer[..n]);
        }
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.call(&Command::Ping).await.map(|_| ())
    }

    /// Moves one servo, returning the angle the server applied
    pub async fn set(&mut self, servo: usize, angle: f64) -> Result<f64, ClientError> {
        let response = self
            .call(&Command::Set {
                servo: servo as i64,
                angle,
            })
            .await?;
        Ok(response.angle().unwrap_or(angle))
    }

    /// Moves several servos in one request, returning how many were applied
    pub async fn set_multiple<I>(&mut self, angles: I) -> Result<usize, ClientError>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let response = self.call(&Command::set_multiple(angles)).await?;
        let updated = response
            .get("updated")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        Ok(updated as usize)
    }

    pub async fn set_all(&mut self, angle: f64) -> Result<(), ClientError> {
        self.call(&Command::SetAll { angle }).await.map(|_| ())
    }

    pub async fn center(&mut self) -> Result<(), ClientError> {
        self.call(&Command::Center).await.map(|_| ())
    }

    pub async fn release(&mut self, servo: usize) -> Result<(), ClientError> {
        self.call(&Command::Release {
            servo: servo as i64,
        })
        .await
        .map(|_| ())
    }

    pub async fn release_all(&mut self) -> Result<(), ClientError> {
        self.call(&Command::ReleaseAll).await.map(|_| ())
    }

    /// Last commanded angle, `None` when the servo is released
    pub async fn get(&mut self, servo: usize) -> Result<Option<f64>, ClientError> {
        let response = self
            .call(&Command::Get {
                servo: servo as i64,
            })
            .await?;
        Ok(response.angle())
    }

    /// Full 0 to 180 sweep with the default step and delay
    pub async fn sweep(&mut self, servo: usize) -> Result<(), ClientError> {
        self.call(&Command::sweep(servo as i64)).await.map(|_| ())
    }

    pub async fn sweep_with(
        &mut self,
        servo: usize,
        start: f64,
        end: f64,
        step: f64,
        delay: Option<f64>,
    ) -> Result<(), ClientError> {
        let command = Command::Sweep {
            servo: servo as i64,
            start,
            end,
            step,
            delay: delay.unwrap_or(DEFAULT_SWEEP_DELAY),
        };
        self.call(&command).await.map(|_| ())
    }

    pub async fn set_pulse_range(
        &mut self,
        servo: Option<usize>,
        min: u16,
        max: u16,
    ) -> Result<(), ClientError> {
        let command = Command::SetPulseRange {
            servo: servo.map(|s| s as i64),
            min,
            max,
        };
        self.call(&command).await.map(|_| ())
    }

    pub async fn info(&mut self) -> Result<Response, ClientError> {
        self.call(&Command::Info).await
    }

    /// Closes the write side so the server sees EOF
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
