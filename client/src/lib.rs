//! # Servo Client Library
//!
//! Client side of the servo bank protocol. A [`network::ServoClient`] holds
//! one TCP connection to the server and turns method calls into request
//! lines, waiting for the matching response line each time.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection handling, request/response framing and one helper per server
//! command.
//!
//! ### Input Module (`input`)
//! Parser and loop for the interactive prompt.
//!
//! ### Animations Module (`animations`)
//! Choreographies for the whole array, built from pure frame functions so
//! the angles can be checked without a server.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::ServoClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = ServoClient::connect("192.168.1.100:5000").await?;
//!
//!     client.center().await?;
//!     client.set(0, 45.0).await?;
//!     println!("Servo 0 is at {:?}", client.get(0).await?);
//!     client.release_all().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod animations;
pub mod input;
pub mod network;
