//! # Servo Bank Server Library
//!
//! This library implements the command-and-control server for an array of
//! hobby servos spread across several PWM driver boards. Remote controllers
//! connect over TCP and exchange newline-delimited JSON messages; each request
//! line produces exactly one response line, in order.
//!
//! ## Module Organization
//!
//! ### Bank Module (`bank`)
//! Maps flat servo indices onto boards and channels:
//! - Index validation and angle clamping
//! - Per-board locking so different boards are driven concurrently
//! - Linear stepped sweeps that never hold a lock while sleeping
//!
//! ### Driver Module (`driver`)
//! The capability a physical board has to provide, plus an in-memory
//! simulated board used when no hardware is attached and in tests.
//!
//! ### Dispatch Module (`dispatch`)
//! Turns a decoded command into bank calls and a response. Every failure
//! becomes an error response; nothing escapes to the connection.
//!
//! ### Connection Module (`connection`)
//! Drives one socket through its read/decode/dispatch/write states.
//!
//! ### Network Module (`network`)
//! Owns the listener, spawns one task per connection and releases every
//! servo on shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::bank::{BankLayout, ServoBank};
//! use server::network::Server;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bank = Arc::new(ServoBank::simulated(BankLayout::default())?);
//!     let server = Server::bind("0.0.0.0:5000", bank).await?;
//!
//!     // Flip to true to stop accepting and release all servos
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     server.run(shutdown_rx).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bank;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod network;
