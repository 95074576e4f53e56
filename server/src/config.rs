//! Command line configuration for the server binary

use crate::bank::BankLayout;
use crate::driver::{
    PulseRange, DEFAULT_FREQUENCY_HZ, DEFAULT_MAX_PULSE_US, DEFAULT_MIN_PULSE_US,
    PCA9685_CHANNELS,
};
use crate::error::ServoError;
use crate::network::ACCEPT_POLL_INTERVAL;
use clap::Parser;
use shared::{DEFAULT_PORT, DEFAULT_SERVO_COUNT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "TCP controller for a bank of hobby servos")]
pub struct ServerArgs {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of servos attached
    #[arg(short, long, default_value_t = DEFAULT_SERVO_COUNT)]
    pub servos: usize,

    /// PWM channels on each driver board
    #[arg(long, default_value_t = PCA9685_CHANNELS)]
    pub channels_per_board: usize,

    /// PWM frequency in Hz
    #[arg(short, long, default_value_t = DEFAULT_FREQUENCY_HZ)]
    pub frequency: u32,

    /// Pulse width at 0 degrees, in microseconds
    #[arg(long, default_value_t = DEFAULT_MIN_PULSE_US)]
    pub min_pulse: u16,

    /// Pulse width at 180 degrees, in microseconds
    #[arg(long, default_value_t = DEFAULT_MAX_PULSE_US)]
    pub max_pulse: u16,

    /// Longest wait on accept before checking for shutdown, in milliseconds
    #[arg(long, default_value_t = ACCEPT_POLL_INTERVAL.as_millis() as u64)]
    pub accept_poll_ms: u64,
}

/// Validated server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub layout: BankLayout,
    pub accept_poll: Duration,
}

impl ServerArgs {
    pub fn into_config(self) -> Result<ServerConfig, ServoError> {
        let layout = BankLayout {
            servo_count: self.servos,
            channels_per_board: self.channels_per_board,
            frequency_hz: self.frequency,
            pulse_range: PulseRange::new(self.min_pulse, self.max_pulse)?,
        };
        layout.validate()?;

        if self.accept_poll_ms == 0 {
            return Err(ServoError::Config(
                "Accept poll interval must be positive".to_string(),
            ));
        }

        Ok(ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            layout,
            accept_poll: Duration::from_millis(self.accept_poll_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerArgs::try_parse_from(["server"])
            .unwrap()
            .into_config()
            .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.layout, BankLayout::default());
        assert_eq!(config.accept_poll, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = ServerArgs::try_parse_from([
            "server",
            "--host",
            "127.0.0.1",
            "--port",
            "6000",
            "--servos",
            "20",
            "--channels-per-board",
            "8",
            "--min-pulse",
            "600",
            "--max-pulse",
            "2400",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:6000");
        assert_eq!(config.layout.servo_count, 20);
        assert_eq!(config.layout.board_count(), 3);
        assert_eq!(config.layout.pulse_range, PulseRange::new(600, 2400).unwrap());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let inverted = ServerArgs::try_parse_from(["server", "--min-pulse", "2500", "--max-pulse", "500"])
            .unwrap()
            .into_config();
        assert!(matches!(inverted, Err(ServoError::Config(_))));

        let empty = ServerArgs::try_parse_from(["server", "--servos", "0"])
            .unwrap()
            .into_config();
        assert!(empty.is_err());

        assert!(ServerArgs::try_parse_from(["server", "--port", "70000"]).is_err());
    }
}
