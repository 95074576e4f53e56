//! Hardware capability behind the servo bank
//!
//! A driver is one physical PWM board exposing a fixed number of channels.
//! The bank only ever talks to boards through [`ServoDriver`], so real
//! hardware bindings and the in-memory [`SimulatedBoard`] are interchangeable.

use crate::error::ServoError;
use log::debug;
use shared::MAX_ANGLE;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Channels on a PCA9685-class board
pub const PCA9685_CHANNELS: usize = 16;
/// Standard hobby servo refresh rate
pub const DEFAULT_FREQUENCY_HZ: u32 = 50;
pub const DEFAULT_MIN_PULSE_US: u16 = 500;
pub const DEFAULT_MAX_PULSE_US: u16 = 2500;

/// 12-bit PWM counter
const DUTY_RESOLUTION: f64 = 4096.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("Channel {channel} not present on a {channels}-channel board")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("Unsupported PWM frequency: {0} Hz")]
    InvalidFrequency(u32),

    #[error("Bus error: {0}")]
    Bus(String),
}

/// Pulse width calibration mapping 0..180 degrees onto microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseRange {
    pub min_us: u16,
    pub max_us: u16,
}

impl PulseRange {
    pub fn new(min_us: u16, max_us: u16) -> Result<Self, ServoError> {
        if min_us >= max_us {
            return Err(ServoError::Config(format!(
                "Pulse range minimum {}us must be below maximum {}us",
                min_us, max_us
            )));
        }
        Ok(Self { min_us, max_us })
    }

    /// Pulse width in microseconds for an already clamped angle
    pub fn pulse_for(&self, angle: f64) -> f64 {
        let span = f64::from(self.max_us - self.min_us);
        f64::from(self.min_us) + span * angle / MAX_ANGLE
    }
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            min_us: DEFAULT_MIN_PULSE_US,
            max_us: DEFAULT_MAX_PULSE_US,
        }
    }
}

/// On-time counter value for a pulse at the given PWM frequency
pub fn duty_ticks(pulse_us: f64, frequency_hz: u32) -> u16 {
    let period_us = 1_000_000.0 / f64::from(frequency_hz.max(1));
    (pulse_us / period_us * DUTY_RESOLUTION)
        .round()
        .clamp(0.0, DUTY_RESOLUTION - 1.0) as u16
}

/// One PWM driver board
///
/// Angles handed to a driver are already clamped to 0..=180.
pub trait ServoDriver: Send + Sync {
    fn channel_count(&self) -> usize;

    fn set_angle(&mut self, channel: usize, angle: f64) -> Result<(), DriverError>;

    /// Last commanded angle, `None` while the channel is not driven
    fn angle(&self, channel: usize) -> Option<f64>;

    /// Stops driving the channel
    fn release(&mut self, channel: usize) -> Result<(), DriverError>;

    fn set_pulse_width_range(
        &mut self,
        channel: usize,
        range: PulseRange,
    ) -> Result<(), DriverError>;

    fn set_frequency(&mut self, hz: u32) -> Result<(), DriverError>;

    fn frequency(&self) -> u32;
}

/// Write observed by a [`SimulatedBoard`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoardCall {
    SetAngle {
        channel: usize,
        angle: f64,
        duty: u16,
    },
    Release {
        channel: usize,
    },
    SetPulseRange {
        channel: usize,
        range: PulseRange,
    },
    SetFrequency {
        hz: u32,
    },
}

/// Shared record of `(board id, call)` pairs across simulated boards
pub type CallJournal = Arc<Mutex<Vec<(usize, BoardCall)>>>;

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    angle: Option<f64>,
    range: PulseRange,
}

/// In-memory board used when no hardware is attached, and in tests
#[derive(Debug)]
pub struct SimulatedBoard {
    id: usize,
    channels: Vec<ChannelState>,
    frequency_hz: u32,
    journal: Option<CallJournal>,
}

impl SimulatedBoard {
    pub fn new(id: usize, channel_count: usize) -> Self {
        Self {
            id,
            channels: vec![
                ChannelState {
                    angle: None,
                    range: PulseRange::default(),
                };
                channel_count
            ],
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            journal: None,
        }
    }

    /// Records every write into `journal`
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Current on-time ticks, `None` when released
    pub fn duty(&self, channel: usize) -> Option<u16> {
        let state = self.channels.get(channel)?;
        let angle = state.angle?;
        Some(duty_ticks(state.range.pulse_for(angle), self.frequency_hz))
    }

    fn channel_mut(&mut self, channel: usize) -> Result<&mut ChannelState, DriverError> {
        let channels = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(DriverError::ChannelOutOfRange { channel, channels })
    }

    fn record(&self, call: BoardCall) {
        if let Some(journal) = &self.journal {
            if let Ok(mut calls) = journal.lock() {
                calls.push((self.id, call));
            }
        }
    }
}

impl ServoDriver for SimulatedBoard {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn set_angle(&mut self, channel: usize, angle: f64) -> Result<(), DriverError> {
        let frequency_hz = self.frequency_hz;
        let state = self.channel_mut(channel)?;
        state.angle = Some(angle);
        let duty = duty_ticks(state.range.pulse_for(angle), frequency_hz);

        debug!(
            "board {} channel {}: angle {:.1} -> duty {}",
            self.id, channel, angle, duty
        );
        self.record(BoardCall::SetAngle {
            channel,
            angle,
            duty,
        });
        Ok(())
    }

    fn angle(&self, channel: usize) -> Option<f64> {
        self.channels.get(channel).and_then(|state| state.angle)
    }

    fn release(&mut self, channel: usize) -> Result<(), DriverError> {
        self.channel_mut(channel)?.angle = None;
        debug!("board {} channel {}: released", self.id, channel);
        self.record(BoardCall::Release { channel });
        Ok(())
    }

    fn set_pulse_width_range(
        &mut self,
        channel: usize,
        range: PulseRange,
    ) -> Result<(), DriverError> {
        self.channel_mut(channel)?.range = range;
        self.record(BoardCall::SetPulseRange { channel, range });
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), DriverError> {
        // PCA9685 prescaler limits
        if !(24..=1526).contains(&hz) {
            return Err(DriverError::InvalidFrequency(hz));
        }
        self.frequency_hz = hz;
        self.record(BoardCall::SetFrequency { hz });
        Ok(())
    }

    fn frequency(&self) -> u32 {
        self.frequency_hz
    }
}
