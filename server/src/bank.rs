//! Servo addressing across several driver boards
//!
//! A logical servo index is split into a board and a channel:
//! `board = index / channels_per_board`, `channel = index % channels_per_board`.
//! The bank validates indices, clamps angles and serializes writes per board.
//!
//! Locking: every board sits behind its own `RwLock`. Writers hold it only for
//! the driver call itself (one channel, or one board's channels for the bulk
//! operations), so a sweep never holds a lock while it sleeps.

use crate::driver::{
    CallJournal, PulseRange, ServoDriver, SimulatedBoard, DEFAULT_FREQUENCY_HZ, PCA9685_CHANNELS,
};
use crate::error::ServoError;
use log::{info, warn};
use shared::{CENTER_ANGLE, DEFAULT_SERVO_COUNT, MAX_ANGLE, MIN_ANGLE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Upper bound on set calls in a single sweep
pub const MAX_SWEEP_STEPS: usize = 10_000;

/// Tolerance for landing exactly on a sweep's end angle
const SWEEP_EPSILON: f64 = 1e-9;

/// Clamps to the logical angle domain; NaN maps to the lower bound
pub fn clamp_angle(angle: f64) -> f64 {
    if angle.is_nan() {
        MIN_ANGLE
    } else {
        angle.clamp(MIN_ANGLE, MAX_ANGLE)
    }
}

/// Shape of the bank: how many servos, spread over how many channels per board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankLayout {
    pub servo_count: usize,
    pub channels_per_board: usize,
    pub frequency_hz: u32,
    pub pulse_range: PulseRange,
}

impl BankLayout {
    pub fn board_count(&self) -> usize {
        self.servo_count.div_ceil(self.channels_per_board.max(1))
    }

    /// Servos wired to `board`; only the last board may be partially used
    pub fn servos_on_board(&self, board: usize) -> usize {
        let first = board * self.channels_per_board;
        self.servo_count
            .saturating_sub(first)
            .min(self.channels_per_board)
    }

    pub fn validate(&self) -> Result<(), ServoError> {
        if self.servo_count == 0 {
            return Err(ServoError::Config("Servo count must be positive".to_string()));
        }
        if self.channels_per_board == 0 {
            return Err(ServoError::Config(
                "Channels per board must be positive".to_string(),
            ));
        }
        if self.frequency_hz == 0 {
            return Err(ServoError::Config("PWM frequency must be positive".to_string()));
        }
        PulseRange::new(self.pulse_range.min_us, self.pulse_range.max_us)?;
        Ok(())
    }
}

impl Default for BankLayout {
    fn default() -> Self {
        Self {
            servo_count: DEFAULT_SERVO_COUNT,
            channels_per_board: PCA9685_CHANNELS,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            pulse_range: PulseRange::default(),
        }
    }
}

/// Physical location of a servo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServoAddress {
    pub board: usize,
    pub channel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoState {
    Active(f64),
    Released,
}

impl ServoState {
    pub fn angle(&self) -> Option<f64> {
        match self {
            ServoState::Active(angle) => Some(*angle),
            ServoState::Released => None,
        }
    }
}

/// A validated linear sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPlan {
    pub start: f64,
    pub end: f64,
    /// Magnitude of each step; direction comes from `start` and `end`
    pub step: f64,
    pub delay: Duration,
}

impl SweepPlan {
    pub fn new(start: f64, end: f64, step: f64, delay_secs: f64) -> Result<Self, ServoError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(ServoError::Config(
                "Sweep start and end must be finite".to_string(),
            ));
        }
        if step == 0.0 || !step.is_finite() {
            return Err(ServoError::Config(
                "Sweep step must be a non-zero number".to_string(),
            ));
        }
        if delay_secs < 0.0 || !delay_secs.is_finite() {
            return Err(ServoError::Config(
                "Sweep delay must be a non-negative number of seconds".to_string(),
            ));
        }

        let step = step.abs();
        let intervals = ((end - start).abs() / step + SWEEP_EPSILON).floor();
        if intervals >= MAX_SWEEP_STEPS as f64 {
            return Err(ServoError::Config(format!(
                "Sweep would take more than {} steps",
                MAX_SWEEP_STEPS
            )));
        }

        let delay = Duration::try_from_secs_f64(delay_secs)
            .map_err(|e| ServoError::Config(format!("Sweep delay out of range: {}", e)))?;

        Ok(Self {
            start,
            end,
            step,
            delay,
        })
    }

    /// Number of set calls, including the start angle
    pub fn step_count(&self) -> usize {
        ((self.end - self.start).abs() / self.step + SWEEP_EPSILON).floor() as usize + 1
    }

    /// Angles visited in order; `end` is included when it lies on the grid
    pub fn angles(&self) -> impl Iterator<Item = f64> + '_ {
        let direction = if self.end >= self.start { 1.0 } else { -1.0 };
        (0..self.step_count()).map(move |k| self.start + direction * self.step * k as f64)
    }
}

/// Result of a batch set: how many applied and which indices failed
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub applied: usize,
    pub failures: Vec<(i64, ServoError)>,
}

struct Board {
    driver: Box<dyn ServoDriver>,
    pulse_ranges: Vec<PulseRange>,
}

/// All servos of the installation, addressed by a flat index
pub struct ServoBank {
    layout: BankLayout,
    boards: Vec<RwLock<Board>>,
}

impl ServoBank {
    /// Builds a bank over `drivers`, one per board in index order
    ///
    /// Every board gets the layout's PWM frequency and every servo the
    /// layout's pulse range. All servos start released.
    pub fn new(layout: BankLayout, drivers: Vec<Box<dyn ServoDriver>>) -> Result<Self, ServoError> {
        layout.validate()?;

        if drivers.len() != layout.board_count() {
            return Err(ServoError::Config(format!(
                "{} servos at {} channels per board need {} boards, got {}",
                layout.servo_count,
                layout.channels_per_board,
                layout.board_count(),
                drivers.len()
            )));
        }

        let mut boards = Vec::with_capacity(drivers.len());
        for (index, mut driver) in drivers.into_iter().enumerate() {
            if driver.channel_count() < layout.channels_per_board {
                return Err(ServoError::Config(format!(
                    "Board {} has {} channels, layout needs {}",
                    index,
                    driver.channel_count(),
                    layout.channels_per_board
                )));
            }

            driver.set_frequency(layout.frequency_hz)?;
            let servos = layout.servos_on_board(index);
            for channel in 0..servos {
                driver.set_pulse_width_range(channel, layout.pulse_range)?;
            }

            boards.push(RwLock::new(Board {
                driver,
                pulse_ranges: vec![layout.pulse_range; servos],
            }));
        }

        info!(
            "Initialized {} servos on {} boards ({} channels each, {} Hz)",
            layout.servo_count,
            boards.len(),
            layout.channels_per_board,
            layout.frequency_hz
        );

        Ok(Self { layout, boards })
    }

    /// Bank backed entirely by [`SimulatedBoard`]s
    pub fn simulated(layout: BankLayout) -> Result<Self, ServoError> {
        Self::new(layout, Self::simulated_drivers(layout, None))
    }

    /// Simulated bank whose boards record every write into `journal`
    pub fn simulated_with_journal(
        layout: BankLayout,
        journal: CallJournal,
    ) -> Result<Self, ServoError> {
        Self::new(layout, Self::simulated_drivers(layout, Some(journal)))
    }

    fn simulated_drivers(
        layout: BankLayout,
        journal: Option<CallJournal>,
    ) -> Vec<Box<dyn ServoDriver>> {
        (0..layout.board_count())
            .map(|id| {
                let board = SimulatedBoard::new(id, layout.channels_per_board);
                let board = match &journal {
                    Some(journal) => board.with_journal(Arc::clone(journal)),
                    None => board,
                };
                Box::new(board) as Box<dyn ServoDriver>
            })
            .collect()
    }

    pub fn layout(&self) -> BankLayout {
        self.layout
    }

    pub fn servo_count(&self) -> usize {
        self.layout.servo_count
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    pub fn channels_per_board(&self) -> usize {
        self.layout.channels_per_board
    }

    pub fn frequency_hz(&self) -> u32 {
        self.layout.frequency_hz
    }

    /// Resolves an index to its board and channel, rejecting out-of-range indices
    pub fn locate(&self, index: i64) -> Result<ServoAddress, ServoError> {
        let max = self.layout.servo_count - 1;
        let in_range = usize::try_from(index).ok().filter(|i| *i <= max);
        let Some(index) = in_range else {
            return Err(ServoError::Range { index, max });
        };

        Ok(ServoAddress {
            board: index / self.layout.channels_per_board,
            channel: index % self.layout.channels_per_board,
        })
    }

    /// Moves one servo; returns the angle actually applied
    pub async fn set_angle(&self, index: i64, angle: f64) -> Result<f64, ServoError> {
        let address = self.locate(index)?;
        let angle = clamp_angle(angle);

        let mut board = self.boards[address.board].write().await;
        board.driver.set_angle(address.channel, angle)?;
        Ok(angle)
    }

    /// Applies each pair independently; one bad index never stops the rest
    pub async fn set_many<I>(&self, angles: I) -> BatchOutcome
    where
        I: IntoIterator<Item = (i64, f64)>,
    {
        let mut outcome = BatchOutcome::default();
        for (index, angle) in angles {
            match self.set_angle(index, angle).await {
                Ok(_) => outcome.applied += 1,
                Err(error) => outcome.failures.push((index, error)),
            }
        }
        outcome
    }

    /// Moves every servo to the same angle
    ///
    /// A driver fault on one channel does not stop the others; the first
    /// fault is returned once every channel was attempted.
    pub async fn set_all(&self, angle: f64) -> Result<f64, ServoError> {
        let angle = clamp_angle(angle);
        self.for_each_channel(|driver, channel| driver.set_angle(channel, angle))
            .await?;
        Ok(angle)
    }

    pub async fn center(&self) -> Result<f64, ServoError> {
        self.set_all(CENTER_ANGLE).await
    }

    pub async fn state(&self, index: i64) -> Result<ServoState, ServoError> {
        let address = self.locate(index)?;
        let board = self.boards[address.board].read().await;

        Ok(match board.driver.angle(address.channel) {
            Some(angle) => ServoState::Active(angle),
            None => ServoState::Released,
        })
    }

    /// Last commanded angle; `None` when the servo is released
    pub async fn angle(&self, index: i64) -> Result<Option<f64>, ServoError> {
        Ok(self.state(index).await?.angle())
    }

    pub async fn release(&self, index: i64) -> Result<(), ServoError> {
        let address = self.locate(index)?;
        let mut board = self.boards[address.board].write().await;
        board.driver.release(address.channel)?;
        Ok(())
    }

    pub async fn release_all(&self) -> Result<(), ServoError> {
        self.for_each_channel(|driver, channel| driver.release(channel))
            .await
    }

    /// Walks one servo through `plan`, returning the number of set calls
    ///
    /// Blocks the caller for the whole sweep. No lock is held while sleeping,
    /// so other callers interleave freely between steps.
    pub async fn sweep(&self, index: i64, plan: &SweepPlan) -> Result<usize, ServoError> {
        self.locate(index)?;

        let mut steps = 0;
        for angle in plan.angles() {
            self.set_angle(index, angle).await?;
            steps += 1;
            if !plan.delay.is_zero() {
                tokio::time::sleep(plan.delay).await;
            }
        }
        Ok(steps)
    }

    pub async fn set_pulse_range(&self, index: i64, range: PulseRange) -> Result<(), ServoError> {
        let address = self.locate(index)?;
        let mut board = self.boards[address.board].write().await;
        board.driver.set_pulse_width_range(address.channel, range)?;
        board.pulse_ranges[address.channel] = range;
        Ok(())
    }

    pub async fn set_pulse_range_all(&self, range: PulseRange) -> Result<(), ServoError> {
        let mut first_error = None;

        for (board_index, slot) in self.boards.iter().enumerate() {
            let mut board = slot.write().await;
            for channel in 0..self.layout.servos_on_board(board_index) {
                match board.driver.set_pulse_width_range(channel, range) {
                    Ok(()) => board.pulse_ranges[channel] = range,
                    Err(error) => {
                        warn!("Board {} channel {}: {}", board_index, channel, error);
                        if first_error.is_none() {
                            first_error = Some(error);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    pub async fn pulse_range(&self, index: i64) -> Result<PulseRange, ServoError> {
        let address = self.locate(index)?;
        let board = self.boards[address.board].read().await;
        Ok(board.pulse_ranges[address.channel])
    }

    /// Runs `op` on every wired channel, one board lock at a time
    async fn for_each_channel<F>(&self, mut op: F) -> Result<(), ServoError>
    where
        F: FnMut(&mut dyn ServoDriver, usize) -> Result<(), crate::driver::DriverError>,
    {
        let mut first_error = None;

        for (board_index, slot) in self.boards.iter().enumerate() {
            let mut board = slot.write().await;
            for channel in 0..self.layout.servos_on_board(board_index) {
                if let Err(error) = op(board.driver.as_mut(), channel) {
                    warn!("Board {} channel {}: {}", board_index, channel, error);
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}
