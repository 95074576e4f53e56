//! Choreographies for the whole servo array
//!
//! Each animation is split into a pure frame function, which computes the
//! angles, and an async runner that sends the frames and paces them.

use crate::network::{ClientError, ServoClient};
use clap::ValueEnum;
use log::info;
use rand::Rng;
use shared::CENTER_ANGLE;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Servos per row when the array is treated as a grid
pub const SERVOS_PER_ROW: usize = 6;

const WAVE_AMPLITUDE: f64 = 45.0;
/// Phase offset between neighbouring servos, in degrees
const WAVE_SPREAD: f64 = 20.0;
const WAVE_PHASE_STEP: usize = 10;

const BREATH_LOW: i32 = 45;
const BREATH_HIGH: i32 = 135;
const BREATH_STEP: usize = 2;

const ROW_RAISED: f64 = 135.0;

const DANCE_MIN: u32 = 30;
const DANCE_MAX: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Animation {
    /// Sine wave rolling across the array
    Wave,
    /// Everything rises and falls together
    Breathing,
    /// Rows lifted one after another
    RowWave,
    /// Each servo swept on its own
    Sequential,
    /// Random poses for ten seconds
    Random,
    /// Center, then wave, breathing, row wave and sequential
    Demo,
}

impl Animation {
    pub async fn run(self, client: &mut ServoClient, servo_count: usize) -> Result<(), ClientError> {
        match self {
            Animation::Wave => wave(client, servo_count, 3, Duration::from_millis(50)).await,
            Animation::Breathing => breathing(client, 5, Duration::from_millis(20)).await,
            Animation::RowWave => {
                row_wave(client, servo_count, SERVOS_PER_ROW, 3, Duration::from_millis(100)).await
            }
            Animation::Sequential => {
                sequential_sweep(client, servo_count, Duration::from_millis(100)).await
            }
            Animation::Random => {
                random_dance(
                    client,
                    servo_count,
                    Duration::from_secs(10),
                    Duration::from_millis(100),
                )
                .await
            }
            Animation::Demo => demo(client, servo_count).await,
        }
    }
}

/// One wave frame at `phase` degrees
pub fn wave_frame(phase: f64, servo_count: usize) -> Vec<(usize, f64)> {
    (0..servo_count)
        .map(|servo| {
            let radians = (phase + servo as f64 * WAVE_SPREAD).to_radians();
            (servo, CENTER_ANGLE + WAVE_AMPLITUDE * radians.sin())
        })
        .collect()
}

/// One inhale and exhale: 45 up to 135, then back down to 45
pub fn breathing_angles() -> Vec<f64> {
    let inhale = (BREATH_LOW..=BREATH_HIGH).step_by(BREATH_STEP);
    let exhale = (BREATH_LOW..=BREATH_HIGH).rev().step_by(BREATH_STEP);
    inhale.chain(exhale).map(f64::from).collect()
}

/// Every servo of `row` at `angle`
pub fn row_frame(row: usize, servos_per_row: usize, angle: f64) -> Vec<(usize, f64)> {
    let first = row * servos_per_row;
    (first..first + servos_per_row)
        .map(|servo| (servo, angle))
        .collect()
}

pub fn random_frame<R: Rng + ?Sized>(rng: &mut R, servo_count: usize) -> Vec<(usize, f64)> {
    (0..servo_count)
        .map(|servo| (servo, f64::from(rng.gen_range(DANCE_MIN..=DANCE_MAX))))
        .collect()
}

pub async fn wave(
    client: &mut ServoClient,
    servo_count: usize,
    cycles: usize,
    speed: Duration,
) -> Result<(), ClientError> {
    info!("Running wave animation");
    for _ in 0..cycles {
        for phase in (0..360).step_by(WAVE_PHASE_STEP) {
            client
                .set_multiple(wave_frame(phase as f64, servo_count))
                .await?;
            sleep(speed).await;
        }
    }
    Ok(())
}

pub async fn breathing(
    client: &mut ServoClient,
    cycles: usize,
    speed: Duration,
) -> Result<(), ClientError> {
    info!("Running breathing animation");
    let angles = breathing_angles();
    for _ in 0..cycles {
        for angle in &angles {
            client.set_all(*angle).await?;
            sleep(speed).await;
        }
    }
    Ok(())
}

/// Lifts each full row in turn and drops it back to center
pub async fn row_wave(
    client: &mut ServoClient,
    servo_count: usize,
    servos_per_row: usize,
    cycles: usize,
    speed: Duration,
) -> Result<(), ClientError> {
    info!("Running row wave");
    let rows = servo_count / servos_per_row.max(1);
    for _ in 0..cycles {
        for row in 0..rows {
            client
                .set_multiple(row_frame(row, servos_per_row, ROW_RAISED))
                .await?;
            sleep(speed).await;
            client
                .set_multiple(row_frame(row, servos_per_row, CENTER_ANGLE))
                .await?;
        }
    }
    Ok(())
}

pub async fn sequential_sweep(
    client: &mut ServoClient,
    servo_count: usize,
    delay: Duration,
) -> Result<(), ClientError> {
    info!("Running sequential sweep");
    for servo in 0..servo_count {
        client.set(servo, 0.0).await?;
        sleep(delay).await;
        client.set(servo, 180.0).await?;
        sleep(delay).await;
        client.set(servo, CENTER_ANGLE).await?;
    }
    Ok(())
}

pub async fn random_dance(
    client: &mut ServoClient,
    servo_count: usize,
    duration: Duration,
    speed: Duration,
) -> Result<(), ClientError> {
    info!("Running random dance for {:?}", duration);
    let started = Instant::now();
    while started.elapsed() < duration {
        // Not held across an await
        let frame = random_frame(&mut rand::thread_rng(), servo_count);
        client.set_multiple(frame).await?;
        sleep(speed).await;
    }
    Ok(())
}

/// Full show; always ends centered and released, even when a step fails
pub async fn demo(client: &mut ServoClient, servo_count: usize) -> Result<(), ClientError> {
    client.ping().await?;
    info!("Centering all servos");
    client.center().await?;
    sleep(Duration::from_secs(1)).await;

    let show = demo_sequence(client, servo_count).await;

    info!("Centering and releasing");
    client.center().await?;
    sleep(Duration::from_millis(500)).await;
    client.release_all().await?;
    show
}

async fn demo_sequence(client: &mut ServoClient, servo_count: usize) -> Result<(), ClientError> {
    let pause = Duration::from_millis(500);

    wave(client, servo_count, 2, Duration::from_millis(50)).await?;
    sleep(pause).await;
    breathing(client, 3, Duration::from_millis(20)).await?;
    sleep(pause).await;
    row_wave(client, servo_count, SERVOS_PER_ROW, 2, Duration::from_millis(100)).await?;
    sleep(pause).await;
    sequential_sweep(client, servo_count, Duration::from_millis(100)).await
}
