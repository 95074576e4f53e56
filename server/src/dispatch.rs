//! Maps decoded commands onto servo bank operations
//!
//! Dispatch is total: every input line produces exactly one `Response` and no
//! failure escapes as a panic or an error value.

use crate::bank::{ServoBank, SweepPlan};
use crate::driver::PulseRange;
use crate::error::ServoError;
use log::{debug, warn};
use serde_json::{json, Value};
use shared::{Command, Response};
use std::collections::BTreeMap;

/// Decodes and executes one request line
pub async fn handle_line(bank: &ServoBank, line: &str) -> Response {
    match Command::decode(line) {
        Ok(command) => dispatch(bank, command).await,
        Err(e) => {
            warn!("Rejected request: {}", e);
            Response::from(e)
        }
    }
}

/// Executes one decoded command
pub async fn dispatch(bank: &ServoBank, command: Command) -> Response {
    let name = command.name();
    debug!("Dispatching {:?}", command);

    match execute(bank, command).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Command '{}' failed: {}", name, e);
            Response::error(e.to_string())
        }
    }
}

async fn execute(bank: &ServoBank, command: Command) -> Result<Response, ServoError> {
    let response = match command {
        Command::Ping => Response::ok().with("message", "pong"),

        Command::Set { servo, angle } => {
            let applied = bank.set_angle(servo, angle).await?;
            Response::ok().with("servo", servo).with("angle", applied)
        }

        Command::SetMultiple { angles } => set_multiple(bank, angles).await,

        Command::SetAll { angle } => {
            let applied = bank.set_all(angle).await?;
            Response::ok().with("angle", applied)
        }

        Command::Center => {
            bank.center().await?;
            Response::ok().with("action", "centered")
        }

        Command::Release { servo } => {
            bank.release(servo).await?;
            Response::ok()
                .with("servo", servo)
                .with("action", "released")
        }

        Command::ReleaseAll => {
            bank.release_all().await?;
            Response::ok().with("action", "all_released")
        }

        Command::Get { servo } => {
            let angle = bank.angle(servo).await?;
            Response::ok().with("servo", servo).with("angle", angle)
        }

        Command::Sweep {
            servo,
            start,
            end,
            step,
            delay,
        } => {
            let plan = SweepPlan::new(start, end, step, delay)?;
            let steps = bank.sweep(servo, &plan).await?;
            Response::ok()
                .with("servo", servo)
                .with("action", "sweep_complete")
                .with("steps", steps)
        }

        Command::SetPulseRange { servo, min, max } => {
            let range = PulseRange::new(min, max)?;
            let response = Response::ok().with("min", min).with("max", max);
            match servo {
                Some(servo) => {
                    bank.set_pulse_range(servo, range).await?;
                    response.with("servo", servo)
                }
                None => {
                    bank.set_pulse_range_all(range).await?;
                    response
                }
            }
        }

        Command::Info => Response::ok()
            .with("servos", bank.servo_count())
            .with("boards", bank.board_count())
            .with("channels_per_board", bank.channels_per_board())
            .with("frequency_hz", bank.frequency_hz()),
    };

    Ok(response)
}

/// Applies every entry independently and reports the ones that failed
async fn set_multiple(bank: &ServoBank, angles: BTreeMap<String, f64>) -> Response {
    let mut failed: Vec<Value> = Vec::new();
    let mut pairs = Vec::with_capacity(angles.len());

    for (key, angle) in angles {
        match key.trim().parse::<i64>() {
            Ok(servo) => pairs.push((servo, angle)),
            Err(_) => failed.push(json!({
                "servo": key,
                "message": format!("Invalid servo index: {}", key),
            })),
        }
    }

    let outcome = bank.set_many(pairs).await;
    for (servo, error) in &outcome.failures {
        failed.push(json!({ "servo": servo, "message": error.to_string() }));
    }

    if !failed.is_empty() {
        warn!("set_multiple: {} of the entries failed", failed.len());
    }

    Response::ok()
        .with("updated", outcome.applied)
        .with("failed", failed)
}
