//! Wire protocol shared by the servo server and its clients.
//!
//! Every message is a single-line JSON object terminated by `\n`. Requests
//! carry a `cmd` tag selecting the operation; responses always carry
//! `"status": "ok"` or `"status": "error"` plus command-specific fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

mod framing;

pub use framing::LineFramer;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SERVO_COUNT: usize = 36;

pub const MIN_ANGLE: f64 = 0.0;
pub const MAX_ANGLE: f64 = 180.0;
pub const CENTER_ANGLE: f64 = 90.0;

pub const DEFAULT_SWEEP_START: f64 = 0.0;
pub const DEFAULT_SWEEP_END: f64 = 180.0;
pub const DEFAULT_SWEEP_STEP: f64 = 5.0;
/// Seconds slept after each sweep step
pub const DEFAULT_SWEEP_DELAY: f64 = 0.05;

/// Longest accepted request line, excluding the newline
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Errors raised while framing, decoding or encoding protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Message must be a JSON object")]
    NotAnObject,

    #[error("Missing parameter: {0}")]
    MissingField(String),

    #[error("Parameter '{field}' must be {expected}")]
    InvalidField { field: String, expected: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid parameters for '{command}': {detail}")]
    InvalidParameters { command: String, detail: String },

    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Message exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("Encoding failed: {0}")]
    Encode(String),
}

fn default_sweep_start() -> f64 {
    DEFAULT_SWEEP_START
}

fn default_sweep_end() -> f64 {
    DEFAULT_SWEEP_END
}

fn default_sweep_step() -> f64 {
    DEFAULT_SWEEP_STEP
}

fn default_sweep_delay() -> f64 {
    DEFAULT_SWEEP_DELAY
}

/// A decoded client request
///
/// Servo indices travel as signed integers so that a negative index is
/// reported as out of range rather than as a malformed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Ping,
    Set {
        servo: i64,
        angle: f64,
    },
    /// Keys are decimal servo indices; JSON object keys are always strings
    SetMultiple {
        angles: BTreeMap<String, f64>,
    },
    SetAll {
        angle: f64,
    },
    Center,
    Release {
        servo: i64,
    },
    ReleaseAll,
    Get {
        servo: i64,
    },
    Sweep {
        servo: i64,
        #[serde(default = "default_sweep_start")]
        start: f64,
        #[serde(default = "default_sweep_end")]
        end: f64,
        #[serde(default = "default_sweep_step")]
        step: f64,
        #[serde(default = "default_sweep_delay")]
        delay: f64,
    },
    /// Recalibrates one servo, or every servo when `servo` is absent
    SetPulseRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        servo: Option<i64>,
        min: u16,
        max: u16,
    },
    Info,
}

impl Command {
    /// Every `cmd` tag the server understands
    pub const NAMES: &'static [&'static str] = &[
        "ping",
        "set",
        "set_multiple",
        "set_all",
        "center",
        "release",
        "release_all",
        "get",
        "sweep",
        "set_pulse_range",
        "info",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Set { .. } => "set",
            Command::SetMultiple { .. } => "set_multiple",
            Command::SetAll { .. } => "set_all",
            Command::Center => "center",
            Command::Release { .. } => "release",
            Command::ReleaseAll => "release_all",
            Command::Get { .. } => "get",
            Command::Sweep { .. } => "sweep",
            Command::SetPulseRange { .. } => "set_pulse_range",
            Command::Info => "info",
        }
    }

    /// Builds a `set_multiple` request from `(servo, angle)` pairs
    pub fn set_multiple<I>(angles: I) -> Self
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        Command::SetMultiple {
            angles: angles
                .into_iter()
                .map(|(servo, angle)| (servo.to_string(), angle))
                .collect(),
        }
    }

    /// Builds a `sweep` request using the protocol defaults
    pub fn sweep(servo: i64) -> Self {
        Command::Sweep {
            servo,
            start: DEFAULT_SWEEP_START,
            end: DEFAULT_SWEEP_END,
            step: DEFAULT_SWEEP_STEP,
            delay: DEFAULT_SWEEP_DELAY,
        }
    }

    /// Decodes one request line
    ///
    /// The tag is checked before the full schema so that an unknown command
    /// and a known command with bad fields produce distinct messages.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let tag = match object.get("cmd") {
            None | Some(Value::Null) => return Err(ProtocolError::MissingField("cmd".to_string())),
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => {
                return Err(ProtocolError::InvalidField {
                    field: "cmd".to_string(),
                    expected: "a string".to_string(),
                })
            }
        };

        if !Self::NAMES.contains(&tag.as_str()) {
            return Err(ProtocolError::UnknownCommand(tag));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidParameters {
            command: tag,
            detail: e.to_string(),
        })
    }

    /// Encodes the request as a newline-terminated line
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

/// A server reply: a status plus command-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Fallback for `Response::to_line`; serde_json does not fail on a map of
/// `Value`s, so this only keeps encoding infallible without a panic path
const ENCODE_FAILURE_LINE: &str = "{\"status\":\"error\",\"message\":\"Response encoding failed\"}\n";

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            fields: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(Status::Error).with("message", message.into())
    }

    fn with_status(status: Status) -> Self {
        Self {
            status,
            fields: Map::new(),
        }
    }

    /// Adds a payload field, replacing any previous value under `key`
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn message(&self) -> Option<&str> {
        self.get("message").and_then(Value::as_str)
    }

    /// Angle payload; `None` both when absent and when the servo is released
    pub fn angle(&self) -> Option<f64> {
        self.get("angle").and_then(Value::as_f64)
    }

    /// Encodes the response as a newline-terminated line
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(_) => ENCODE_FAILURE_LINE.to_string(),
        }
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

impl From<ProtocolError> for Response {
    fn from(error: ProtocolError) -> Self {
        Response::error(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_decode_unit_commands() {
        assert_eq!(Command::decode(r#"{"cmd":"ping"}"#), Ok(Command::Ping));
        assert_eq!(Command::decode(r#"{"cmd":"center"}"#), Ok(Command::Center));
        assert_eq!(
            Command::decode(r#"{"cmd":"release_all"}"#),
            Ok(Command::ReleaseAll)
        );
        assert_eq!(Command::decode(r#"{"cmd":"info"}"#), Ok(Command::Info));
    }

    #[test]
    fn test_decode_set_accepts_integer_angle() {
        let command = Command::decode(r#"{"cmd":"set","servo":3,"angle":90}"#).unwrap();
        match command {
            Command::Set { servo, angle } => {
                assert_eq!(servo, 3);
                assert_approx_eq!(angle, 90.0);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_negative_servo_is_not_a_protocol_error() {
        let command = Command::decode(r#"{"cmd":"get","servo":-1}"#).unwrap();
        assert_eq!(command, Command::Get { servo: -1 });
    }

    #[test]
    fn test_decode_sweep_defaults() {
        let command = Command::decode(r#"{"cmd":"sweep","servo":0}"#).unwrap();
        assert_eq!(command, Command::sweep(0));

        let command =
            Command::decode(r#"{"cmd":"sweep","servo":2,"start":10,"end":0,"step":5}"#).unwrap();
        match command {
            Command::Sweep {
                servo,
                start,
                end,
                step,
                delay,
            } => {
                assert_eq!(servo, 2);
                assert_approx_eq!(start, 10.0);
                assert_approx_eq!(end, 0.0);
                assert_approx_eq!(step, 5.0);
                assert_approx_eq!(delay, DEFAULT_SWEEP_DELAY);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_set_multiple_keeps_string_keys() {
        let command =
            Command::decode(r#"{"cmd":"set_multiple","angles":{"0":45,"99":10,"x":1}}"#).unwrap();
        match command {
            Command::SetMultiple { angles } => {
                assert_eq!(angles.len(), 3);
                assert_approx_eq!(angles["0"], 45.0);
                assert!(angles.contains_key("x"));
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_pulse_range_optional_servo() {
        assert_eq!(
            Command::decode(r#"{"cmd":"set_pulse_range","min":1000,"max":2000}"#),
            Ok(Command::SetPulseRange {
                servo: None,
                min: 1000,
                max: 2000
            })
        );
        assert_eq!(
            Command::decode(r#"{"cmd":"set_pulse_range","servo":4,"min":600,"max":2400}"#),
            Ok(Command::SetPulseRange {
                servo: Some(4),
                min: 600,
                max: 2400
            })
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Command::decode("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert_eq!(Command::decode("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_eq!(
            Command::decode(r#"{"servo":1}"#),
            Err(ProtocolError::MissingField("cmd".to_string()))
        );
        assert!(matches!(
            Command::decode(r#"{"cmd":7}"#),
            Err(ProtocolError::InvalidField { .. })
        ));
        assert_eq!(
            Command::decode(r#"{"cmd":"dance"}"#),
            Err(ProtocolError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_decode_bad_fields_name_the_command() {
        let error = Command::decode(r#"{"cmd":"set","servo":1}"#).unwrap_err();
        match &error {
            ProtocolError::InvalidParameters { command, detail } => {
                assert_eq!(command, "set");
                assert!(detail.contains("angle"), "detail was {}", detail);
            }
            other => panic!("Unexpected error: {:?}", other),
        }

        let error = Command::decode(r#"{"cmd":"set","servo":"one","angle":1}"#).unwrap_err();
        assert!(error.to_string().starts_with("Invalid parameters for 'set'"));
    }

    #[test]
    fn test_every_name_decodes_to_its_own_variant() {
        let samples = [
            r#"{"cmd":"ping"}"#,
            r#"{"cmd":"set","servo":0,"angle":1}"#,
            r#"{"cmd":"set_multiple","angles":{}}"#,
            r#"{"cmd":"set_all","angle":1}"#,
            r#"{"cmd":"center"}"#,
            r#"{"cmd":"release","servo":0}"#,
            r#"{"cmd":"release_all"}"#,
            r#"{"cmd":"get","servo":0}"#,
            r#"{"cmd":"sweep","servo":0}"#,
            r#"{"cmd":"set_pulse_range","min":1,"max":2}"#,
            r#"{"cmd":"info"}"#,
        ];
        assert_eq!(samples.len(), Command::NAMES.len());

        for (sample, name) in samples.iter().zip(Command::NAMES) {
            let command = Command::decode(sample).unwrap();
            assert_eq!(command.name(), *name);
        }
    }

    #[test]
    fn test_command_line_is_newline_terminated() {
        let line = Command::Ping.to_line().unwrap();
        assert_eq!(line, "{\"cmd\":\"ping\"}\n");

        let line = Command::set_multiple(vec![(0, 45.0), (12, 90.0)])
            .to_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("\"12\":90.0"));
    }

    #[test]
    fn test_response_encoding() {
        let line = Response::ok().with("message", "pong").to_line();
        assert_eq!(line, "{\"status\":\"ok\",\"message\":\"pong\"}\n");

        let line = Response::error("Unknown command: dance").to_line();
        assert_eq!(
            line,
            "{\"status\":\"error\",\"message\":\"Unknown command: dance\"}\n"
        );
    }

    #[test]
    fn test_response_decode_and_accessors() {
        let response = Response::decode(r#"{"status":"ok","servo":3,"angle":45.5}"#).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.get("servo").and_then(Value::as_i64), Some(3));
        assert_approx_eq!(response.angle().unwrap(), 45.5);

        let released = Response::decode(r#"{"status":"ok","servo":3,"angle":null}"#).unwrap();
        assert_eq!(released.angle(), None);
        assert_eq!(released.get("angle"), Some(&Value::Null));

        let error = Response::decode(r#"{"status":"error","message":"boom"}"#).unwrap();
        assert!(!error.is_ok());
        assert_eq!(error.message(), Some("boom"));
    }

    #[test]
    fn test_protocol_error_converts_to_error_response() {
        let response: Response = ProtocolError::UnknownCommand("x".to_string()).into();
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.message(), Some("Unknown command: x"));
    }
}
