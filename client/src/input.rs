//! Interactive command line for driving servos by hand

use crate::network::{ClientError, ServoClient};
use log::warn;
use shared::Command;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const HELP: &str = "\
Commands:
  set <servo> <angle>   move one servo
  all <angle>           move every servo
  center                move every servo to 90
  sweep <servo>         sweep one servo 0 to 180
  get <servo>           show a servo's angle
  release [servo]       stop driving one servo, or all of them
  ping                  check the connection
  info                  show the server's layout
  help                  show this text
  quit                  exit";

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Send(Command),
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

fn servo_arg(arg: Option<&str>, usage: &'static str) -> Result<i64, InputError> {
    let arg = arg.ok_or(InputError::Usage(usage))?;
    arg.parse()
        .map_err(|_| InputError::InvalidNumber(arg.to_string()))
}

fn angle_arg(arg: Option<&str>, usage: &'static str) -> Result<f64, InputError> {
    let arg = arg.ok_or(InputError::Usage(usage))?;
    arg.parse()
        .map_err(|_| InputError::InvalidNumber(arg.to_string()))
}

/// Parses one line typed by the user
pub fn parse_line(line: &str) -> Result<InputAction, InputError> {
    let mut words = line.split_whitespace();
    let Some(keyword) = words.next() else {
        return Ok(InputAction::Empty);
    };

    let command = match keyword.to_lowercase().as_str() {
        "quit" | "exit" | "q" => return Ok(InputAction::Quit),
        "help" | "?" => return Ok(InputAction::Help),
        "ping" => Command::Ping,
        "info" => Command::Info,
        "center" => Command::Center,
        "set" => {
            const USAGE: &str = "set <servo> <angle>";
            Command::Set {
                servo: servo_arg(words.next(), USAGE)?,
                angle: angle_arg(words.next(), USAGE)?,
            }
        }
        "all" => Command::SetAll {
            angle: angle_arg(words.next(), "all <angle>")?,
        },
        "sweep" => Command::sweep(servo_arg(words.next(), "sweep <servo>")?),
        "get" => Command::Get {
            servo: servo_arg(words.next(), "get <servo>")?,
        },
        "release" => match words.next() {
            Some(arg) => Command::Release {
                servo: servo_arg(Some(arg), "release [servo]")?,
            },
            None => Command::ReleaseAll,
        },
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };

    Ok(InputAction::Send(command))
}

/// Reads commands from stdin until `quit` or end of input
pub async fn run_interactive(client: &mut ServoClient) -> Result<(), ClientError> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Connected. Type 'help' for commands.");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            Ok(InputAction::Empty) => {}
            Ok(InputAction::Help) => println!("{}", HELP),
            Ok(InputAction::Quit) => break,
            Ok(InputAction::Send(command)) => {
                let response = client.request(&command).await?;
                if !response.is_ok() {
                    warn!("{} failed", command.name());
                }
                println!("{}", response.to_line().trim_end());
            }
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse_line("set 3 45.5"),
            Ok(InputAction::Send(Command::Set {
                servo: 3,
                angle: 45.5
            }))
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_line(""), Ok(InputAction::Empty));
        assert_eq!(parse_line("   "), Ok(InputAction::Empty));
        assert_eq!(parse_line("quit"), Ok(InputAction::Quit));
        assert_eq!(parse_line("EXIT"), Ok(InputAction::Quit));
        assert_eq!(parse_line("help"), Ok(InputAction::Help));
        assert_eq!(parse_line("center"), Ok(InputAction::Send(Command::Center)));
        assert_eq!(parse_line("ping"), Ok(InputAction::Send(Command::Ping)));
    }

    #[test]
    fn test_parse_release_with_and_without_servo() {
        assert_eq!(
            parse_line("release"),
            Ok(InputAction::Send(Command::ReleaseAll))
        );
        assert_eq!(
            parse_line("release 7"),
            Ok(InputAction::Send(Command::Release { servo: 7 }))
        );
    }

    #[test]
    fn test_parse_sweep_uses_defaults() {
        assert_eq!(
            parse_line("sweep 2"),
            Ok(InputAction::Send(Command::sweep(2)))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_line("fly 3"),
            Err(InputError::UnknownCommand("fly".to_string()))
        );
        assert_eq!(
            parse_line("set 3"),
            Err(InputError::Usage("set <servo> <angle>"))
        );
        assert_eq!(
            parse_line("all high"),
            Err(InputError::InvalidNumber("high".to_string()))
        );
        assert_eq!(
            parse_line("get 1.5"),
            Err(InputError::InvalidNumber("1.5".to_string()))
        );
    }
}
