//! Newline framing for the byte stream carried by a connection
//!
//! Reads may deliver zero, one or several complete lines, or only part of
//! one. `LineFramer` keeps the unterminated tail between reads and hands out
//! complete lines one at a time.

use crate::{ProtocolError, MAX_LINE_BYTES};

/// Reassembles newline-delimited messages from arbitrary read chunks
///
/// Invariant: after `next_line` returns `None`, the buffer holds no `\n`.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line: usize,
    /// Set after an oversized line was reported, until its newline arrives
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Appends freshly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Takes the next complete line, without its terminator
    ///
    /// Blank lines are skipped and a trailing `\r` is removed. A line that is
    /// not UTF-8 or exceeds the limit yields an error for that line only;
    /// framing continues with the following line.
    pub fn next_line(&mut self) -> Option<Result<String, ProtocolError>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                return self.check_overflow();
            };

            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();

            if self.discarding {
                self.discarding = false;
                continue;
            }

            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.len() > self.max_line {
                return Some(Err(ProtocolError::LineTooLong {
                    limit: self.max_line,
                }));
            }

            match String::from_utf8(line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => return Some(Ok(text)),
                Err(e) => return Some(Err(ProtocolError::InvalidUtf8(e.to_string()))),
            }
        }
    }

    fn check_overflow(&mut self) -> Option<Result<String, ProtocolError>> {
        if self.discarding {
            self.buffer.clear();
            return None;
        }

        if self.buffer.len() > self.max_line {
            self.buffer.clear();
            self.discarding = true;
            return Some(Err(ProtocolError::LineTooLong {
                limit: self.max_line,
            }));
        }

        None
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
