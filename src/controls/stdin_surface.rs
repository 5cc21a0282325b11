//! Line-oriented control surface on stdin.
//!
//! Accepts one message per line, either as JSON
//! (`{"status":176,"control":36,"value":64}`) or as a short command:
//!
//! ```text
//! cc 36 64        control change
//! note 40 127     note on
//! set FoM 30      direct assignment
//! ```
//!
//! Malformed lines, including ones that are not valid UTF-8, are logged and
//! skipped.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::surface::{ControlMessage, ControlSurface, DeviceError};
use crate::types::ControlVariable;

#[derive(Debug, Deserialize)]
struct RawMessage {
    status: u8,
    control: u8,
    value: u8,
}

/// Parse one input line. `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<ControlMessage>, DeviceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if line.starts_with('{') {
        let raw: RawMessage =
            serde_json::from_str(line).map_err(|e| DeviceError::Malformed(e.to_string()))?;
        return ControlMessage::from_raw(raw.status, raw.control, raw.value)
            .map(Some)
            .ok_or_else(|| DeviceError::Malformed(format!("unsupported status {}", raw.status)));
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let message = match fields.as_slice() {
        [cmd, control, value] if cmd.eq_ignore_ascii_case("cc") => ControlMessage::ControlChange {
            control: parse_u7(control)?,
            value: parse_u7(value)?,
        },
        [cmd, note, velocity] if cmd.eq_ignore_ascii_case("note") => ControlMessage::NoteOn {
            note: parse_u7(note)?,
            velocity: parse_u7(velocity)?,
        },
        [cmd, name, value] if cmd.eq_ignore_ascii_case("set") => ControlMessage::Set {
            variable: name
                .parse::<ControlVariable>()
                .map_err(|e| DeviceError::Malformed(e.to_string()))?,
            value: value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DeviceError::Malformed(format!("bad value '{value}'")))?,
        },
        _ => return Err(DeviceError::Malformed(format!("unrecognised line '{line}'"))),
    };
    Ok(Some(message))
}

fn parse_u7(field: &str) -> Result<u8, DeviceError> {
    field
        .parse::<u8>()
        .ok()
        .filter(|v| *v <= 127)
        .ok_or_else(|| DeviceError::Malformed(format!("expected 0-127, got '{field}'")))
}

/// Reads control messages from any line source (stdin by default).
pub struct StdinSurface<R = BufReader<tokio::io::Stdin>> {
    reader: R,
    line_buffer: Vec<u8>,
    skipped: u64,
}

impl StdinSurface {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl Default for StdinSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> StdinSurface<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line_buffer: Vec::with_capacity(128),
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[async_trait]
impl<R> ControlSurface for StdinSurface<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_message(&mut self) -> Result<Option<ControlMessage>, DeviceError> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_until(b'\n', &mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(None);
            }
            let parsed = std::str::from_utf8(&self.line_buffer)
                .map_err(|e| DeviceError::Malformed(format!("line is not UTF-8: {e}")))
                .and_then(parse_line);
            match parsed {
                Ok(Some(message)) => return Ok(Some(message)),
                Ok(None) => continue,
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("[StdinSurface] Skipping line: {}", e);
                }
            }
        }
    }

    fn surface_name(&self) -> &str {
        "stdin"
    }
}
