//! Line-oriented operator console.
//!
//! Parses one command per line into an [`AppCommand`] and renders the
//! reply.  The binary feeds it from stdin; anything that can produce
//! lines (a serial port, a socket) can reuse it.
//!
//! ```text
//! phase <colonization|pinning|fruiting>
//! fog <seconds>
//! status
//! ```

use std::time::Duration;

use crate::app::commands::{AppCommand, CommandReply};
use crate::model::GrowthPhase;

/// Longest manual fogger pulse accepted from the console.
pub const MAX_PULSE_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidArgument(String),
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::UnknownCommand(c) => write!(f, "unknown command '{c}' (phase, fog, status)"),
            Self::MissingArgument(what) => write!(f, "missing {what}"),
            Self::InvalidArgument(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub fn parse_command(line: &str) -> Result<AppCommand, ParseError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(ParseError::Empty)?;

    match verb.to_ascii_lowercase().as_str() {
        "phase" => {
            let name = words.next().ok_or(ParseError::MissingArgument("phase name"))?;
            let phase: GrowthPhase = name
                .parse()
                .map_err(|e: crate::error::ConfigError| ParseError::InvalidArgument(e.to_string()))?;
            Ok(AppCommand::SetPhase(phase))
        }
        "fog" => {
            let secs = words.next().ok_or(ParseError::MissingArgument("seconds"))?;
            let secs: u64 = secs
                .parse()
                .map_err(|_| ParseError::InvalidArgument(format!("'{secs}' is not a number")))?;
            if !(1..=MAX_PULSE_SECS).contains(&secs) {
                return Err(ParseError::InvalidArgument(format!(
                    "pulse must be 1–{MAX_PULSE_SECS}s"
                )));
            }
            Ok(AppCommand::PulseFogger(Duration::from_secs(secs)))
        }
        "status" => Ok(AppCommand::RequestSnapshot),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// One-line rendering of a reply.
pub fn render_reply(reply: &CommandReply) -> String {
    match reply {
        CommandReply::PhaseChanged(phase) => format!("phase set to {phase}"),
        CommandReply::Actuators(a) => format!(
            "fogger={} fan={}% lights={}",
            a.fogger_active, a.fan_speed_percent, a.lights_active
        ),
        CommandReply::Snapshot(None) => "no reading yet".to_string(),
        CommandReply::Snapshot(Some(update)) => serde_json::to_string(update)
            .unwrap_or_else(|e| format!("snapshot not serializable: {e}")),
    }
}
