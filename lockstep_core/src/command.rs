//! Operator commands and their text form.
//!
//! ```text
//! start | stop | reset | shutdown
//! velocity <a|b> <rpm>
//! relation <rpm>
//! limit <a|b> <value>
//! gain <value>
//! closed-loop <on|off>
//! simultaneous <on|off>
//! ```

use std::fmt;
use std::str::FromStr;

use lockstep_traits::Axis;

use crate::error::CommandError;
use crate::fixed_point::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Arm the handshake and start integrating the setpoint.
    Start,
    /// Disarm, stop integrating, clear histories and zero the outputs.
    Stop,
    /// Zero token, positions, targets, windows and speeds; open the loop.
    Reset,
    /// Disarm and zero the outputs, then end the session.
    Shutdown,
    SetVelocity(Axis, Decimal),
    SetOutputRelation(Decimal),
    SetLimit(Axis, Decimal),
    SetGain(Decimal),
    SetClosedLoop(bool),
    SetSimultaneous(bool),
}

fn rejected(msg: impl Into<String>) -> CommandError {
    CommandError::Rejected(msg.into())
}

fn parse_axis(s: &str) -> Result<Axis, CommandError> {
    match s.to_ascii_lowercase().as_str() {
        "a" => Ok(Axis::A),
        "b" => Ok(Axis::B),
        other => Err(rejected(format!("unknown axis {other:?} (expected a or b)"))),
    }
}

fn parse_switch(s: &str) -> Result<bool, CommandError> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(rejected(format!("expected on/off, got {other:?}"))),
    }
}

fn parse_value(s: &str) -> Result<Decimal, CommandError> {
    s.parse::<Decimal>().map_err(|e| rejected(e.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, args)) = words.split_first() else {
            return Err(rejected("empty command"));
        };
        let cmd = match (verb.to_ascii_lowercase().as_str(), args) {
            ("start", []) => Self::Start,
            ("stop", []) => Self::Stop,
            ("reset", []) => Self::Reset,
            ("shutdown", []) => Self::Shutdown,
            ("velocity", [axis, rpm]) => Self::SetVelocity(parse_axis(axis)?, parse_value(rpm)?),
            ("relation", [rpm]) => Self::SetOutputRelation(parse_value(rpm)?),
            ("limit", [axis, v]) => Self::SetLimit(parse_axis(axis)?, parse_value(v)?),
            ("gain", [v]) => Self::SetGain(parse_value(v)?),
            ("closed-loop", [v]) => Self::SetClosedLoop(parse_switch(v)?),
            ("simultaneous", [v]) => Self::SetSimultaneous(parse_switch(v)?),
            (v, _) => return Err(rejected(format!("cannot parse command {v:?} {args:?}"))),
        };
        Ok(cmd)
    }
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Reset => f.write_str("reset"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::SetVelocity(axis, v) => {
                write!(f, "velocity {} {v}", axis.to_string().to_lowercase())
            }
            Self::SetOutputRelation(v) => write!(f, "relation {v}"),
            Self::SetLimit(axis, v) => write!(f, "limit {} {v}", axis.to_string().to_lowercase()),
            Self::SetGain(v) => write!(f, "gain {v}"),
            Self::SetClosedLoop(v) => write!(f, "closed-loop {}", on_off(*v)),
            Self::SetSimultaneous(v) => write!(f, "simultaneous {}", on_off(*v)),
        }
    }
}
