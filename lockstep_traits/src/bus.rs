//! Handshake frames exchanged with the microcontroller.
//!
//! Request: token (u32 BE) + status byte = 5 bytes.
//! Response: token (u32 BE), status byte, value, pulses A, pulses B
//! (each i32 BE) = 17 bytes.

use crate::Axis;
use std::fmt;

pub const REQUEST_LEN: usize = 5;
pub const RESPONSE_LEN: usize = 17;

/// Handshake state as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Idle; no exchange is attempted.
    #[default]
    Nop,
    /// Armed; the next exchange presents token 0.
    Initial,
    Success,
    Error,
}

impl Status {
    #[inline]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Nop => 0,
            Self::Initial => 1,
            Self::Success => 2,
            Self::Error => 3,
        }
    }

    #[inline]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Nop),
            1 => Some(Self::Initial),
            2 => Some(Self::Success),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nop => "NOP",
            Self::Initial => "INITIAL",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub token: u32,
    pub status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub token: u32,
    pub status: Status,
    /// Auxiliary reading reported by the peer; carried but unused by the loop.
    pub value: i32,
    /// Raw encoder total for axis A.
    pub pulses_a: i32,
    /// Raw encoder total for axis B.
    pub pulses_b: i32,
}

impl Response {
    #[inline]
    pub const fn pulses(&self, axis: Axis) -> i32 {
        match axis {
            Axis::A => self.pulses_a,
            Axis::B => self.pulses_b,
        }
    }
}

/// Malformed frame on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Short { expected: usize, got: usize },
    UnknownStatus(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short { expected, got } => {
                write!(f, "short frame: expected {expected} bytes, got {got}")
            }
            Self::UnknownStatus(b) => write!(f, "unknown status byte 0x{b:02X}"),
        }
    }
}

impl std::error::Error for FrameError {}

fn word(buf: &[u8], at: usize) -> [u8; 4] {
    [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::Short {
            expected,
            got: buf.len(),
        });
    }
    Ok(())
}

impl Request {
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut out = [0u8; REQUEST_LEN];
        out[..4].copy_from_slice(&self.token.to_be_bytes());
        out[4] = self.status.as_byte();
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        check_len(buf, REQUEST_LEN)?;
        let status = Status::from_byte(buf[4]).ok_or(FrameError::UnknownStatus(buf[4]))?;
        Ok(Self {
            token: u32::from_be_bytes(word(buf, 0)),
            status,
        })
    }
}

impl Response {
    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let mut out = [0u8; RESPONSE_LEN];
        out[..4].copy_from_slice(&self.token.to_be_bytes());
        out[4] = self.status.as_byte();
        out[5..9].copy_from_slice(&self.value.to_be_bytes());
        out[9..13].copy_from_slice(&self.pulses_a.to_be_bytes());
        out[13..17].copy_from_slice(&self.pulses_b.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        check_len(buf, RESPONSE_LEN)?;
        let status = Status::from_byte(buf[4]).ok_or(FrameError::UnknownStatus(buf[4]))?;
        Ok(Self {
            token: u32::from_be_bytes(word(buf, 0)),
            status,
            value: i32::from_be_bytes(word(buf, 5)),
            pulses_a: i32::from_be_bytes(word(buf, 9)),
            pulses_b: i32::from_be_bytes(word(buf, 13)),
        })
    }
}
