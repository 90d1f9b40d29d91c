use lockstep_traits::{Axis, Status};
use thiserror::Error;

/// Typed failure of a collaborator (peer, sink, tick source).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for peer")]
    Timeout,
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("motor sink failed on axis {axis}: {reason}")]
    Sink { axis: Axis, reason: String },
    #[error("invalid state: {0}")]
    State(String),
}

/// Why a tick's exchange did not verify.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("handshake idle: exchange attempted while NOP")]
    Idle,
    #[error("handshake latched in ERROR: re-arm to resume")]
    Latched,
    #[error("transport failure: {0}")]
    Transport(SyncError),
    #[error("protocol desync: sent token {sent:X}, received {received:X} with status {status}")]
    Desync {
        sent: u32,
        received: u32,
        status: Status,
    },
}

/// A command that could not be parsed or would leave the parameters invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("configuration rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
