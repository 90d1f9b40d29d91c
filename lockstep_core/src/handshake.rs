//! Token handshake with the microcontroller.
//!
//! Every exchange sends the last verified token; the peer must answer with
//! the token incremented by one (mod 2^32) and a SUCCESS status. Anything else
//! moves the handshake to ERROR and the caller zeroes both outputs. ERROR is
//! latched: there is no automatic retry and only [`Handshake::arm`] leaves it.

use lockstep_traits::{BusPeer, Request, Response, Status};

use crate::error::HandshakeError;
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Default)]
pub struct Handshake {
    state: Status,
    token: u32,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub const fn state(&self) -> Status {
        self.state
    }

    /// Last verified token (0 after arm or reset).
    #[inline]
    pub const fn token(&self) -> u32 {
        self.token
    }

    /// Any state to INITIAL; the next exchange presents token 0.
    pub fn arm(&mut self) {
        self.state = Status::Initial;
        self.token = 0;
    }

    /// Any state to NOP; no exchange is attempted while idle.
    pub fn disarm(&mut self) {
        self.state = Status::Nop;
    }

    /// Forget the stored token without changing the state.
    pub fn reset_token(&mut self) {
        self.token = 0;
    }

    /// Perform one request/response exchange with `peer`.
    pub fn exchange<P: BusPeer + ?Sized>(
        &mut self,
        peer: &mut P,
    ) -> Result<Response, HandshakeError> {
        match self.state {
            Status::Nop => return Err(HandshakeError::Idle),
            Status::Error => return Err(HandshakeError::Latched),
            Status::Initial => self.token = 0,
            Status::Success => {}
        }
        let sent = self.token;
        let request = Request {
            token: sent,
            status: self.state,
        };
        tracing::debug!(token = sent, status = %self.state, "exchange");

        let response = match peer.exchange(request) {
            Ok(r) => r,
            Err(e) => {
                self.state = Status::Error;
                return Err(HandshakeError::Transport(map_hw_error(&*e)));
            }
        };

        if response.token == sent.wrapping_add(1) && response.status == Status::Success {
            self.state = Status::Success;
            self.token = response.token;
            Ok(response)
        } else {
            self.state = Status::Error;
            Err(HandshakeError::Desync {
                sent,
                received: response.token,
                status: response.status,
            })
        }
    }
}
