//! Microcontroller peer on the I2C bus.

use std::time::Duration;

use lockstep_traits::{BoxError, BusPeer, RESPONSE_LEN, Request, Response};
use rppal::i2c::I2c;
use tracing::trace;

use crate::error::{HwError, Result};

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    match e {
        rppal::i2c::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => HwError::Timeout,
        other => HwError::I2c(other.to_string()),
    }
}

pub struct I2cPeer {
    i2c: I2c,
}

impl I2cPeer {
    pub fn new(bus: u8, address: u16, timeout: Duration) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(i2c_err)?;
        i2c.set_slave_address(address).map_err(i2c_err)?;
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        i2c.set_timeout(ms).map_err(i2c_err)?;
        Ok(Self { i2c })
    }
}

impl BusPeer for I2cPeer {
    fn exchange(&mut self, request: Request) -> std::result::Result<Response, BoxError> {
        self.i2c.write(&request.encode()).map_err(i2c_err)?;
        let mut buf = [0u8; RESPONSE_LEN];
        let n = self.i2c.read(&mut buf).map_err(i2c_err)?;
        trace!(bytes = n, "i2c response");
        Response::decode(&buf[..n])
            .map_err(|e| Box::new(HwError::Frame(e.to_string())) as BoxError)
    }
}
