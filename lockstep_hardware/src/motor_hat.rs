//! Two-channel motor driver HAT: PCA9685 PWM controller feeding a TB6612 bridge.

use std::time::Duration;

use lockstep_traits::{Axis, BoxError, MotorSink};
use rppal::i2c::I2c;
use tracing::debug;

use crate::error::{HwError, Result};
use crate::util::{
    FULL, MODE1_AUTO_INC, MODE1_RESTART, MODE1_SLEEP, REG_MODE1, REG_PRESCALE, bridge_levels,
    channel_bytes, channel_register, duty_counts, pca9685_prescale,
};

/// PCA9685 channels (PWM, IN1, IN2) per axis.
const CHANNELS: [(u8, u8, u8); 2] = [(0, 1, 2), (5, 3, 4)];

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

pub struct MotorHat {
    i2c: I2c,
}

impl MotorHat {
    pub fn new(bus: u8, address: u16, pwm_hz: u32) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(i2c_err)?;
        i2c.set_slave_address(address).map_err(i2c_err)?;
        let mut hat = Self { i2c };
        hat.set_frequency(pwm_hz)?;
        hat.stop_all()?;
        Ok(hat)
    }

    fn set_frequency(&mut self, pwm_hz: u32) -> Result<()> {
        let prescale = pca9685_prescale(pwm_hz);
        debug!(pwm_hz, prescale, "pca9685 frequency");
        // prescale is only writable while asleep
        self.i2c
            .smbus_write_byte(REG_MODE1, MODE1_SLEEP)
            .map_err(i2c_err)?;
        self.i2c
            .smbus_write_byte(REG_PRESCALE, prescale)
            .map_err(i2c_err)?;
        self.i2c.smbus_write_byte(REG_MODE1, 0).map_err(i2c_err)?;
        std::thread::sleep(Duration::from_millis(5));
        self.i2c
            .smbus_write_byte(REG_MODE1, MODE1_RESTART | MODE1_AUTO_INC)
            .map_err(i2c_err)
    }

    fn write_channel(&mut self, channel: u8, bytes: [u8; 4]) -> Result<()> {
        self.i2c
            .block_write(channel_register(channel), &bytes)
            .map_err(i2c_err)
    }

    fn set_level(&mut self, channel: u8, high: bool) -> Result<()> {
        self.write_channel(channel, channel_bytes(if high { FULL } else { 0 }))
    }

    fn stop_all(&mut self) -> Result<()> {
        for axis in Axis::BOTH {
            self.drive(axis, 0)?;
        }
        Ok(())
    }

    fn drive(&mut self, axis: Axis, milli: i32) -> Result<()> {
        let (pwm, in1, in2) = CHANNELS[axis.index()];
        let (l1, l2) = bridge_levels(milli);
        self.write_channel(pwm, channel_bytes(duty_counts(milli)))?;
        self.set_level(in1, l1)?;
        self.set_level(in2, l2)
    }
}

impl MotorSink for MotorHat {
    fn set_output(&mut self, axis: Axis, milli: i32) -> std::result::Result<(), BoxError> {
        self.drive(axis, milli)?;
        Ok(())
    }
}
