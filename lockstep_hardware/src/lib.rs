//! Peripherals for the synchronization loop.
//!
//! Simulated peer, sink and tick source are always available; the real
//! I2C peer, motor HAT and GPIO tick pin need the `hardware` feature (Linux).

pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod i2c_peer;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod motor_hat;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod tick_pin;

pub use error::HwError;
pub use sim::{SimFaults, SimPlant, SimulatedPeer, SimulatedSink, SimulatedTicker};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use i2c_peer::I2cPeer;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use motor_hat::MotorHat;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use tick_pin::TickPin;
