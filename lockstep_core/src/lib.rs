#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Two-axis synchronization loop (hardware-agnostic).
//!
//! This crate keeps two motors in lockstep with a velocity setpoint. It is
//! clocked by an external microcontroller: every rising edge of its tick
//! signal runs one cycle, and every cycle starts with a token handshake over
//! the bus. All hardware interactions go through the traits in
//! `lockstep_traits` (`BusPeer`, `MotorSink`, `TickSource`, `Clock`).
//!
//! ## Architecture
//!
//! - **Handshake**: token state machine NOP / INITIAL / SUCCESS / ERROR (`handshake`)
//! - **Setpoint**: velocity × cycle time integrated into target pulses (`setpoint`)
//! - **Control**: saturating proportional position controller (`controller`)
//! - **Estimation**: sliding-window speed in rpm (`velocity`)
//! - **Orchestration**: per-tick sequence and commands (`coordinator`)
//! - **Threading**: worker thread fed by a command channel (`session`)
//!
//! ## Fixed-Point Arithmetic
//!
//! Everything inside the loop is exact decimal arithmetic with explicit
//! rounding (`fixed_point::Decimal`): cycle times at 6 digits, outputs at 3,
//! speeds at 2. The sink receives outputs as integer thousandths.

pub mod builder;
pub mod clock_source;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod coordinator;
pub mod error;
pub mod fixed_point;
pub mod handshake;
pub mod hw_error;
pub mod runtime;
pub mod sample;
pub mod session;
pub mod setpoint;
pub mod velocity;

pub use builder::{CoordinatorBuilder, NullDisplay};
pub use command::Command;
pub use config::ControllerParameters;
pub use controller::{AxisInput, ControlInput, ControlOutput, PositionController};
pub use coordinator::{CycleCoordinator, TickOutcome, TickReport};
pub use error::{BuildError, CommandError, HandshakeError, Result, SyncError};
pub use fixed_point::{Decimal, Rounding};
pub use handshake::Handshake;
pub use sample::{CycleSample, SampleSink};
pub use session::{Session, SessionCfg, SessionEnd, SessionHandle};
pub use lockstep_traits::{Axis, Edge, Status};
