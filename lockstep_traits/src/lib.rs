//! Collaborator traits and wire types shared by the lockstep crates.
//!
//! The control loop in `lockstep_core` talks to the outside world only
//! through the traits defined here, so it can run against real peripherals,
//! the simulators in `lockstep_hardware`, or test doubles.

pub mod bus;
pub mod clock;

pub use bus::{FrameError, REQUEST_LEN, RESPONSE_LEN, Request, Response, Status};
pub use clock::{Clock, MonotonicClock};

/// Boxed error used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One of the two synchronized motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    A,
    B,
}

impl Axis {
    pub const BOTH: [Self; 2] = [Self::A, Self::B];

    /// Slot of this axis in `[T; 2]` per-axis arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    #[inline]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::B => "B",
        })
    }
}

/// Signal transition reported by a [`TickSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Request/response partner on the bus (the microcontroller that clocks us).
pub trait BusPeer {
    /// Send one request frame and read back the response.
    ///
    /// Implementations enforce their own timeout and report it as an error.
    fn exchange(&mut self, request: Request) -> Result<Response, BoxError>;
}

/// Motor driver receiving one output per axis.
pub trait MotorSink {
    /// Command `milli` thousandths of full output (-1000..=1000) on `axis`.
    fn set_output(&mut self, axis: Axis, milli: i32) -> Result<(), BoxError>;

    /// Command zero on both axes, attempting both even if the first fails.
    fn stop(&mut self) -> Result<(), BoxError> {
        let a = self.set_output(Axis::A, 0);
        let b = self.set_output(Axis::B, 0);
        a.and(b)
    }
}

/// Source of the external tick signal.
pub trait TickSource {
    /// Block until the next edge or until `timeout` elapses (`Ok(None)`).
    fn wait_edge(&mut self, timeout: std::time::Duration) -> Result<Option<Edge>, BoxError>;
}

impl<T: BusPeer + ?Sized> BusPeer for Box<T> {
    fn exchange(&mut self, request: Request) -> Result<Response, BoxError> {
        (**self).exchange(request)
    }
}

impl<T: MotorSink + ?Sized> MotorSink for Box<T> {
    fn set_output(&mut self, axis: Axis, milli: i32) -> Result<(), BoxError> {
        (**self).set_output(axis, milli)
    }
}

impl<T: TickSource + ?Sized> TickSource for Box<T> {
    fn wait_edge(&mut self, timeout: std::time::Duration) -> Result<Option<Edge>, BoxError> {
        (**self).wait_edge(timeout)
    }
}
