//! Per-tick snapshots handed to the display.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use lockstep_traits::Axis;

use crate::config::OUTPUT_SCALE;
use crate::fixed_point::{Decimal, Rounding};
use crate::velocity::SPEED_SCALE;

/// Fractional digits of a displayed cycle time.
pub const DISPLAY_CYCLE_SCALE: u32 = 3;

/// Monotonic sample counter; after `i64::MAX` it wraps to 1, never to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickCounter(i64);

impl TickCounter {
    pub const fn starting_at(v: i64) -> Self {
        Self(v)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// Advance and return the new value.
    pub fn advance(&mut self) -> i64 {
        self.0 = self.0.checked_add(1).filter(|v| *v > 0).unwrap_or(1);
        self.0
    }
}

/// Immutable snapshot of one tick.
///
/// Equality, ordering and hashing use the counter alone.
#[derive(Debug, Clone)]
pub struct CycleSample {
    counter: i64,
    cycle_time: Decimal,
    token: u32,
    targets: [i64; 2],
    actuals: [i64; 2],
    outputs: [Decimal; 2],
    speeds: [Decimal; 2],
}

impl CycleSample {
    /// Cycle time is truncated to 3 digits, speeds are floored to 2.
    pub fn new(
        counter: i64,
        cycle_time: Decimal,
        token: u32,
        targets: [i64; 2],
        actuals: [i64; 2],
        outputs: [Decimal; 2],
        speeds: [Decimal; 2],
    ) -> Self {
        Self {
            counter,
            cycle_time: cycle_time.rescale(DISPLAY_CYCLE_SCALE, Rounding::Down),
            token,
            targets,
            actuals,
            outputs: outputs.map(|o| o.rescale(OUTPUT_SCALE, Rounding::Floor)),
            speeds: speeds.map(|s| s.rescale(SPEED_SCALE, Rounding::Floor)),
        }
    }

    pub const fn counter(&self) -> i64 {
        self.counter
    }

    /// Seconds since the previous tick, 3 digits.
    pub const fn cycle_time(&self) -> Decimal {
        self.cycle_time
    }

    pub const fn token(&self) -> u32 {
        self.token
    }

    /// Upper-case hex of the token, no prefix or padding.
    pub fn token_hex(&self) -> String {
        format!("{:X}", self.token)
    }

    pub const fn target(&self, axis: Axis) -> i64 {
        self.targets[axis.index()]
    }

    pub const fn actual(&self, axis: Axis) -> i64 {
        self.actuals[axis.index()]
    }

    pub const fn output(&self, axis: Axis) -> Decimal {
        self.outputs[axis.index()]
    }

    /// Estimated speed in rpm, 2 digits.
    pub const fn speed(&self, axis: Axis) -> Decimal {
        self.speeds[axis.index()]
    }
}

impl PartialEq for CycleSample {
    fn eq(&self, other: &Self) -> bool {
        self.counter == other.counter
    }
}

impl Eq for CycleSample {}

impl PartialOrd for CycleSample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CycleSample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter.cmp(&other.counter)
    }
}

impl Hash for CycleSample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.counter.hash(state);
    }
}

impl fmt::Display for CycleSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} dt={}s token={} A[target={} actual={} out={} rpm={}] B[target={} actual={} out={} rpm={}]",
            self.counter,
            self.cycle_time,
            self.token_hex(),
            self.targets[0],
            self.actuals[0],
            self.outputs[0],
            self.speeds[0],
            self.targets[1],
            self.actuals[1],
            self.outputs[1],
            self.speeds[1],
        )
    }
}

/// Receiver of per-tick snapshots (the display side of the loop).
pub trait SampleSink {
    fn publish(&mut self, sample: &CycleSample);
}

/// Forward snapshots over a channel; a disconnected receiver is ignored.
impl SampleSink for crossbeam_channel::Sender<CycleSample> {
    fn publish(&mut self, sample: &CycleSample) {
        let _ = self.try_send(sample.clone());
    }
}
