//! Runtime controller parameters.
//!
//! Changed only through [`crate::command::Command`]s applied between ticks.

use lockstep_traits::Axis;

use crate::fixed_point::{Decimal, Rounding};

/// Fractional digits of feed-forward and gain-per-pulse values.
pub const INTERNAL_SCALE: u32 = 6;
/// Fractional digits of a commanded output.
pub const OUTPUT_SCALE: u32 = 3;

/// Fractional digits kept from velocities and the output relation.
pub const RPM_SCALE: u32 = 2;
/// Fractional digits kept from the gain.
pub const GAIN_SCALE: u32 = 3;

/// Largest |velocity| and output relation accepted, in rpm.
pub const MAX_RPM: Decimal = Decimal::new(100_000, 0);
/// Largest gain accepted.
pub const MAX_GAIN: Decimal = Decimal::new(1_000, 0);
/// Outputs and limits never exceed this magnitude.
pub const FULL_OUTPUT: Decimal = Decimal::new(1_000, OUTPUT_SCALE);

/// Default pulses per revolution of the encoders.
pub const DEFAULT_WHEEL_STEPS: u32 = 6;

/// Default rpm mapped to full output (110.00).
pub const DEFAULT_OUTPUT_RELATION: Decimal = Decimal::new(11_000, 2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerParameters {
    /// Encoder pulses per revolution ("wheel steps"); never below 1.
    pub wheel_steps: u32,
    /// Proportional gain ("enhancement"), non-negative.
    pub gain: Decimal,
    /// Per-axis saturation limit, non-negative.
    pub limits: [Decimal; 2],
    pub closed_loop: bool,
    /// Commanded velocity per axis in rpm.
    pub velocity: [Decimal; 2],
    /// Rpm that maps to output 1.0; strictly positive.
    pub output_relation: Decimal,
    /// When set, a velocity command for one axis is applied to both.
    pub simultaneous: bool,
}

impl Default for ControllerParameters {
    fn default() -> Self {
        Self {
            wheel_steps: DEFAULT_WHEEL_STEPS,
            gain: Decimal::ZERO,
            limits: [Decimal::ZERO; 2],
            closed_loop: false,
            velocity: [Decimal::ZERO; 2],
            output_relation: DEFAULT_OUTPUT_RELATION,
            simultaneous: false,
        }
    }
}

impl ControllerParameters {
    /// Clamp wheel steps to at least one pulse per revolution.
    #[must_use]
    pub fn with_wheel_steps(mut self, wheel_steps: u32) -> Self {
        self.wheel_steps = wheel_steps.max(1);
        self
    }

    #[inline]
    pub fn limit(&self, axis: Axis) -> Decimal {
        self.limits[axis.index()]
    }

    #[inline]
    pub fn velocity(&self, axis: Axis) -> Decimal {
        self.velocity[axis.index()]
    }

    /// Open-loop output for `axis`: velocity / relation, truncated to six
    /// digits. Derived on demand so it always reflects the latest commands.
    pub fn feed_forward(&self, axis: Axis) -> Decimal {
        self.velocity(axis)
            .div(self.output_relation, INTERNAL_SCALE, Rounding::Down)
            .unwrap_or(Decimal::zero(INTERNAL_SCALE))
    }

    /// Truncate operator values toward zero to the digits the loop works
    /// with: velocities and relation to 2, gain and limits to 3.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for v in &mut self.velocity {
            *v = v.rescale(RPM_SCALE, Rounding::Down);
        }
        for l in &mut self.limits {
            *l = l.rescale(OUTPUT_SCALE, Rounding::Down);
        }
        self.output_relation = self.output_relation.rescale(RPM_SCALE, Rounding::Down);
        self.gain = self.gain.rescale(GAIN_SCALE, Rounding::Down);
        let wheel_steps = self.wheel_steps;
        self.with_wheel_steps(wheel_steps)
    }

    /// Reject values a command must never install.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.gain.is_negative() {
            return Err("gain must be >= 0");
        }
        if self.gain > MAX_GAIN {
            return Err("gain must be <= 1000");
        }
        if self.limits.iter().any(|l| l.is_negative()) {
            return Err("limits must be >= 0");
        }
        if self.limits.iter().any(|l| *l > FULL_OUTPUT) {
            return Err("limits must be <= 1");
        }
        if self.output_relation <= Decimal::ZERO {
            return Err("output relation must be > 0");
        }
        if self.output_relation > MAX_RPM {
            return Err("output relation must be <= 100000 rpm");
        }
        if self.velocity.iter().any(|v| v.abs() > MAX_RPM) {
            return Err("velocity must be within ±100000 rpm");
        }
        Ok(())
    }
}

/// Encoder pulses per second at 1 rpm: wheel steps / 60, six digits, toward zero.
pub fn rpm_const(wheel_steps: u32) -> Decimal {
    Decimal::from(wheel_steps.max(1))
        .div(Decimal::from_int(60), INTERNAL_SCALE, Rounding::Down)
        .unwrap_or(Decimal::zero(INTERNAL_SCALE))
}
