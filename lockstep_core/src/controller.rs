//! Saturating proportional position controller.
//!
//! Per axis:
//! - error = target - actual (pulses)
//! - gain per pulse = gain / wheel steps, 6 digits, rounded up
//! - correction = error × gain per pulse, half-up to 3 digits
//! - raw = feed-forward + correction, clamped to ±limit when |raw| > |limit|
//!   (a zero sign clamps to +limit); the limit is first truncated to 3 digits
//!   so flooring the output cannot step past it
//! - output = raw floored to 3 digits
//!
//! `compute` is pure; identical inputs give identical outputs.

use lockstep_traits::Axis;

use crate::config::{INTERNAL_SCALE, OUTPUT_SCALE};
use crate::fixed_point::{Decimal, Rounding};

/// One axis' inputs to [`PositionController::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisInput {
    pub target: i64,
    pub actual: i64,
    pub feed_forward: Decimal,
    pub limit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlInput {
    pub a: AxisInput,
    pub b: AxisInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlOutput {
    pub delta_a: i64,
    pub delta_b: i64,
    pub correction_a: Decimal,
    pub correction_b: Decimal,
    pub output_a: Decimal,
    pub output_b: Decimal,
}

impl ControlOutput {
    #[inline]
    pub const fn output(&self, axis: Axis) -> Decimal {
        match axis {
            Axis::A => self.output_a,
            Axis::B => self.output_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionController {
    gain: Decimal,
    wheel_steps: u32,
}

impl PositionController {
    pub fn new(gain: Decimal, wheel_steps: u32) -> Self {
        Self {
            gain,
            wheel_steps: wheel_steps.max(1),
        }
    }

    pub fn set_gain(&mut self, gain: Decimal) {
        self.gain = gain;
    }

    #[inline]
    pub const fn gain(&self) -> Decimal {
        self.gain
    }

    #[inline]
    pub const fn wheel_steps(&self) -> u32 {
        self.wheel_steps
    }

    fn gain_per_pulse(&self) -> Decimal {
        self.gain
            .div(
                Decimal::from(self.wheel_steps),
                INTERNAL_SCALE,
                Rounding::Ceiling,
            )
            .unwrap_or(Decimal::zero(INTERNAL_SCALE))
    }

    fn axis(p: Decimal, input: &AxisInput) -> (i64, Decimal, Decimal) {
        let delta = input.target.saturating_sub(input.actual);
        let correction = (Decimal::from_int(delta) * p).rescale(OUTPUT_SCALE, Rounding::HalfUp);
        let raw = input.feed_forward + correction;
        let limit = input.limit.abs().rescale(OUTPUT_SCALE, Rounding::Down);
        let clamped = if raw.abs() > limit {
            if raw.is_negative() { -limit } else { limit }
        } else {
            raw
        };
        (
            delta,
            correction,
            clamped.rescale(OUTPUT_SCALE, Rounding::Floor),
        )
    }

    pub fn compute(&self, input: &ControlInput) -> ControlOutput {
        let p = self.gain_per_pulse();
        let (delta_a, correction_a, output_a) = Self::axis(p, &input.a);
        let (delta_b, correction_b, output_b) = Self::axis(p, &input.b);
        tracing::trace!(
            %p,
            delta_a,
            delta_b,
            %correction_a,
            %correction_b,
            %output_a,
            %output_b,
            "control"
        );
        ControlOutput {
            delta_a,
            delta_b,
            correction_a,
            correction_b,
            output_a,
            output_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn input(target: i64, actual: i64, ff: &str, limit: &str) -> AxisInput {
        AxisInput {
            target,
            actual,
            feed_forward: d(ff),
            limit: d(limit),
        }
    }

    #[test]
    fn large_error_saturates_at_limit() {
        let c = PositionController::new(d("1.0"), 6);
        let out = c.compute(&ControlInput {
            a: input(100, 40, "0", "0.5"),
            b: input(40, 100, "0", "0.5"),
        });
        assert_eq!(out.delta_a, 60);
        assert_eq!(out.correction_a.to_string(), "10.000");
        assert_eq!(out.output_a.to_string(), "0.500");
        assert_eq!(out.output_b.to_string(), "-0.500");
    }

    #[rstest]
    // gain 0.05 / 6 = 0.008334 (ceiling); 10 × p = 0.08334 -> 0.083
    #[case("0.05", 10, "0", "1", "0.083")]
    // floor after clamping keeps negative values away from zero
    #[case("0.05", -10, "-0.2005", "1", "-0.284")]
    #[case("0", 500, "0.5", "1", "0.500")]
    // zero raw output, zero limit
    #[case("0", 0, "0", "0", "0.000")]
    fn unsaturated_outputs(
        #[case] gain: &str,
        #[case] error: i64,
        #[case] ff: &str,
        #[case] limit: &str,
        #[case] expected: &str,
    ) {
        let c = PositionController::new(d(gain), 6);
        let out = c.compute(&ControlInput {
            a: input(error, 0, ff, limit),
            b: input(0, 0, "0", "1"),
        });
        assert_eq!(out.output_a.to_string(), expected);
    }

    #[test]
    fn positive_raw_with_zero_limit_clamps_to_zero_limit() {
        let c = PositionController::new(d("0"), 6);
        let out = c.compute(&ControlInput {
            a: input(0, 0, "0.3", "0"),
            b: input(0, 0, "-0.3", "0"),
        });
        assert!(out.output_a.is_zero());
        assert!(out.output_b.is_zero());
    }

    #[test]
    fn limits_are_independent_per_axis() {
        let c = PositionController::new(d("0"), 6);
        let out = c.compute(&ControlInput {
            a: input(0, 0, "0.9", "0.2"),
            b: input(0, 0, "0.9", "0.7"),
        });
        assert_eq!(out.output_a, d("0.2"));
        assert_eq!(out.output_b, d("0.7"));
    }

    #[test]
    fn negative_clamp_stays_inside_a_fine_limit() {
        let c = PositionController::new(d("0"), 6);
        let out = c.compute(&ControlInput {
            a: input(0, 0, "-0.9", "0.5555"),
            b: input(0, 0, "0.9", "0.5555"),
        });
        assert_eq!(out.output_a.to_string(), "-0.555");
        assert_eq!(out.output_b.to_string(), "0.555");
    }

    #[test]
    fn wheel_steps_clamped() {
        assert_eq!(PositionController::new(Decimal::ONE, 0).wheel_steps(), 1);
    }

    proptest! {
        #[test]
        fn output_never_exceeds_limit(
            gain in 0i64..10_000,
            target in -1_000_000i64..1_000_000,
            actual in -1_000_000i64..1_000_000,
            ff in -1_000_000i64..1_000_000,
            limit in 0i64..1_000_000,
            limit_scale in 0u32..=6,
            ws in 0u32..100,
        ) {
            let c = PositionController::new(Decimal::new(i128::from(gain), 3), ws);
            let ax = AxisInput {
                target,
                actual,
                feed_forward: Decimal::new(i128::from(ff), 6),
                limit: Decimal::new(i128::from(limit), limit_scale),
            };
            let inp = ControlInput { a: ax, b: ax };
            let out = c.compute(&inp);
            prop_assert!(out.output_a.abs() <= ax.limit);
            prop_assert_eq!(out, c.compute(&inp));
        }
    }
}
