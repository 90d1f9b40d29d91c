//! Target position integration from a velocity setpoint.

use crate::clock_source::CYCLE_SCALE;
use crate::config::rpm_const;
use crate::fixed_point::Decimal;

/// Turns a commanded velocity and a cycle time into a target-position delta.
#[derive(Debug, Clone, Copy)]
pub struct SetpointIntegrator {
    rpm_const: Decimal,
}

impl SetpointIntegrator {
    pub fn new(wheel_steps: u32) -> Self {
        Self {
            rpm_const: rpm_const(wheel_steps),
        }
    }

    #[inline]
    pub const fn rpm_const(&self) -> Decimal {
        self.rpm_const
    }

    /// Pulses to add to the target this tick: `velocity × (cycle_time ×
    /// rpm_const)`, exact. Exactly zero when not running.
    pub fn advance(&self, velocity: Decimal, cycle_time: Decimal, running: bool) -> Decimal {
        if !running {
            return Decimal::zero(CYCLE_SCALE);
        }
        velocity * (cycle_time * self.rpm_const)
    }
}
