//! Sliding-window speed estimate per axis.
//!
//! Each window always holds exactly [`WINDOW_LEN`] (cycle time, pulse delta)
//! slots, zero-initialized. Until it has filled, the zero padding pulls the
//! estimate toward zero.

use lockstep_traits::Axis;

use crate::config::rpm_const;
use crate::fixed_point::{Decimal, Rounding};

pub const WINDOW_LEN: usize = 20;
/// Fractional digits of an estimated speed.
pub const SPEED_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    slots: [(Decimal, i64); WINDOW_LEN],
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self {
            slots: [(Decimal::ZERO, 0); WINDOW_LEN],
        }
    }
}

impl SlidingWindow {
    /// Insert at the front; the oldest slot falls off the back.
    pub fn push(&mut self, cycle_time: Decimal, pulses: i64) {
        self.slots.rotate_right(1);
        self.slots[0] = (cycle_time, pulses);
    }

    pub fn sum_cycle(&self) -> Decimal {
        self.slots.iter().map(|(c, _)| *c).sum()
    }

    pub fn sum_pulses(&self) -> i64 {
        self.slots.iter().fold(0i64, |acc, (_, p)| acc.saturating_add(*p))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn slots(&self) -> &[(Decimal, i64); WINDOW_LEN] {
        &self.slots
    }
}

#[derive(Debug, Clone)]
pub struct VelocityEstimator {
    rpm_const: Decimal,
    windows: [SlidingWindow; 2],
    speeds: [Decimal; 2],
}

impl VelocityEstimator {
    pub fn new(wheel_steps: u32) -> Self {
        Self {
            rpm_const: rpm_const(wheel_steps),
            windows: [SlidingWindow::default(); 2],
            speeds: [Decimal::zero(SPEED_SCALE); 2],
        }
    }

    /// Record one tick for `axis` and return the refreshed speed in rpm.
    pub fn update(&mut self, axis: Axis, cycle_time: Decimal, pulses: i64) -> Decimal {
        let w = &mut self.windows[axis.index()];
        w.push(cycle_time, pulses);
        let divisor = w.sum_cycle() * self.rpm_const;
        let speed = Decimal::from_int(w.sum_pulses())
            .div(divisor, SPEED_SCALE, Rounding::HalfUp)
            .unwrap_or(Decimal::zero(SPEED_SCALE));
        self.speeds[axis.index()] = speed;
        speed
    }

    #[inline]
    pub fn speed(&self, axis: Axis) -> Decimal {
        self.speeds[axis.index()]
    }

    pub fn window(&self, axis: Axis) -> &SlidingWindow {
        &self.windows[axis.index()]
    }

    pub fn reset(&mut self) {
        for w in &mut self.windows {
            w.clear();
        }
        self.speeds = [Decimal::zero(SPEED_SCALE); 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: i128) -> Decimal {
        Decimal::new(v * 1000, 6)
    }

    #[test]
    fn zero_window_does_not_divide() {
        let mut e = VelocityEstimator::new(6);
        assert_eq!(e.update(Axis::A, Decimal::ZERO, 0), Decimal::ZERO);
        assert_eq!(e.speed(Axis::A).to_string(), "0.00");
    }

    #[test]
    fn full_window_at_constant_rate() {
        // 1 pulse every 100 ms with 6 pulses/rev = 100 rpm
        let mut e = VelocityEstimator::new(6);
        let mut last = Decimal::ZERO;
        for _ in 0..WINDOW_LEN {
            last = e.update(Axis::B, ms(100), 1);
        }
        assert_eq!(last.to_string(), "100.00");
        assert!(e.speed(Axis::A).is_zero());
    }

    #[test]
    fn oldest_sample_is_discarded() {
        let mut w = SlidingWindow::default();
        w.push(ms(5), 99);
        for _ in 0..WINDOW_LEN {
            w.push(ms(1), 1);
        }
        assert_eq!(w.sum_pulses(), WINDOW_LEN as i64);
        assert_eq!(w.sum_cycle(), ms(WINDOW_LEN as i128));
    }

    #[test]
    fn newest_is_at_front() {
        let mut w = SlidingWindow::default();
        w.push(ms(1), 1);
        w.push(ms(2), -2);
        assert_eq!(w.slots()[0], (ms(2), -2));
        assert_eq!(w.slots()[1], (ms(1), 1));
    }

    #[test]
    fn signed_deltas_give_negative_speed() {
        let mut e = VelocityEstimator::new(6);
        let s = e.update(Axis::A, ms(100), -1);
        assert_eq!(s.to_string(), "-100.00");
    }

    #[test]
    fn reset_clears_windows_and_speeds() {
        let mut e = VelocityEstimator::new(6);
        e.update(Axis::A, ms(10), 3);
        e.reset();
        assert!(e.speed(Axis::A).is_zero());
        assert_eq!(e.window(Axis::A).sum_pulses(), 0);
    }
}
