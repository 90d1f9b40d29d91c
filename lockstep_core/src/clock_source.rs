//! Cycle-time measurement between consecutive ticks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lockstep_traits::clock::Clock;

use crate::fixed_point::{Decimal, Rounding};

/// Fractional digits of an internal cycle time (microseconds).
pub const CYCLE_SCALE: u32 = 6;

/// Convert a duration to seconds with [`CYCLE_SCALE`] digits, half-up on the
/// nanoseconds. Anything below one microsecond becomes zero.
pub fn duration_to_seconds(d: Duration) -> Decimal {
    let nanos = i128::try_from(d.as_nanos()).unwrap_or(i128::MAX);
    let secs = Decimal::new(nanos, 9).rescale(CYCLE_SCALE, Rounding::HalfUp);
    if secs < Decimal::new(1, CYCLE_SCALE) {
        Decimal::zero(CYCLE_SCALE)
    } else {
        secs
    }
}

/// Remembers the previous tick's timestamp and reports the time since.
///
/// The first measurement in a session has nothing to compare against and
/// yields zero. Reset commands do not touch the remembered timestamp.
pub struct ClockSource {
    clock: Arc<dyn Clock + Send + Sync>,
    previous: Option<Instant>,
}

impl ClockSource {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            previous: None,
        }
    }

    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Time since `previous`, never negative.
    pub fn elapsed(&self, previous: Instant) -> Duration {
        self.now().saturating_duration_since(previous)
    }

    /// Seconds since the previous call, then remember "now" for the next one.
    pub fn cycle_time(&mut self) -> Decimal {
        let now = self.now();
        let d = self
            .previous
            .map_or(Duration::ZERO, |p| now.saturating_duration_since(p));
        self.previous = Some(now);
        duration_to_seconds(d)
    }
}

impl std::fmt::Debug for ClockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockSource")
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_traits::clock::test_clock::TestClock;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::ZERO, "0.000000")]
    #[case(Duration::from_nanos(499), "0.000000")]
    #[case(Duration::from_nanos(500), "0.000001")]
    #[case(Duration::from_nanos(10_000_499), "0.010000")]
    #[case(Duration::from_nanos(10_000_500), "0.010001")]
    #[case(Duration::from_millis(1500), "1.500000")]
    fn converts_with_half_up(#[case] d: Duration, #[case] expected: &str) {
        assert_eq!(duration_to_seconds(d).to_string(), expected);
    }

    #[test]
    fn first_cycle_is_zero_then_measures() {
        let clock = TestClock::new();
        let mut src = ClockSource::new(Arc::new(clock.clone()));
        assert!(src.cycle_time().is_zero());
        clock.advance(Duration::from_millis(10));
        assert_eq!(src.cycle_time().to_string(), "0.010000");
        assert!(src.cycle_time().is_zero());
    }

    #[test]
    fn elapsed_is_saturating() {
        let clock = TestClock::new();
        let src = ClockSource::new(Arc::new(clock.clone()));
        let later = src.now() + Duration::from_secs(5);
        assert_eq!(src.elapsed(later), Duration::ZERO);
    }
}
