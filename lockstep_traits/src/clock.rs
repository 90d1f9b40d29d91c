//! Time source behind cycle-time measurement and the simulated tick line.

use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock {
    /// Monotonic timestamp; cycle times are differences of two of these.
    fn now(&self) -> Instant;

    /// Block for `d` (simulated clocks advance instead).
    fn sleep(&self, d: Duration);

    /// Whole milliseconds since `epoch`; 0 when `epoch` lies in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let ms = self.now().saturating_duration_since(epoch).as_millis();
        u64::try_from(ms).unwrap_or(u64::MAX)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d);
    }
}

/// Wall-clock implementation over `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::Clock;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Hand-driven clock: time only moves on `advance` or `sleep`.
    ///
    /// Clones share one timeline, so a test can hold a handle while the
    /// coordinator and the simulated ticker own others.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        elapsed: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, d: Duration) {
            if let Ok(mut e) = self.elapsed.lock() {
                *e = e.saturating_add(d);
            }
        }

        /// Time advanced since construction.
        pub fn elapsed(&self) -> Duration {
            self.elapsed.lock().map(|e| *e).unwrap_or_default()
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}
