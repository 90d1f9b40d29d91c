use std::time::Duration;

use lockstep_core::{Command, ControllerParameters, CoordinatorBuilder, Decimal, TickOutcome};
use lockstep_traits::clock::test_clock::TestClock;
use lockstep_traits::{Axis, BoxError, BusPeer, MotorSink, Request, Response, Status};
use proptest::prelude::*;

/// Echoing peer whose encoder totals follow a prepared list.
struct Totals {
    totals: Vec<(i32, i32)>,
    idx: usize,
}

impl BusPeer for Totals {
    fn exchange(&mut self, request: Request) -> Result<Response, BoxError> {
        let (a, b) = self.totals.get(self.idx).copied().unwrap_or_default();
        self.idx += 1;
        Ok(Response {
            token: request.token.wrapping_add(1),
            status: Status::Success,
            value: 0,
            pulses_a: a,
            pulses_b: b,
        })
    }
}

struct Discard;

impl MotorSink for Discard {
    fn set_output(&mut self, _axis: Axis, _milli: i32) -> Result<(), BoxError> {
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn closed_loop_outputs_stay_within_limits(
        totals in prop::collection::vec((any::<i32>(), any::<i32>()), 1..40),
        limit_milli in 0i128..=1000,
        gain_milli in 0i128..=5000,
        velocity in -300i64..=300,
        cycle_ms in 1u64..=200,
    ) {
        let limit = Decimal::new(limit_milli, 3);
        let params = ControllerParameters {
            gain: Decimal::new(gain_milli, 3),
            limits: [limit; 2],
            closed_loop: true,
            velocity: [Decimal::from_int(velocity), Decimal::from_int(-velocity)],
            ..ControllerParameters::default()
        };
        let clock = TestClock::new();
        let n = totals.len();
        let mut c = CoordinatorBuilder::new()
            .with_peer(Totals { totals, idx: 0 })
            .with_sink(Discard)
            .with_clock(Box::new(clock.clone()))
            .with_params(params)
            .build()
            .unwrap();
        c.apply(Command::Start).unwrap();
        let mut last = 0;
        for _ in 0..n {
            clock.advance(Duration::from_millis(cycle_ms));
            let r = c.on_tick();
            let synced = matches!(r.outcome, TickOutcome::Synced { .. });
            prop_assert!(synced);
            prop_assert!(r.sample.counter() > last);
            last = r.sample.counter();
            for axis in Axis::BOTH {
                prop_assert!(r.sample.output(axis).abs() <= limit);
            }
        }
    }

    #[test]
    fn operator_values_never_break_the_loop(
        int in 0u64..=999_999,
        frac in "[0-9]{0,30}",
        negative in any::<bool>(),
        limit in "[0-9]{1,2}\\.[0-9]{1,8}",
        closed in any::<bool>(),
        ticks in 1usize..8,
    ) {
        let sign = if negative { "-" } else { "" };
        let clock = TestClock::new();
        let mut c = CoordinatorBuilder::new()
            .with_peer(Totals { totals: vec![(7, 7); ticks], idx: 0 })
            .with_sink(Discard)
            .with_clock(Box::new(clock.clone()))
            .build()
            .unwrap();
        for line in [
            format!("velocity a {sign}{int}.{frac}"),
            format!("limit a {limit}"),
            format!("gain {int}.{frac}"),
            format!("closed-loop {}", if closed { "on" } else { "off" }),
            "start".to_string(),
        ] {
            // out-of-range values are rejected and leave the loop untouched
            let _ = c.apply(line.parse::<Command>().unwrap());
        }
        for _ in 0..ticks {
            clock.advance(Duration::from_millis(250));
            let r = c.on_tick();
            let out = r.sample.output(Axis::A);
            prop_assert!(out.abs() <= Decimal::ONE);
            if closed {
                prop_assert!(out.abs() <= c.params().limit(Axis::A));
            }
        }
    }

    #[test]
    fn no_pulses_means_no_speed(cycles in prop::collection::vec(1u64..=500, 1..30)) {
        let clock = TestClock::new();
        let mut c = CoordinatorBuilder::new()
            .with_peer(Totals { totals: Vec::new(), idx: 0 })
            .with_sink(Discard)
            .with_clock(Box::new(clock.clone()))
            .build()
            .unwrap();
        c.apply(Command::Start).unwrap();
        for ms in cycles {
            clock.advance(Duration::from_millis(ms));
            let r = c.on_tick();
            prop_assert!(r.sample.speed(Axis::A).is_zero());
            prop_assert!(r.sample.speed(Axis::B).is_zero());
        }
    }
}
