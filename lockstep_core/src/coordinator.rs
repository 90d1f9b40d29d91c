//! Per-tick orchestration of the synchronization loop.
//!
//! One rising edge = one tick:
//! 1. measure the cycle time
//! 2. advance both targets from the commanded velocities (only while running)
//! 3. exchange the handshake unless idle or latched in ERROR
//! 4. on a verified exchange, recover signed pulse deltas, update positions
//!    and speed estimates, compute and commit the outputs
//! 5. otherwise command zero on both axes
//! 6. drive the sink and publish a snapshot
//!
//! Collaborator failures are logged and reported in the [`TickReport`];
//! none of them is fatal.

use std::sync::Arc;

use lockstep_traits::clock::Clock;
use lockstep_traits::{Axis, BusPeer, Edge, MotorSink, Response, Status};

use crate::clock_source::ClockSource;
use crate::command::Command;
use crate::config::{ControllerParameters, FULL_OUTPUT, OUTPUT_SCALE};
use crate::controller::{AxisInput, ControlInput, PositionController};
use crate::error::{CommandError, HandshakeError, SyncError};
use crate::fixed_point::{Decimal, Rounding};
use crate::handshake::Handshake;
use crate::hw_error::map_hw_error;
use crate::runtime::AxisRuntime;
use crate::sample::{CycleSample, SampleSink, TickCounter};
use crate::setpoint::SetpointIntegrator;
use crate::velocity::VelocityEstimator;

/// What happened to the handshake during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// NOP: no exchange attempted.
    Idle,
    /// Exchange verified; carries the new token.
    Synced { token: u32 },
    /// Exchange failed or the handshake is latched in ERROR.
    Failed(HandshakeError),
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub sample: CycleSample,
    pub outcome: TickOutcome,
    /// Sink failures this tick, at most one per axis.
    pub sink_errors: Vec<SyncError>,
}

pub struct CycleCoordinator<P, S> {
    peer: P,
    sink: S,
    display: Box<dyn SampleSink + Send>,
    clock: ClockSource,
    handshake: Handshake,
    integrator: SetpointIntegrator,
    estimator: VelocityEstimator,
    controller: PositionController,
    params: ControllerParameters,
    axes: [AxisRuntime; 2],
    running: bool,
    counter: TickCounter,
}

impl<P, S> std::fmt::Debug for CycleCoordinator<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleCoordinator")
            .field("state", &self.handshake.state())
            .field("token", &self.handshake.token())
            .field("running", &self.running)
            .field("params", &self.params)
            .field("axes", &self.axes)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl<P: BusPeer, S: MotorSink> CycleCoordinator<P, S> {
    pub(crate) fn new(
        peer: P,
        sink: S,
        display: Box<dyn SampleSink + Send>,
        clock: Arc<dyn Clock + Send + Sync>,
        params: ControllerParameters,
    ) -> Self {
        let params = params.normalized();
        Self {
            peer,
            sink,
            display,
            clock: ClockSource::new(clock),
            handshake: Handshake::new(),
            integrator: SetpointIntegrator::new(params.wheel_steps),
            estimator: VelocityEstimator::new(params.wheel_steps),
            controller: PositionController::new(params.gain, params.wheel_steps),
            params,
            axes: [AxisRuntime::default(), AxisRuntime::default()],
            running: false,
            counter: TickCounter::default(),
        }
    }

    /// Run a tick on a rising edge; falling edges are ignored.
    pub fn on_edge(&mut self, edge: Edge) -> Option<TickReport> {
        match edge {
            Edge::Rising => Some(self.on_tick()),
            Edge::Falling => None,
        }
    }

    pub fn on_tick(&mut self) -> TickReport {
        let cycle_time = self.clock.cycle_time();

        for axis in Axis::BOTH {
            let delta =
                self.integrator
                    .advance(self.params.velocity(axis), cycle_time, self.running);
            self.axes[axis.index()].advance_target(delta);
        }

        let (outcome, outputs) = match self.handshake.state() {
            Status::Nop => (TickOutcome::Idle, None),
            Status::Error => (TickOutcome::Failed(HandshakeError::Latched), None),
            Status::Initial | Status::Success => match self.handshake.exchange(&mut self.peer) {
                Ok(response) => (
                    TickOutcome::Synced {
                        token: response.token,
                    },
                    Some(self.control(cycle_time, &response)),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "handshake failed; outputs forced to zero");
                    (TickOutcome::Failed(e), None)
                }
            },
        };

        let commanded = outputs.unwrap_or([Decimal::zero(OUTPUT_SCALE); 2]);
        let sink_errors = self.drive(commanded);

        let sample = CycleSample::new(
            self.counter.advance(),
            cycle_time,
            self.handshake.token(),
            [self.axes[0].target(), self.axes[1].target()],
            [self.axes[0].actual(), self.axes[1].actual()],
            commanded,
            [
                self.estimator.speed(Axis::A),
                self.estimator.speed(Axis::B),
            ],
        );
        self.display.publish(&sample);

        TickReport {
            sample,
            outcome,
            sink_errors,
        }
    }

    /// Position, speed and controller update after a verified exchange.
    fn control(&mut self, cycle_time: Decimal, response: &Response) -> [Decimal; 2] {
        for axis in Axis::BOTH {
            let delta = self.axes[axis.index()].record_total(response.pulses(axis));
            self.estimator.update(axis, cycle_time, delta.signed);
        }

        let input = ControlInput {
            a: self.axis_input(Axis::A),
            b: self.axis_input(Axis::B),
        };
        let out = self.controller.compute(&input);

        let outputs = Axis::BOTH.map(|axis| {
            let v = if self.params.closed_loop {
                out.output(axis)
            } else {
                self.params
                    .feed_forward(axis)
                    .rescale(OUTPUT_SCALE, Rounding::Floor)
            };
            v.clamp(-FULL_OUTPUT, FULL_OUTPUT)
        });
        for axis in Axis::BOTH {
            self.axes[axis.index()].commit_output(outputs[axis.index()]);
        }
        outputs
    }

    fn axis_input(&self, axis: Axis) -> AxisInput {
        let rt = &self.axes[axis.index()];
        AxisInput {
            target: rt.target(),
            actual: rt.actual(),
            feed_forward: self.params.feed_forward(axis),
            limit: self.params.limit(axis),
        }
    }

    fn drive(&mut self, outputs: [Decimal; 2]) -> Vec<SyncError> {
        let mut errors = Vec::new();
        for axis in Axis::BOTH {
            if let Err(e) = self
                .sink
                .set_output(axis, outputs[axis.index()].to_milli())
            {
                let err = SyncError::Sink {
                    axis,
                    reason: map_hw_error(&*e).to_string(),
                };
                tracing::warn!(error = %err, "motor sink rejected output");
                errors.push(err);
            }
        }
        errors
    }

    /// Best-effort zero on both axes.
    fn stop_sink(&mut self) {
        if let Err(e) = self.sink.stop() {
            tracing::warn!(error = %e, "motor stop failed");
        }
    }

    /// Install a changed parameter set, truncated to the loop's digits.
    fn install(&mut self, cmd: &Command, next: ControllerParameters) -> Result<(), CommandError> {
        let next = next.normalized();
        next.validate()
            .map_err(|reason| CommandError::Rejected(format!("{cmd}: {reason}")))?;
        self.controller.set_gain(next.gain);
        self.params = next;
        Ok(())
    }

    /// Apply an operator command between ticks.
    ///
    /// Rejected values leave the previous parameters untouched.
    pub fn apply(&mut self, cmd: Command) -> Result<(), CommandError> {
        tracing::info!(command = %cmd, "command");
        let mut next = self.params.clone();
        match cmd {
            Command::Start => {
                self.handshake.arm();
                self.running = true;
            }
            Command::Stop => {
                self.handshake.disarm();
                self.running = false;
                for ax in &mut self.axes {
                    ax.clear_history();
                }
                self.stop_sink();
            }
            Command::Reset => {
                self.handshake.reset_token();
                for ax in &mut self.axes {
                    ax.reset();
                }
                self.estimator.reset();
                self.params.closed_loop = false;
            }
            Command::Shutdown => {
                self.handshake.disarm();
                self.running = false;
                self.stop_sink();
            }
            Command::SetVelocity(axis, rpm) => {
                next.velocity[axis.index()] = rpm;
                if next.simultaneous {
                    next.velocity[axis.other().index()] = rpm;
                }
                self.install(&cmd, next)?;
            }
            Command::SetOutputRelation(rpm) => {
                next.output_relation = rpm;
                self.install(&cmd, next)?;
            }
            Command::SetLimit(axis, v) => {
                next.limits[axis.index()] = v;
                self.install(&cmd, next)?;
            }
            Command::SetGain(v) => {
                next.gain = v;
                self.install(&cmd, next)?;
            }
            Command::SetClosedLoop(on) => self.params.closed_loop = on,
            Command::SetSimultaneous(on) => self.params.simultaneous = on,
        }
        Ok(())
    }

    #[inline]
    pub const fn state(&self) -> Status {
        self.handshake.state()
    }

    #[inline]
    pub const fn token(&self) -> u32 {
        self.handshake.token()
    }

    #[inline]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    pub const fn params(&self) -> &ControllerParameters {
        &self.params
    }

    pub fn axis(&self, axis: Axis) -> &AxisRuntime {
        &self.axes[axis.index()]
    }

    pub fn speed(&self, axis: Axis) -> Decimal {
        self.estimator.speed(axis)
    }

    pub const fn peer(&self) -> &P {
        &self.peer
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Stop the sink and hand back the peripherals.
    pub fn into_parts(mut self) -> (P, S) {
        self.stop_sink();
        (self.peer, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CoordinatorBuilder;
    use lockstep_traits::clock::test_clock::TestClock;
    use lockstep_traits::{BoxError, Request};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted responses; echoes token + 1 when the script is empty.
    #[derive(Default)]
    struct Scripted {
        replies: VecDeque<Result<Response, String>>,
        pulses: (i32, i32),
        seen: Vec<Request>,
    }

    impl BusPeer for Scripted {
        fn exchange(&mut self, request: Request) -> Result<Response, BoxError> {
            self.seen.push(request);
            match self.replies.pop_front() {
                Some(Ok(r)) => Ok(r),
                Some(Err(e)) => Err(e.into()),
                None => Ok(Response {
                    token: request.token.wrapping_add(1),
                    status: Status::Success,
                    value: 0,
                    pulses_a: self.pulses.0,
                    pulses_b: self.pulses.1,
                }),
            }
        }
    }

    #[derive(Default)]
    struct Spy {
        calls: Vec<(Axis, i32)>,
        fail_b: bool,
    }

    impl MotorSink for Spy {
        fn set_output(&mut self, axis: Axis, milli: i32) -> Result<(), BoxError> {
            self.calls.push((axis, milli));
            if self.fail_b && axis == Axis::B {
                return Err("pca9685 nack".into());
            }
            Ok(())
        }
    }

    fn coordinator(
        peer: Scripted,
        params: ControllerParameters,
    ) -> (CycleCoordinator<Scripted, Spy>, TestClock) {
        let clock = TestClock::new();
        let c = CoordinatorBuilder::new()
            .with_peer(peer)
            .with_sink(Spy::default())
            .with_clock(Box::new(clock.clone()))
            .with_params(params)
            .build()
            .unwrap();
        (c, clock)
    }

    #[test]
    fn idle_ticks_publish_but_never_exchange() {
        let (mut c, _) = coordinator(Scripted::default(), ControllerParameters::default());
        let r = c.on_tick();
        assert_eq!(r.outcome, TickOutcome::Idle);
        assert_eq!(r.sample.counter(), 1);
        assert!(c.peer().seen.is_empty());
        assert_eq!(c.sink().calls, vec![(Axis::A, 0), (Axis::B, 0)]);
    }

    #[test]
    fn falling_edges_are_ignored() {
        let (mut c, _) = coordinator(Scripted::default(), ControllerParameters::default());
        assert!(c.on_edge(Edge::Falling).is_none());
        assert!(c.on_edge(Edge::Rising).is_some());
    }

    #[test]
    fn targets_only_advance_while_running() {
        let mut p = ControllerParameters::default();
        p.velocity = [Decimal::from_int(60), Decimal::from_int(-60)];
        let (mut c, clock) = coordinator(Scripted::default(), p);
        c.on_tick();
        clock.advance(Duration::from_secs(1));
        c.on_tick();
        assert_eq!(c.axis(Axis::A).target(), 0);

        c.apply(Command::Start).unwrap();
        clock.advance(Duration::from_secs(1));
        c.on_tick();
        assert_eq!(c.axis(Axis::A).target(), 6);
        assert_eq!(c.axis(Axis::B).target(), -6);
    }

    #[test]
    fn desync_latches_and_zeroes_until_rearmed() {
        let mut p = ControllerParameters::default();
        p.velocity = [Decimal::from_int(55); 2];
        let peer = Scripted {
            replies: VecDeque::from([Ok(Response {
                token: 5,
                status: Status::Success,
                value: 0,
                pulses_a: 0,
                pulses_b: 0,
            })]),
            ..Scripted::default()
        };
        let (mut c, _) = coordinator(peer, p);
        c.apply(Command::Start).unwrap();
        let r = c.on_tick();
        assert!(matches!(
            r.outcome,
            TickOutcome::Failed(HandshakeError::Desync { sent: 0, received: 5, .. })
        ));
        assert_eq!(c.state(), Status::Error);
        assert!(r.sample.output(Axis::A).is_zero());

        let r = c.on_tick();
        assert_eq!(r.outcome, TickOutcome::Failed(HandshakeError::Latched));
        assert_eq!(c.peer().seen.len(), 1);

        c.apply(Command::Start).unwrap();
        let r = c.on_tick();
        assert_eq!(r.outcome, TickOutcome::Synced { token: 1 });
        assert_eq!(r.sample.output(Axis::B).to_string(), "0.500");
    }

    #[test]
    fn transport_failure_is_not_fatal() {
        let peer = Scripted {
            replies: VecDeque::from([Err("bus timeout".to_string())]),
            ..Scripted::default()
        };
        let (mut c, _) = coordinator(peer, ControllerParameters::default());
        c.apply(Command::Start).unwrap();
        let r = c.on_tick();
        assert_eq!(
            r.outcome,
            TickOutcome::Failed(HandshakeError::Transport(SyncError::Timeout))
        );
    }

    #[test]
    fn sink_failures_are_reported_per_axis() {
        let clock = TestClock::new();
        let mut c = CoordinatorBuilder::new()
            .with_peer(Scripted::default())
            .with_sink(Spy {
                fail_b: true,
                ..Spy::default()
            })
            .with_clock(Box::new(clock))
            .build()
            .unwrap();
        let r = c.on_tick();
        assert_eq!(r.sink_errors.len(), 1);
        assert!(matches!(
            r.sink_errors[0],
            SyncError::Sink { axis: Axis::B, .. }
        ));
    }

    #[test]
    fn rejected_commands_keep_previous_values() {
        let (mut c, _) = coordinator(Scripted::default(), ControllerParameters::default());
        c.apply(Command::SetGain(Decimal::new(5, 1))).unwrap();
        assert!(c.apply(Command::SetGain(Decimal::new(-1, 1))).is_err());
        assert!(c.apply(Command::SetLimit(Axis::A, Decimal::new(-1, 0))).is_err());
        assert!(c.apply(Command::SetOutputRelation(Decimal::ZERO)).is_err());
        assert_eq!(c.params().gain, Decimal::new(5, 1));
        assert!(c.params().limits[0].is_zero());
        assert_eq!(c.params().output_relation, Decimal::new(11_000, 2));
    }

    #[test]
    fn long_fraction_velocity_is_truncated_before_integration() {
        let (mut c, clock) = coordinator(Scripted::default(), ControllerParameters::default());
        let cmd: Command = "velocity a 60.000000000000000000000000000".parse().unwrap();
        c.apply(cmd).unwrap();
        assert_eq!(c.params().velocity(Axis::A).to_string(), "60.00");
        c.apply(Command::Start).unwrap();
        c.on_tick();
        clock.advance(Duration::from_secs(1));
        c.on_tick();
        assert_eq!(c.axis(Axis::A).target(), 6);
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let (mut c, _) = coordinator(Scripted::default(), ControllerParameters::default());
        let err = c
            .apply(Command::SetLimit(Axis::A, Decimal::from_int(5)))
            .unwrap_err();
        assert!(err.to_string().contains("limit a 5"));
        assert!(c.apply(Command::SetVelocity(Axis::B, Decimal::from_int(-200_000))).is_err());
        assert!(c.apply(Command::SetGain(Decimal::from_int(10_000))).is_err());
        c.apply(Command::SetLimit(Axis::B, "0.5555".parse().unwrap())).unwrap();
        assert!(c.params().limit(Axis::A).is_zero());
        assert_eq!(c.params().limit(Axis::B).to_string(), "0.555");
        assert!(c.params().velocity(Axis::B).is_zero());
    }

    #[test]
    fn open_loop_output_is_bounded_to_full_scale() {
        let mut p = ControllerParameters::default();
        p.velocity = [Decimal::from_int(200), Decimal::from_int(-200)];
        let (mut c, _) = coordinator(Scripted::default(), p);
        c.apply(Command::Start).unwrap();
        let r = c.on_tick();
        assert_eq!(r.sample.output(Axis::A).to_string(), "1.000");
        assert_eq!(r.sample.output(Axis::B).to_string(), "-1.000");
        assert_eq!(c.sink().calls, vec![(Axis::A, 1000), (Axis::B, -1000)]);
    }

    #[test]
    fn simultaneous_mirrors_velocity() {
        let (mut c, _) = coordinator(Scripted::default(), ControllerParameters::default());
        c.apply(Command::SetVelocity(Axis::A, Decimal::from_int(30))).unwrap();
        assert!(c.params().velocity(Axis::B).is_zero());
        c.apply(Command::SetSimultaneous(true)).unwrap();
        c.apply(Command::SetVelocity(Axis::B, Decimal::from_int(-20))).unwrap();
        assert_eq!(c.params().velocity, [Decimal::from_int(-20); 2]);
    }

    #[test]
    fn stop_disarms_and_zeroes() {
        let mut p = ControllerParameters::default();
        p.velocity = [Decimal::from_int(110); 2];
        let (mut c, _) = coordinator(Scripted::default(), p);
        c.apply(Command::Start).unwrap();
        c.on_tick();
        assert_eq!(c.axis(Axis::A).output().to_string(), "1.000");
        c.apply(Command::Stop).unwrap();
        assert_eq!(c.state(), Status::Nop);
        assert!(!c.is_running());
        assert!(c.axis(Axis::A).output().is_zero());
        assert_eq!(c.sink().calls.last(), Some(&(Axis::B, 0)));
    }

    #[test]
    fn reset_zeroes_positions_and_opens_loop() {
        let mut p = ControllerParameters::default();
        p.velocity = [Decimal::from_int(110); 2];
        p.closed_loop = true;
        p.limits = [Decimal::ONE; 2];
        let peer = Scripted {
            pulses: (3, 3),
            ..Scripted::default()
        };
        let (mut c, clock) = coordinator(peer, p);
        c.apply(Command::Start).unwrap();
        for _ in 0..3 {
            clock.advance(Duration::from_millis(100));
            c.on_tick();
        }
        assert_ne!(c.axis(Axis::A).target(), 0);
        c.apply(Command::Reset).unwrap();
        assert_eq!(c.axis(Axis::A), &AxisRuntime::default());
        assert!(c.speed(Axis::A).is_zero());
        assert!(!c.params().closed_loop);
        assert_eq!(c.token(), 0);
        // still armed: next exchange sends token 0 with SUCCESS status
        c.on_tick();
        assert_eq!(c.peer().seen.last().map(|r| r.token), Some(0));
    }
}
