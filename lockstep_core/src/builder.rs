//! Type-state builder for [`CycleCoordinator`].
//!
//! `build()` only exists once a peer and a sink are supplied; the clock,
//! display and parameters fall back to defaults.

use std::sync::Arc;

use lockstep_traits::clock::{Clock, MonotonicClock};
use lockstep_traits::{BusPeer, MotorSink};

use crate::config::ControllerParameters;
use crate::coordinator::CycleCoordinator;
use crate::error::{BuildError, Result};
use crate::sample::{CycleSample, SampleSink};

/// Placeholder for a collaborator that has not been supplied yet.
#[derive(Debug, Default)]
pub struct Missing;

/// Display that drops every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl SampleSink for NullDisplay {
    fn publish(&mut self, _sample: &CycleSample) {}
}

pub struct CoordinatorBuilder<P, S> {
    peer: P,
    sink: S,
    params: Option<ControllerParameters>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    display: Option<Box<dyn SampleSink + Send>>,
}

impl Default for CoordinatorBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            peer: Missing,
            sink: Missing,
            params: None,
            clock: None,
            display: None,
        }
    }
}

impl CoordinatorBuilder<Missing, Missing> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P, S> CoordinatorBuilder<P, S> {
    pub fn with_peer<P2: BusPeer>(self, peer: P2) -> CoordinatorBuilder<P2, S> {
        CoordinatorBuilder {
            peer,
            sink: self.sink,
            params: self.params,
            clock: self.clock,
            display: self.display,
        }
    }

    pub fn with_sink<S2: MotorSink>(self, sink: S2) -> CoordinatorBuilder<P, S2> {
        CoordinatorBuilder {
            peer: self.peer,
            sink,
            params: self.params,
            clock: self.clock,
            display: self.display,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: ControllerParameters) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_display(mut self, display: Box<dyn SampleSink + Send>) -> Self {
        self.display = Some(display);
        self
    }
}

impl<P: BusPeer, S: MotorSink> CoordinatorBuilder<P, S> {
    /// Validate the parameters and construct the coordinator.
    pub fn build(self) -> Result<CycleCoordinator<P, S>> {
        let params = self.params.unwrap_or_default();
        params
            .validate()
            .map_err(|msg| eyre::Report::new(BuildError::InvalidConfig(msg)))?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let display = self.display.unwrap_or_else(|| Box::new(NullDisplay));

        Ok(CycleCoordinator::new(
            self.peer, self.sink, display, clock, params,
        ))
    }
}
