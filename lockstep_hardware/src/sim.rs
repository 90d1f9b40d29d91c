//! In-process stand-ins for the microcontroller, the motor HAT and the tick line.
//!
//! [`SimPlant`] holds the shared state: the sink stores the commanded outputs,
//! and every exchange turns them into encoder pulses. The totals only count
//! up because the encoders carry no direction, just like the real wiring.
//! The peer speaks the same byte frames as the I2C peripheral.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lockstep_traits::clock::Clock;
use lockstep_traits::{
    Axis, BoxError, BusPeer, Edge, MotorSink, RESPONSE_LEN, Request, Response, Status, TickSource,
};

use crate::error::{HwError, Result};

#[derive(Debug, Default)]
struct PlantState {
    /// Commanded output per axis, thousandths.
    outputs: [i32; 2],
    totals: [i32; 2],
    /// Fractional pulses carried over, in thousandths of a pulse.
    residue: [u64; 2],
    exchanges: u64,
}

/// Shared simulated drive train for two axes.
#[derive(Debug, Clone)]
pub struct SimPlant {
    state: Arc<Mutex<PlantState>>,
    pulses_per_tick: u32,
}

impl SimPlant {
    /// `pulses_per_tick`: encoder pulses per exchange at full output.
    pub fn new(pulses_per_tick: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState::default())),
            pulses_per_tick,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PlantState>> {
        self.state.lock().map_err(|_| HwError::Sim("plant lock poisoned"))
    }

    pub fn peer(&self) -> SimulatedPeer {
        SimulatedPeer {
            plant: self.clone(),
            faults: SimFaults::default(),
        }
    }

    pub fn sink(&self) -> SimulatedSink {
        SimulatedSink {
            plant: self.clone(),
        }
    }

    pub fn outputs(&self) -> [i32; 2] {
        self.lock().map(|s| s.outputs).unwrap_or_default()
    }

    pub fn totals(&self) -> [i32; 2] {
        self.lock().map(|s| s.totals).unwrap_or_default()
    }

    pub fn exchanges(&self) -> u64 {
        self.lock().map(|s| s.exchanges).unwrap_or_default()
    }
}

/// Periodic faults injected by the simulated peer (1-based exchange counts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Answer every n-th exchange with a token skewed by one.
    pub desync_every: Option<u64>,
    /// Fail every n-th exchange with a bus timeout.
    pub timeout_every: Option<u64>,
}

fn hits(every: Option<u64>, n: u64) -> bool {
    every.is_some_and(|k| k > 0 && n % k == 0)
}

/// Microcontroller model: answers token + 1 and reports encoder totals.
#[derive(Debug)]
pub struct SimulatedPeer {
    plant: SimPlant,
    faults: SimFaults,
}

impl SimulatedPeer {
    #[must_use]
    pub fn with_faults(mut self, faults: SimFaults) -> Self {
        self.faults = faults;
        self
    }

    /// Handle one request frame the way the firmware does.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<[u8; RESPONSE_LEN]> {
        let request = Request::decode(frame).map_err(|e| HwError::Frame(e.to_string()))?;
        let mut st = self.plant.lock()?;
        st.exchanges += 1;
        let n = st.exchanges;
        if hits(self.faults.timeout_every, n) {
            tracing::debug!(exchange = n, "simulated bus timeout");
            return Err(HwError::Timeout);
        }

        let ppt = u64::from(self.plant.pulses_per_tick);
        for i in 0..2 {
            st.residue[i] += u64::from(st.outputs[i].unsigned_abs()) * ppt;
            let whole = st.residue[i] / 1000;
            st.residue[i] %= 1000;
            st.totals[i] = st.totals[i].wrapping_add(i32::try_from(whole).unwrap_or(i32::MAX));
        }

        let skew = if hits(self.faults.desync_every, n) { 2 } else { 1 };
        let status = if request.status == Status::Nop {
            Status::Nop
        } else {
            Status::Success
        };
        let response = Response {
            token: request.token.wrapping_add(skew),
            status,
            value: i32::try_from(n % (i32::MAX as u64)).unwrap_or(0),
            pulses_a: st.totals[0],
            pulses_b: st.totals[1],
        };
        Ok(response.encode())
    }
}

impl BusPeer for SimulatedPeer {
    fn exchange(&mut self, request: Request) -> std::result::Result<Response, BoxError> {
        let reply = self.handle_frame(&request.encode())?;
        Ok(Response::decode(&reply)?)
    }
}

/// Motor HAT model: stores the commanded outputs in the plant.
#[derive(Debug)]
pub struct SimulatedSink {
    plant: SimPlant,
}

impl MotorSink for SimulatedSink {
    fn set_output(&mut self, axis: Axis, milli: i32) -> std::result::Result<(), BoxError> {
        let mut st = self.plant.lock()?;
        st.outputs[axis.index()] = milli.clamp(-1000, 1000);
        Ok(())
    }
}

/// Tick line model: a rising edge every `period`, each followed by a falling edge.
pub struct SimulatedTicker<C: Clock> {
    clock: C,
    period: Duration,
    waited: Duration,
    pending_fall: bool,
}

impl<C: Clock> SimulatedTicker<C> {
    pub fn new(clock: C, period: Duration) -> Self {
        Self {
            clock,
            period,
            waited: Duration::ZERO,
            pending_fall: false,
        }
    }
}

impl<C: Clock> TickSource for SimulatedTicker<C> {
    fn wait_edge(&mut self, timeout: Duration) -> std::result::Result<Option<Edge>, BoxError> {
        if self.pending_fall {
            self.pending_fall = false;
            return Ok(Some(Edge::Falling));
        }
        let remaining = self.period.saturating_sub(self.waited);
        if remaining > timeout {
            self.clock.sleep(timeout);
            self.waited += timeout;
            return Ok(None);
        }
        self.clock.sleep(remaining);
        self.waited = Duration::ZERO;
        self.pending_fall = true;
        Ok(Some(Edge::Rising))
    }
}
