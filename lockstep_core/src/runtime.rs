//! Per-axis loop state owned by the coordinator.

use crate::config::OUTPUT_SCALE;
use crate::fixed_point::Decimal;

/// Index of the previous value in the two-slot histories.
const PREV: usize = 0;
/// Index of the current value.
const CUR: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisRuntime {
    totals: [i64; 2],
    outputs: [Decimal; 2],
    target_acc: Decimal,
    target: i64,
    actual: i64,
}

impl Default for AxisRuntime {
    fn default() -> Self {
        Self {
            totals: [0; 2],
            outputs: [Decimal::zero(OUTPUT_SCALE); 2],
            target_acc: Decimal::ZERO,
            target: 0,
            actual: 0,
        }
    }
}

/// Pulse counts produced by [`AxisRuntime::record_total`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseDelta {
    /// current - previous raw total
    pub raw: i64,
    /// `raw` signed by the previous commanded output
    pub signed: i64,
}

impl AxisRuntime {
    #[inline]
    pub const fn target(&self) -> i64 {
        self.target
    }

    #[inline]
    pub const fn actual(&self) -> i64 {
        self.actual
    }

    /// Exact fractional target accumulator.
    #[inline]
    pub const fn target_accumulator(&self) -> Decimal {
        self.target_acc
    }

    /// Output committed on the last verified tick.
    #[inline]
    pub const fn output(&self) -> Decimal {
        self.outputs[CUR]
    }

    /// Add a setpoint delta; the integer target truncates toward zero.
    pub fn advance_target(&mut self, delta: Decimal) {
        self.target_acc += delta;
        self.target = self.target_acc.trunc_to_i64();
    }

    /// Shift in a new raw encoder total and update the actual position.
    ///
    /// The encoder carries no direction, so the delta takes the sign of the
    /// output commanded on the previous tick.
    pub fn record_total(&mut self, raw_total: i32) -> PulseDelta {
        self.totals[PREV] = self.totals[CUR];
        self.totals[CUR] = i64::from(raw_total);
        self.outputs[PREV] = self.outputs[CUR];

        let raw = self.totals[CUR] - self.totals[PREV];
        let signed = i64::from(self.outputs[PREV].signum()) * raw;
        self.actual = self.actual.saturating_add(signed);
        PulseDelta { raw, signed }
    }

    /// Persist this tick's output for the next tick's sign recovery.
    pub fn commit_output(&mut self, output: Decimal) {
        self.outputs[CUR] = output;
    }

    /// Zero the two-slot histories (totals and outputs).
    pub fn clear_history(&mut self) {
        self.totals = [0; 2];
        self.outputs = [Decimal::zero(OUTPUT_SCALE); 2];
    }

    /// Zero everything: positions, targets, accumulator and histories.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
