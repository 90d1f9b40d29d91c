//! Fixed-point decimal arithmetic for the control loop.
//!
//! A [`Decimal`] is a signed unscaled integer plus a decimal scale
//! (`value = unscaled / 10^scale`). Every operation that can drop digits takes
//! an explicit [`Rounding`] mode, so cycle times, feed-forward values and
//! controller outputs are reproducible bit for bit. Binary floating point is
//! never used inside the loop.
//!
//! Inputs are truncated to a few digits before they reach the loop (see
//! [`crate::config`]), so magnitudes stay far below the `i128` range. The
//! operators still saturate at the `i128` bounds instead of overflowing.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::str::FromStr;

use thiserror::Error;

/// Largest scale accepted by the parser and by `rescale`.
pub const MAX_SCALE: u32 = 30;

/// How to drop digits that do not fit the target scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    /// Toward negative infinity.
    Floor,
    /// Toward positive infinity.
    Ceiling,
    /// To nearest, ties away from zero.
    HalfUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal literal: {0:?}")]
pub struct ParseDecimalError(pub String);

#[derive(Debug, Clone, Copy, Default)]
pub struct Decimal {
    unscaled: i128,
    scale: u32,
}

/// `v × 10^n`, `None` on overflow.
#[inline]
fn widen(v: i128, n: u32) -> Option<i128> {
    if v == 0 {
        return Some(0);
    }
    10i128.checked_pow(n).and_then(|p| v.checked_mul(p))
}

#[inline]
const fn saturated(positive: bool) -> i128 {
    if positive { i128::MAX } else { i128::MIN }
}

/// Divide `n` by `d` (non-zero), rounding the exact quotient with `mode`.
fn div_round(n: i128, d: i128, mode: Rounding) -> i128 {
    // only i128::MIN / -1 overflows
    let Some(q) = n.checked_div(d) else {
        return i128::MAX;
    };
    let r = n % d;
    if r == 0 {
        return q;
    }
    let negative = (n < 0) != (d < 0);
    match mode {
        Rounding::Down => q,
        Rounding::Floor if negative => q - 1,
        Rounding::Floor => q,
        Rounding::Ceiling if negative => q,
        Rounding::Ceiling => q + 1,
        Rounding::HalfUp => {
            if r.unsigned_abs() * 2 >= d.unsigned_abs() {
                if negative { q - 1 } else { q + 1 }
            } else {
                q
            }
        }
    }
}

impl Decimal {
    pub const ZERO: Self = Self::new(0, 0);
    pub const ONE: Self = Self::new(1, 0);

    /// `unscaled / 10^scale`.
    #[inline]
    pub const fn new(unscaled: i128, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    #[inline]
    pub const fn from_int(v: i64) -> Self {
        Self::new(v as i128, 0)
    }

    /// Zero carrying `scale` fractional digits.
    #[inline]
    pub const fn zero(scale: u32) -> Self {
        Self::new(0, scale)
    }

    #[inline]
    pub const fn unscaled(self) -> i128 {
        self.unscaled
    }

    #[inline]
    pub const fn scale(self) -> u32 {
        self.scale
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.unscaled == 0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.unscaled < 0
    }

    /// -1, 0 or 1.
    #[inline]
    pub const fn signum(self) -> i32 {
        if self.unscaled > 0 {
            1
        } else if self.unscaled < 0 {
            -1
        } else {
            0
        }
    }

    #[inline]
    pub const fn abs(self) -> Self {
        Self::new(self.unscaled.saturating_abs(), self.scale)
    }

    /// Both unscaled values brought to the larger of the two scales, or
    /// `None` when the wider one does not fit.
    fn aligned(self, other: Self) -> Option<(i128, i128, u32)> {
        match self.scale.cmp(&other.scale) {
            Ordering::Equal => Some((self.unscaled, other.unscaled, self.scale)),
            Ordering::Less => Some((
                widen(self.unscaled, other.scale - self.scale)?,
                other.unscaled,
                other.scale,
            )),
            Ordering::Greater => Some((
                self.unscaled,
                widen(other.unscaled, self.scale - other.scale)?,
                self.scale,
            )),
        }
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let (a, b, scale) = self.aligned(rhs)?;
        a.checked_add(b).map(|v| Self::new(v, scale))
    }

    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let scale = self.scale.checked_add(rhs.scale)?;
        self.unscaled
            .checked_mul(rhs.unscaled)
            .map(|v| Self::new(v, scale))
    }

    /// Change the number of fractional digits. Widening is exact and
    /// saturates when the value does not fit.
    pub fn rescale(self, scale: u32, mode: Rounding) -> Self {
        let scale = scale.min(MAX_SCALE);
        if scale >= self.scale {
            let v = widen(self.unscaled, scale - self.scale)
                .unwrap_or(saturated(self.unscaled > 0));
            Self::new(v, scale)
        } else {
            // a divisor beyond i128 leaves only the rounding of a sub-unit value
            let v = match 10i128.checked_pow(self.scale - scale) {
                Some(p) => div_round(self.unscaled, p, mode),
                None => div_round(self.signum().into(), i128::MAX, mode),
            };
            Self::new(v, scale)
        }
    }

    /// `self / rhs` with `scale` fractional digits; `None` when `rhs` is zero
    /// or the quotient does not fit.
    pub fn div(self, rhs: Self, scale: u32, mode: Rounding) -> Option<Self> {
        if rhs.unscaled == 0 {
            return None;
        }
        let scale = scale.min(MAX_SCALE);
        // result.unscaled = self.unscaled * 10^(scale + rhs.scale - self.scale) / rhs.unscaled
        let shift = i64::from(scale) + i64::from(rhs.scale) - i64::from(self.scale);
        let by = u32::try_from(shift.unsigned_abs()).ok()?;
        let (n, d) = if shift >= 0 {
            (widen(self.unscaled, by)?, rhs.unscaled)
        } else {
            (self.unscaled, widen(rhs.unscaled, by)?)
        };
        Some(Self::new(div_round(n, d, mode), scale))
    }

    /// Integer part, truncated toward zero and saturated to the `i64` range.
    pub fn trunc_to_i64(self) -> i64 {
        let v = self.rescale(0, Rounding::Down).unscaled;
        i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
    }

    /// Thousandths, truncated toward zero and saturated to the `i32` range.
    pub fn to_milli(self) -> i32 {
        let v = self.rescale(3, Rounding::Down).unscaled;
        i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.aligned(*other) {
            Some((a, b, _)) => a.cmp(&b),
            // the widened side is beyond i128, so its sign decides
            None if self.scale < other.scale => self.unscaled.cmp(&0),
            None => 0.cmp(&other.unscaled),
        }
    }
}

impl Add for Decimal {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.checked_add(rhs).unwrap_or_else(|| {
            Self::new(saturated(self > -rhs), self.scale.max(rhs.scale))
        })
    }
}

impl AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Decimal {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + -rhs
    }
}

impl Neg for Decimal {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(self.unscaled.saturating_neg(), self.scale)
    }
}

/// Exact product; the scale is the sum of both scales. Saturates on overflow.
impl Mul for Decimal {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.checked_mul(rhs).unwrap_or_else(|| {
            let positive = self.is_negative() == rhs.is_negative();
            Self::new(saturated(positive), self.scale.saturating_add(rhs.scale))
        })
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc + v)
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Self::from_int(v)
    }
}

impl From<i32> for Decimal {
    fn from(v: i32) -> Self {
        Self::from_int(i64::from(v))
    }
}

impl From<u32> for Decimal {
    fn from(v: u32) -> Self {
        Self::from_int(i64::from(v))
    }
}

/// Renders exactly `scale` fractional digits, e.g. `-0.050` for (-50, 3).
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int}.{frac}")
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    /// Accepts `[+-]digits[.digits]`; the scale is the number of fractional
    /// digits written, so `"110.00"` parses with scale 2.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let t = s.trim();
        let (negative, body) = match t.as_bytes().first() {
            Some(b'-') => (true, &t[1..]),
            Some(b'+') => (false, &t[1..]),
            _ => (false, t),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let scale = u32::try_from(frac.len()).map_err(|_| err())?;
        if scale > MAX_SCALE {
            return Err(err());
        }
        let mut unscaled: i128 = 0;
        for b in int.bytes().chain(frac.bytes()) {
            unscaled = unscaled
                .checked_mul(10)
                .and_then(|v| v.checked_add(i128::from(b - b'0')))
                .ok_or_else(err)?;
        }
        Ok(Self::new(if negative { -unscaled } else { unscaled }, scale))
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

    #[rstest]
    #[case("1.2345", 3, Rounding::Down, "1.234")]
    #[case("-1.2345", 3, Rounding::Down, "-1.234")]
    #[case("1.2345", 3, Rounding::Floor, "1.234")]
    #[case("-1.2345", 3, Rounding::Floor, "-1.235")]
    #[case("1.2341", 3, Rounding::Ceiling, "1.235")]
    #[case("-1.2349", 3, Rounding::Ceiling, "-1.234")]
    #[case("1.2345", 3, Rounding::HalfUp, "1.235")]
    #[case("-1.2345", 3, Rounding::HalfUp, "-1.235")]
    #[case("1.2344", 3, Rounding::HalfUp, "1.234")]
    #[case("10.00002", 3, Rounding::HalfUp, "10.000")]
    #[case("0.5", 3, Rounding::Floor, "0.500")]
    fn rescale_modes(
        #[case] input: &str,
        #[case] scale: u32,
        #[case] mode: Rounding,
        #[case] expected: &str,
    ) {
        assert_eq!(d(input).rescale(scale, mode).to_string(), expected);
    }

    #[test]
    fn division_matches_control_constants() {
        // pulses-per-second constant for 6 pulses per revolution
        let rpm = Decimal::from_int(6).div(Decimal::from_int(60), 6, Rounding::Down);
        assert_eq!(rpm.map(|v| v.to_string()).as_deref(), Some("0.100000"));
        // gain per pulse rounds up
        let p = d("1.0").div(Decimal::from_int(6), 6, Rounding::Ceiling);
        assert_eq!(p.map(|v| v.to_string()).as_deref(), Some("0.166667"));
        let ff = d("55").div(d("110.00"), 6, Rounding::Down);
        assert_eq!(ff, Some(d("0.5")));
    }

    #[test]
    fn division_by_zero_is_none() {
        assert_eq!(Decimal::ONE.div(Decimal::zero(6), 2, Rounding::HalfUp), None);
    }

    #[test]
    fn negative_scale_shift_in_division() {
        // dividend scale larger than target + divisor scale
        let q = d("1.234567").div(Decimal::from_int(2), 2, Rounding::HalfUp);
        assert_eq!(q.map(|v| v.to_string()).as_deref(), Some("0.62"));
    }

    #[test]
    fn comparisons_ignore_scale() {
        assert_eq!(d("0.5"), d("0.500000"));
        assert!(d("-0.001") < Decimal::ZERO);
        assert!(d("1.0001") > Decimal::ONE);
    }

    #[test]
    fn display_pads_fraction() {
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(12, 0).to_string(), "12");
        assert_eq!(Decimal::zero(2).to_string(), "0.00");
    }

    #[rstest]
    #[case("")]
    #[case("-")]
    #[case(".")]
    #[case("1.2.3")]
    #[case("1e5")]
    #[case("abc")]
    #[case("99999999999999999999999999999999999999999")]
    fn parse_rejects_garbage(#[case] s: &str) {
        assert!(s.parse::<Decimal>().is_err());
    }

    #[test]
    fn parse_keeps_written_scale() {
        let v = d("110.00");
        assert_eq!(v.scale(), 2);
        assert_eq!(d("+.5"), d("0.5"));
        assert_eq!(d("-3"), Decimal::from_int(-3));
    }

    #[test]
    fn saturating_conversions() {
        assert_eq!(d("-12.9").trunc_to_i64(), -12);
        assert_eq!(Decimal::new(i128::MAX, 0).trunc_to_i64(), i64::MAX);
        assert_eq!(d("-0.9999").to_milli(), -999);
        assert_eq!(d("1.000").to_milli(), 1000);
    }

    #[test]
    fn overflow_saturates_instead_of_panicking() {
        let wide = d("60.000000000000000000000000000");
        // one second of cycle time at six pulses per revolution
        let huge = wide * (d("1.000000") * d("0.100000"));
        assert_eq!(huge.unscaled(), i128::MAX);
        assert_eq!((-huge).unscaled(), -i128::MAX);
        assert!(wide.checked_mul(d("0.010000000000")).is_none());

        let sum = Decimal::new(i128::MAX, 0) + Decimal::ONE;
        assert_eq!(sum.unscaled(), i128::MAX);
        let diff = Decimal::new(i128::MIN + 1, 0) - Decimal::from_int(2);
        assert_eq!(diff.unscaled(), i128::MIN);
        assert_eq!(Decimal::new(i128::MIN, 0).abs().unscaled(), i128::MAX);
    }

    #[test]
    fn misaligned_extremes_still_order() {
        let big = Decimal::new(i128::MAX / 2, 0);
        let fine = Decimal::new(1, 20);
        assert!(big > fine);
        assert!(-big < fine);
        assert!(Decimal::zero(45) < Decimal::new(1, 0));
        assert_eq!(Decimal::new(7, 45).rescale(3, Rounding::Ceiling), Decimal::new(1, 3));
        assert!(Decimal::new(7, 45).rescale(3, Rounding::HalfUp).is_zero());
        assert!(Decimal::ONE.div(Decimal::new(1, 0), 30, Rounding::Down).is_some());
        assert_eq!(big.div(fine, 30, Rounding::Down), None);
    }

    proptest! {
        #[test]
        fn floor_and_ceiling_bracket_value(u in -1_000_000_000i64..1_000_000_000, s in 0u32..9, t in 0u32..9) {
            let v = Decimal::new(i128::from(u), s);
            let lo = v.rescale(t, Rounding::Floor);
            let hi = v.rescale(t, Rounding::Ceiling);
            prop_assert!(lo <= v && v <= hi);
            prop_assert!((hi - lo) <= Decimal::new(1, t));
        }

        #[test]
        fn down_never_grows_magnitude(u in -1_000_000_000i64..1_000_000_000, s in 0u32..9, t in 0u32..9) {
            let v = Decimal::new(i128::from(u), s);
            prop_assert!(v.rescale(t, Rounding::Down).abs() <= v.abs());
        }
    }
}
