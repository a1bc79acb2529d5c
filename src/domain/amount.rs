//! Fixed-width big-integer amounts in smallest units.
//!
//! Every token quantity and base-asset cost in the ledger is a `u128` count of
//! smallest units (lamport-style). Arithmetic is checked or saturating; the
//! only place rounding happens is the proportional cost trim, which rounds to
//! nearest. Conversion to display precision goes through [`Self::to_ui`].

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A non-negative token quantity or cost in smallest units.
///
/// Serializes to a JSON string; u128 does not fit in a JSON number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawAmount(pub u128);

#[derive(Debug, Error)]
#[error("invalid raw amount: {0}")]
pub struct AmountParseError(String);

impl RawAmount {
    pub const ZERO: RawAmount = RawAmount(0);

    pub fn new(units: u128) -> Self {
        RawAmount(units)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating subtraction; the ledger never goes negative.
    pub fn saturating_sub(self, rhs: RawAmount) -> RawAmount {
        RawAmount(self.0.saturating_sub(rhs.0))
    }

    pub fn checked_add(self, rhs: RawAmount) -> Option<RawAmount> {
        self.0.checked_add(rhs.0).map(RawAmount)
    }

    pub fn min(self, rhs: RawAmount) -> RawAmount {
        RawAmount(self.0.min(rhs.0))
    }

    /// `round(self × numerator / denominator)`, round-half-up.
    ///
    /// This is the proportional cost trim: closing `numerator` out of
    /// `denominator` remaining tokens closes the same share of the remaining
    /// cost basis. The product is carried through 256 bits, so the trim is
    /// exact over the full u128 range. Returns zero when the denominator is
    /// zero.
    pub fn proportion(self, numerator: RawAmount, denominator: RawAmount) -> RawAmount {
        if denominator.0 == 0 {
            return RawAmount::ZERO;
        }
        RawAmount(mul_div_round(self.0, numerator.0, denominator.0))
    }

    /// `floor(self × fraction)` where fraction is a Decimal in [0, 1].
    ///
    /// Computed as `self × mantissa / 10^scale` in integer math, so the floor
    /// is exact even for quantities wider than an f64 mantissa.
    pub fn scale_floor(self, fraction: Decimal) -> RawAmount {
        let inner = fraction.inner();
        if inner.is_sign_negative() || inner.is_zero() {
            return RawAmount::ZERO;
        }
        let mantissa = inner.mantissa() as u128;
        let divisor = 10u128.pow(inner.scale());
        RawAmount(mul_div_floor(self.0, mantissa, divisor))
    }

    /// One smallest unit shy of a hundredth of a whole token, the absolute
    /// dust floor used by the reduction engine.
    pub fn dust_threshold(decimals: u8) -> RawAmount {
        RawAmount(10u128.pow(decimals as u32) / 100)
    }

    /// Convert to display precision given the token's decimals.
    pub fn to_ui(self, decimals: u8) -> Decimal {
        let divisor = 10f64.powi(decimals as i32);
        Decimal::from_f64_lossy(self.0 as f64 / divisor)
    }

    /// USD value at the given per-whole-token price.
    pub fn usd_value(self, price_usd: Decimal, decimals: u8) -> Decimal {
        self.to_ui(decimals) * price_usd
    }
}

/// 256-bit product of two u128 values as (hi, lo) halves.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1 << 64) - 1;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// `floor((hi·2^128 + lo) / divisor)` by restoring long division, saturating
/// to `u128::MAX` when the quotient does not fit. `divisor` must be non-zero.
fn wide_div(hi: u128, lo: u128, divisor: u128) -> u128 {
    if hi == 0 {
        return lo / divisor;
    }
    let (mut hi, mut lo) = (hi, lo);
    let mut quotient = 0u128;
    let mut remainder = 0u128;
    let mut saturated = false;

    for _ in 0..256 {
        let next_bit = hi >> 127;
        hi = (hi << 1) | (lo >> 127);
        lo <<= 1;

        // If the remainder's top bit shifts out, the true remainder is
        // 2^128 + remainder, which is always >= divisor.
        let overflowed = remainder >> 127 == 1;
        remainder = (remainder << 1) | next_bit;
        let bit = if overflowed {
            remainder = remainder.wrapping_sub(divisor);
            1
        } else if remainder >= divisor {
            remainder -= divisor;
            1
        } else {
            0
        };
        saturated |= quotient >> 127 == 1;
        quotient = (quotient << 1) | bit;
    }
    if saturated {
        u128::MAX
    } else {
        quotient
    }
}

/// `round(a × b / divisor)`, round-half-up, exact through 256 bits.
fn mul_div_round(a: u128, b: u128, divisor: u128) -> u128 {
    let (mut hi, lo) = widening_mul(a, b);
    let (lo, carry) = lo.overflowing_add(divisor / 2);
    hi += carry as u128;
    wide_div(hi, lo, divisor)
}

/// `floor(a × b / divisor)`, exact through 256 bits.
fn mul_div_floor(a: u128, b: u128, divisor: u128) -> u128 {
    let (hi, lo) = widening_mul(a, b);
    wide_div(hi, lo, divisor)
}

impl fmt::Display for RawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RawAmount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>()
            .map(RawAmount)
            .map_err(|_| AmountParseError(s.to_string()))
    }
}

impl Serialize for RawAmount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for RawAmount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let amount: RawAmount = "340282366920938463463374607431768211455".parse().unwrap();
        assert_eq!(amount.0, u128::MAX);
        assert_eq!(amount.to_string().parse::<RawAmount>().unwrap(), amount);
    }

    #[test]
    fn test_parse_rejects_negative() {
        assert!("-1".parse::<RawAmount>().is_err());
        assert!("abc".parse::<RawAmount>().is_err());
    }

    #[test]
    fn test_proportion_rounds_half_up() {
        // 10 * 1 / 3 = 3.33.. -> 3; 10 * 1 / 4 = 2.5 -> 3
        assert_eq!(
            RawAmount(10).proportion(RawAmount(1), RawAmount(3)),
            RawAmount(3)
        );
        assert_eq!(
            RawAmount(10).proportion(RawAmount(1), RawAmount(4)),
            RawAmount(3)
        );
    }

    #[test]
    fn test_proportion_full_share_is_exact() {
        let cost = RawAmount(999_999_937);
        assert_eq!(cost.proportion(RawAmount(55), RawAmount(55)), cost);
    }

    #[test]
    fn test_proportion_large_values_do_not_overflow() {
        // The product needs more than 128 bits here; the result must still be
        // exact. (u128::MAX / 2) * 3 / 4 rounds to 2^126 + 2^125 - 1.
        let cost = RawAmount(u128::MAX / 2);
        assert_eq!(
            cost.proportion(RawAmount(3), RawAmount(4)),
            RawAmount(127_605_887_595_351_923_798_765_477_786_913_079_295)
        );
        assert_eq!(cost.proportion(cost, cost), cost);
        assert_eq!(
            RawAmount(u128::MAX).proportion(RawAmount(7), RawAmount(7)),
            RawAmount(u128::MAX)
        );
    }

    #[test]
    fn test_proportion_zero_denominator() {
        assert_eq!(
            RawAmount(10).proportion(RawAmount(1), RawAmount::ZERO),
            RawAmount::ZERO
        );
    }

    #[test]
    fn test_scale_floor() {
        let half = Decimal::from_str_canonical("0.5").unwrap();
        assert_eq!(RawAmount(101).scale_floor(half), RawAmount(50));
        assert_eq!(RawAmount(0).scale_floor(half), RawAmount::ZERO);
    }

    #[test]
    fn test_scale_floor_exact_beyond_f64_precision() {
        // (2^100 + 3) / 2 floors to 2^99 + 1; an f64 intermediate would lose
        // the low bits and return 2^99.
        let half = Decimal::from_str_canonical("0.5").unwrap();
        let qty = RawAmount((1u128 << 100) + 3);
        assert_eq!(qty.scale_floor(half), RawAmount((1u128 << 99) + 1));
    }

    #[test]
    fn test_scale_floor_negative_fraction_is_zero() {
        let neg = Decimal::from_str_canonical("-0.5").unwrap();
        assert_eq!(RawAmount(100).scale_floor(neg), RawAmount::ZERO);
    }

    #[test]
    fn test_dust_threshold() {
        // 0.01 token at 9 decimals = 10_000_000 smallest units
        assert_eq!(RawAmount::dust_threshold(9), RawAmount(10_000_000));
        assert_eq!(RawAmount::dust_threshold(0), RawAmount::ZERO);
    }

    #[test]
    fn test_usd_value() {
        let qty = RawAmount(2_000_000_000); // 2 tokens at 9 decimals
        let price = Decimal::from_str_canonical("1.5").unwrap();
        assert_eq!(qty.usd_value(price, 9).to_canonical_string(), "3");
    }

    #[test]
    fn test_json_string_serialization() {
        let amount = RawAmount(12345);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"12345\"");
        let back: RawAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
