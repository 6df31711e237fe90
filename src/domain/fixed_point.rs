//! Exact decimal fixed-point arithmetic over a 256-bit mantissa.
//!
//! Per-second rates and cumulative indices carry 27 fractional digits on chain.
//! Binary floating point cannot hold them, so every value here is an unsigned
//! integer mantissa paired with a decimal scale: `value = mantissa / 10^scale`.

use ethnum::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest scale accepted for rate and index arithmetic (ray precision).
pub const MIN_SCALE: u32 = 27;
/// Largest scale accepted for rate and index arithmetic.
pub const MAX_SCALE: u32 = 36;
/// Extra digits carried through exponentiation before the final rounding.
const GUARD_DIGITS: u32 = 9;

const TEN: U256 = U256::new(10);

/// Arithmetic that cannot be carried out at the requested scale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecisionError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("decimal scale {requested} is below the minimum of {minimum}")]
    ScaleBelowMinimum { requested: u32, minimum: u32 },
    #[error("decimal scale {requested} exceeds the maximum of {maximum}")]
    ScaleAboveMaximum { requested: u32, maximum: u32 },
    #[error("{operation} overflows the 256-bit mantissa at scale {scale}")]
    Overflow { operation: &'static str, scale: u32 },
}

/// Error parsing a decimal string into a [`FixedPoint`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDecimalError {
    #[error("empty decimal string")]
    Empty,
    #[error("invalid decimal string: {0:?}")]
    Invalid(String),
    #[error("{digits} fractional digits exceeds the maximum of {maximum}")]
    TooManyFractionalDigits { digits: usize, maximum: u32 },
    #[error("decimal value out of range: {0:?}")]
    OutOfRange(String),
}

/// Rounding rule applied when digits are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    /// Round half away from zero (on the magnitude).
    #[default]
    HalfUp,
    /// Truncate toward zero.
    Down,
}

/// Validated decimal scale for rate and index arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalScale(u32);

impl DecimalScale {
    /// 27 digits, the native precision of on-chain rates.
    pub const RAY: DecimalScale = DecimalScale(MIN_SCALE);

    pub fn new(scale: u32) -> Result<Self, PrecisionError> {
        if scale < MIN_SCALE {
            return Err(PrecisionError::ScaleBelowMinimum {
                requested: scale,
                minimum: MIN_SCALE,
            });
        }
        if scale > MAX_SCALE {
            return Err(PrecisionError::ScaleAboveMaximum {
                requested: scale,
                maximum: MAX_SCALE,
            });
        }
        Ok(DecimalScale(scale))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for DecimalScale {
    fn default() -> Self {
        DecimalScale::RAY
    }
}

impl fmt::Display for DecimalScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-negative decimal number with an explicit scale.
#[derive(Debug, Clone, Copy)]
pub struct FixedPoint {
    mantissa: U256,
    scale: u32,
}

fn pow10(exp: u32) -> Option<U256> {
    let mut value = U256::ONE;
    for _ in 0..exp {
        value = value.checked_mul(TEN)?;
    }
    Some(value)
}

fn divide(numerator: U256, denominator: U256, rounding: Rounding) -> U256 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    match rounding {
        Rounding::HalfUp if remainder >= denominator - remainder && remainder != U256::ZERO => {
            quotient + U256::ONE
        }
        _ => quotient,
    }
}

/// Full 512-bit product as `(high, low)` halves.
fn widening_mul(a: U256, b: U256) -> (U256, U256) {
    let mask = U256::new(u128::MAX);
    let (a_lo, a_hi) = ((a & mask).as_u128(), (a >> 128u32).as_u128());
    let (b_lo, b_hi) = ((b & mask).as_u128(), (b >> 128u32).as_u128());

    let lo_lo = U256::new(a_lo) * U256::new(b_lo);
    let lo_hi = U256::new(a_lo) * U256::new(b_hi);
    let hi_lo = U256::new(a_hi) * U256::new(b_lo);
    let hi_hi = U256::new(a_hi) * U256::new(b_hi);

    let partial = lo_lo.wrapping_add(lo_hi << 128u32);
    let carry_a = partial < lo_lo;
    let low = partial.wrapping_add(hi_lo << 128u32);
    let carry_b = low < partial;

    let high = hi_hi
        + (lo_hi >> 128u32)
        + (hi_lo >> 128u32)
        + U256::new(carry_a as u128 + carry_b as u128);
    (high, low)
}

/// `a * b / divisor` through a 512-bit intermediate. `None` when the quotient
/// does not fit in 256 bits or the divisor is zero or at least 2^255.
fn mul_div(a: U256, b: U256, divisor: U256, rounding: Rounding) -> Option<U256> {
    if divisor == U256::ZERO || divisor >> 255u32 != U256::ZERO {
        return None;
    }
    let (high, low) = widening_mul(a, b);
    if high == U256::ZERO {
        return Some(divide(low, divisor, rounding));
    }
    if high >= divisor {
        return None;
    }

    // Schoolbook binary long division; `high < divisor` so the quotient fits.
    let mut remainder = high;
    let mut quotient = U256::ZERO;
    for bit in (0..256u32).rev() {
        remainder = (remainder << 1u32) | ((low >> bit) & U256::ONE);
        if remainder >= divisor {
            remainder -= divisor;
            quotient |= U256::ONE << bit;
        }
    }

    match rounding {
        Rounding::HalfUp if remainder != U256::ZERO && remainder >= divisor - remainder => {
            quotient.checked_add(U256::ONE)
        }
        _ => Some(quotient),
    }
}

impl FixedPoint {
    pub const fn zero() -> Self {
        FixedPoint {
            mantissa: U256::ZERO,
            scale: 0,
        }
    }

    pub const fn one() -> Self {
        FixedPoint {
            mantissa: U256::ONE,
            scale: 0,
        }
    }

    /// Interpret a raw integer amount with `scale` implied decimals, e.g. a
    /// 27-decimal on-chain word.
    pub const fn from_mantissa(mantissa: U256, scale: u32) -> Self {
        FixedPoint { mantissa, scale }
    }

    pub fn mantissa(&self) -> U256 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == U256::ZERO
    }

    /// Re-express the value at `scale` digits, rounding when digits are dropped.
    pub fn rescale(&self, scale: u32, rounding: Rounding) -> Result<Self, PrecisionError> {
        let overflow = PrecisionError::Overflow {
            operation: "rescale",
            scale,
        };
        let mantissa = match scale.cmp(&self.scale) {
            Ordering::Equal => self.mantissa,
            Ordering::Greater => {
                let factor = pow10(scale - self.scale).ok_or_else(|| overflow.clone())?;
                self.mantissa.checked_mul(factor).ok_or(overflow)?
            }
            Ordering::Less => {
                let factor = pow10(self.scale - scale).ok_or(overflow)?;
                divide(self.mantissa, factor, rounding)
            }
        };
        Ok(FixedPoint { mantissa, scale })
    }

    /// Exact product rounded half-up once to `scale` digits.
    pub fn mul(&self, rhs: &FixedPoint, scale: u32) -> Result<Self, PrecisionError> {
        let exact_scale = self.scale + rhs.scale;
        if let Some(product) = self.mantissa.checked_mul(rhs.mantissa) {
            return FixedPoint::from_mantissa(product, exact_scale).rescale(scale, Rounding::HalfUp);
        }

        let overflow = PrecisionError::Overflow {
            operation: "multiply",
            scale,
        };
        if scale >= exact_scale {
            return Err(overflow);
        }
        let divisor = pow10(exact_scale - scale).ok_or_else(|| overflow.clone())?;
        let mantissa =
            mul_div(self.mantissa, rhs.mantissa, divisor, Rounding::HalfUp).ok_or(overflow)?;
        Ok(FixedPoint { mantissa, scale })
    }

    /// Quotient rounded half-up to `scale` digits.
    pub fn div(&self, rhs: &FixedPoint, scale: u32) -> Result<Self, PrecisionError> {
        if rhs.is_zero() {
            return Err(PrecisionError::DivisionByZero);
        }
        let overflow = PrecisionError::Overflow {
            operation: "divide",
            scale,
        };

        // value = (a / 10^sa) / (b / 10^sb), wanted as an integer over 10^scale
        let shift = scale as i64 + rhs.scale as i64 - self.scale as i64;
        let (numerator, denominator) = if shift >= 0 {
            let factor = pow10(shift as u32).ok_or_else(|| overflow.clone())?;
            (self.mantissa.checked_mul(factor).ok_or(overflow)?, rhs.mantissa)
        } else {
            let factor = pow10((-shift) as u32).ok_or_else(|| overflow.clone())?;
            (self.mantissa, rhs.mantissa.checked_mul(factor).ok_or(overflow)?)
        };

        Ok(FixedPoint {
            mantissa: divide(numerator, denominator, Rounding::HalfUp),
            scale,
        })
    }

    /// Raise to a whole number of seconds by binary exponentiation.
    ///
    /// Intermediate products carry nine guard digits beyond `scale`, enough
    /// for exponents up to ~10^8 seconds, and the result is rounded half-up
    /// once to `scale`.
    pub fn pow(&self, exponent: u64, scale: u32) -> Result<Self, PrecisionError> {
        if scale > MAX_SCALE {
            return Err(PrecisionError::ScaleAboveMaximum {
                requested: scale,
                maximum: MAX_SCALE,
            });
        }
        let working = scale + GUARD_DIGITS;

        let mut base = self.rescale(working, Rounding::HalfUp)?;
        let mut result = FixedPoint::one().rescale(working, Rounding::HalfUp)?;
        let mut remaining = exponent;
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = result.mul(&base, working)?;
            }
            remaining >>= 1;
            if remaining > 0 {
                base = base.mul(&base, working)?;
            }
        }

        result.rescale(scale, Rounding::HalfUp)
    }

    /// Shortest decimal rendering: trailing fractional zeros are dropped.
    pub fn to_canonical_string(&self) -> String {
        let full = self.to_string();
        if !full.contains('.') {
            return full;
        }
        full.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl PartialEq for FixedPoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FixedPoint {}

impl PartialOrd for FixedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixedPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.scale.cmp(&other.scale) {
            Ordering::Equal => self.mantissa.cmp(&other.mantissa),
            Ordering::Less => {
                // If aligning overflows, self is larger than anything `other` can hold.
                match pow10(other.scale - self.scale).and_then(|f| self.mantissa.checked_mul(f)) {
                    Some(aligned) => aligned.cmp(&other.mantissa),
                    None => Ordering::Greater,
                }
            }
            Ordering::Greater => other.cmp(self).reverse(),
        }
    }
}

impl Default for FixedPoint {
    fn default() -> Self {
        FixedPoint::zero()
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}", digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}.{}", int_part, frac_part)
    }
}

impl FromStr for FixedPoint {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if unsigned.is_empty() {
            return Err(ParseDecimalError::Empty);
        }

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
            return Err(ParseDecimalError::Invalid(s.to_string()));
        }
        if frac_part.len() > MAX_SCALE as usize {
            return Err(ParseDecimalError::TooManyFractionalDigits {
                digits: frac_part.len(),
                maximum: MAX_SCALE,
            });
        }

        let mantissa = U256::from_str_radix(&format!("{}{}", int_part, frac_part), 10)
            .map_err(|_| ParseDecimalError::OutOfRange(s.to_string()))?;
        Ok(FixedPoint {
            mantissa,
            scale: frac_part.len() as u32,
        })
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FixedPoint::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint {
        FixedPoint::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_keeps_scale_and_display_pads() {
        let value = fp("1.000000100000000000000000000");
        assert_eq!(value.scale(), 27);
        assert_eq!(value.to_string(), "1.000000100000000000000000000");
        assert_eq!(value.to_canonical_string(), "1.0000001");

        assert_eq!(fp("0.05").to_string(), "0.05");
        assert_eq!(fp("42").to_string(), "42");
        assert_eq!(fp("42.000").to_canonical_string(), "42");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(FixedPoint::from_str(""), Err(ParseDecimalError::Empty));
        assert!(matches!(
            FixedPoint::from_str("-1.5"),
            Err(ParseDecimalError::Invalid(_))
        ));
        assert!(matches!(
            FixedPoint::from_str("1e27"),
            Err(ParseDecimalError::Invalid(_))
        ));
        assert!(matches!(
            FixedPoint::from_str(".5"),
            Err(ParseDecimalError::Invalid(_))
        ));
        assert!(matches!(
            FixedPoint::from_str("0.0000000000000000000000000000000000001"),
            Err(ParseDecimalError::TooManyFractionalDigits { digits: 37, .. })
        ));
    }

    #[test]
    fn test_equality_ignores_scale() {
        assert_eq!(fp("1.5"), fp("1.500000000000000000000000000"));
        assert!(fp("1.49") < fp("1.5"));
        assert!(fp("2") > fp("1.999999999999999999999999999"));
    }

    #[test]
    fn test_rescale_rounding_rules() {
        let value = fp("0.1234565");
        assert_eq!(
            value.rescale(6, Rounding::HalfUp).unwrap().to_string(),
            "0.123457"
        );
        assert_eq!(
            value.rescale(6, Rounding::Down).unwrap().to_string(),
            "0.123456"
        );
        assert_eq!(
            fp("0.1234564").rescale(6, Rounding::HalfUp).unwrap().to_string(),
            "0.123456"
        );
        assert_eq!(
            fp("2.5").rescale(3, Rounding::HalfUp).unwrap().to_string(),
            "2.500"
        );
    }

    #[test]
    fn test_mul_rounds_once_half_up() {
        let a = fp("2.5");
        let b = fp("0.000000000000000000000000003");
        // exact product 7.5e-27
        assert_eq!(
            a.mul(&b, 27).unwrap().to_string(),
            "0.000000000000000000000000008"
        );
        assert_eq!(fp("10.5").mul(&fp("2.5"), 2).unwrap().to_string(), "26.25");
    }

    #[test]
    fn test_mul_overflow_is_precision_error() {
        let huge = FixedPoint::from_mantissa(U256::MAX, 0);
        assert!(matches!(
            huge.mul(&fp("2"), 0),
            Err(PrecisionError::Overflow { operation: "multiply", .. })
        ));
    }

    #[test]
    fn test_div() {
        assert_eq!(fp("10").div(&fp("4"), 2).unwrap().to_string(), "2.50");
        assert_eq!(
            fp("1").div(&fp("3"), 27).unwrap().to_string(),
            "0.333333333333333333333333333"
        );
        assert_eq!(
            fp("2").div(&fp("3"), 27).unwrap().to_string(),
            "0.666666666666666666666666667"
        );
        assert_eq!(
            fp("1").div(&FixedPoint::zero(), 27),
            Err(PrecisionError::DivisionByZero)
        );
    }

    #[test]
    fn test_pow_small_exponents() {
        assert_eq!(fp("1.5").pow(3, 27).unwrap(), fp("3.375"));
        assert_eq!(fp("1.0000001").pow(0, 27).unwrap(), FixedPoint::one());
        assert_eq!(
            fp("1.000000001547125957863212448").pow(150, 27).unwrap().to_string(),
            "1.000000232068920427949710871"
        );
    }

    #[test]
    fn test_pow_matches_high_precision_reference() {
        // Reference: 1.0000001^4000 = 1.00040007999065973315252575450915...
        assert_eq!(
            fp("1.0000001").pow(4000, 27).unwrap().to_string(),
            "1.000400079990659733152525755"
        );
    }

    #[test]
    fn test_pow_year_of_seconds() {
        // 2% and 5% annual stability fees compounded over 31_536_000 seconds.
        assert_eq!(
            fp("1.000000000627937192491029810")
                .pow(31_536_000, 27)
                .unwrap()
                .to_string(),
            "1.019999999999999999967999501"
        );
        assert_eq!(
            fp("1.000000001547125957863212448")
                .pow(31_536_000, 27)
                .unwrap()
                .to_string(),
            "1.049999999999999999965368548"
        );
        assert_eq!(
            fp("1.000000000627937192491029810")
                .pow(50_000_000, 27)
                .unwrap()
                .to_string(),
            "1.031894940065125700513008174"
        );
    }

    #[test]
    fn test_pow_at_maximum_scale() {
        // Reference: 1.04999999999999999996536854780076149989...
        assert_eq!(
            fp("1.000000001547125957863212448")
                .pow(31_536_000, MAX_SCALE)
                .unwrap()
                .to_string(),
            "1.049999999999999999965368547800761500"
        );
        assert_eq!(
            fp("1.0000001").pow(4000, 30).unwrap().to_string(),
            "1.000400079990659733152525754509"
        );
    }

    #[test]
    fn test_widening_mul_div() {
        let big = U256::ONE << 255u32;
        // 2^255 * 4 / 8 = 2^254
        assert_eq!(
            mul_div(big, U256::new(4), U256::new(8), Rounding::Down),
            Some(U256::ONE << 254u32)
        );
        // (2^256 - 1)^2 / (2^254) does not fit
        assert_eq!(
            mul_div(U256::MAX, U256::MAX, U256::ONE << 254u32, Rounding::Down),
            None
        );
        // 3 * (2^255 + 1) / 2 = 3 * 2^254 + 1.5
        let odd = big + U256::ONE;
        assert_eq!(
            mul_div(odd, U256::new(3), U256::new(2), Rounding::HalfUp),
            Some(U256::new(3) * (U256::ONE << 254u32) + U256::new(2))
        );
        assert_eq!(
            mul_div(odd, U256::new(3), U256::new(2), Rounding::Down),
            Some(U256::new(3) * (U256::ONE << 254u32) + U256::ONE)
        );
    }

    #[test]
    fn test_mul_takes_wide_path_at_high_scale() {
        let a = fp("1.000000000000000000000000000000000001")
            .rescale(45, Rounding::Down)
            .unwrap();
        let product = a.mul(&a, 36).unwrap();
        assert_eq!(product.to_string(), "1.000000000000000000000000000000000002");
    }

    #[test]
    fn test_pow_rejects_scale_above_maximum() {
        assert_eq!(
            fp("1.1").pow(2, MAX_SCALE + 1),
            Err(PrecisionError::ScaleAboveMaximum {
                requested: MAX_SCALE + 1,
                maximum: MAX_SCALE
            })
        );
    }

    #[test]
    fn test_decimal_scale_bounds() {
        assert_eq!(DecimalScale::new(27).unwrap(), DecimalScale::RAY);
        assert_eq!(DecimalScale::new(36).unwrap().get(), 36);
        assert_eq!(
            DecimalScale::new(18),
            Err(PrecisionError::ScaleBelowMinimum {
                requested: 18,
                minimum: 27
            })
        );
        assert!(matches!(
            DecimalScale::new(40),
            Err(PrecisionError::ScaleAboveMaximum { .. })
        ));
    }

    #[test]
    fn test_json_serializes_as_string() {
        let value = fp("1.000000000627937192491029810");
        let json = serde_json::to_value(value).unwrap();
        assert_eq!(json, serde_json::json!("1.000000000627937192491029810"));
        let back: FixedPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }
}
