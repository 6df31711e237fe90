//! Signed token amounts.
//!
//! Debt deltas are negative on repayment, while [`FixedPoint`] is unsigned, so an
//! amount is a sign plus a magnitude. Restatement scales the magnitude and
//! keeps the sign.

use super::fixed_point::{FixedPoint, ParseDecimalError, PrecisionError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Native precision of debt token amounts (18 decimals).
pub const AMOUNT_SCALE: u32 = 18;

/// Signed decimal amount of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    negative: bool,
    magnitude: FixedPoint,
}

impl Amount {
    pub fn new(negative: bool, magnitude: FixedPoint) -> Self {
        // Zero has a single representation.
        Amount {
            negative: negative && !magnitude.is_zero(),
            magnitude,
        }
    }

    pub fn zero() -> Self {
        Amount::new(false, FixedPoint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn magnitude(&self) -> FixedPoint {
        self.magnitude
    }

    /// Multiply by an interest index, rounding the exact product once
    /// (half-up on the magnitude) to [`AMOUNT_SCALE`] decimals.
    pub fn scaled_by(&self, index: &FixedPoint) -> Result<Amount, PrecisionError> {
        let magnitude = self.magnitude.mul(index, AMOUNT_SCALE)?;
        Ok(Amount::new(self.negative, magnitude))
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

impl FromStr for Amount {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.strip_prefix('-') {
            Some(rest) => Ok(Amount::new(true, FixedPoint::from_str(rest)?)),
            None => Ok(Amount::new(false, FixedPoint::from_str(trimmed)?)),
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
