//! Fixed-point decimal price type
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Equality is exact: two prices are equal only if their decimal values are.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypeError;

/// Instrument price as an exact decimal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Absolute difference between two prices, or None if it does not fit
    /// in a `Decimal`.
    pub fn checked_abs_diff(&self, other: Price) -> Option<Decimal> {
        self.0.checked_sub(other.0).map(|d| d.abs())
    }
}

impl FromStr for Price {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidPrice(format!("{s}: {e}")))
    }
}

impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_price_parse() {
        let p: Price = "101.25".parse().unwrap();
        assert_eq!(p.as_decimal(), Decimal::new(10125, 2));
        assert!("abc".parse::<Price>().is_err());
    }

    #[test]
    fn test_exact_equality_ignores_scale() {
        let a: Price = "100".parse().unwrap();
        let b: Price = "100.00".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, "100.0001".parse::<Price>().unwrap());
    }

    #[test]
    fn test_abs_diff() {
        let a = Price::from_u64(100);
        let b = Price::from_u64(120);
        assert_eq!(a.checked_abs_diff(b), Some(Decimal::from(20)));
        assert_eq!(b.checked_abs_diff(a), Some(Decimal::from(20)));
    }

    #[test]
    fn test_abs_diff_overflow_is_none() {
        let max = Price::new(Decimal::MAX);
        let min = Price::new(Decimal::MIN);
        assert_eq!(max.checked_abs_diff(Price::ZERO), Some(Decimal::MAX));
        assert_eq!(max.checked_abs_diff(min), None);
        assert_eq!(min.checked_abs_diff(max), None);
    }

    proptest! {
        #[test]
        fn prop_abs_diff_symmetric(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let pa = Price::from_u64(a);
            let pb = Price::from_u64(b);
            prop_assert_eq!(pa.checked_abs_diff(pb), pb.checked_abs_diff(pa));
            prop_assert!(pa.checked_abs_diff(pb).unwrap() >= Decimal::ZERO);
        }
    }
}
