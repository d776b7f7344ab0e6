//! Amount type for handling monetary values stored with two decimal places.
//!
//! This module provides the `Amount` type which wraps `Decimal`. Amounts are written to the ledger
//! as plain decimal text (`-1234.50`) and can be rendered for people with a dollar sign and commas.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// The number of decimal places an `Amount` is normalized to.
pub const SCALE: u32 = 2;

/// Represents a monetary amount.
///
/// # Examples
///
/// Parsing plain text, with or without a dollar sign and thousands separators:
/// ```
/// # use fintrack::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("-5000.5").unwrap();
/// let b = Amount::from_str("-$5,000.50").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "-5000.5");
/// assert_eq!(a.rescaled().to_string(), "-5000.50");
/// assert_eq!(a.money(), "-$5,000.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Creates a new Amount from a Decimal value.
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns the amount rescaled to two decimal places, rounding half away from zero.
    pub fn rescaled(&self) -> Self {
        let mut v = self
            .0
            .round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        v.rescale(SCALE);
        Self(v)
    }

    /// Adds `rhs`, returning `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Subtracts `rhs`, returning `None` on overflow.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Renders the amount for people, e.g. `-$60,000.00`.
    pub fn money(&self) -> String {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.0.abs().to_f64().unwrap_or_default();
        format!("{sign}${}", format_num::format_num!(",.2", num))
    }
}

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // Remove dollar sign if present
        let without_dollar = if let Some(after_minus) = trimmed.strip_prefix('-') {
            match after_minus.strip_prefix('$') {
                Some(after_dollar) => format!("-{after_dollar}"),
                None => trimmed.to_string(),
            }
        } else if let Some(after_dollar) = trimmed.strip_prefix('$') {
            after_dollar.to_string()
        } else {
            trimmed.to_string()
        };

        // Remove commas (thousand separators)
        let without_commas = without_dollar.replace(',', "");

        let value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        Ok(Amount(value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Saturates at the `Decimal` bounds instead of panicking. Use `checked_add` where overflow must be
/// reported.
impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0.saturating_add(rhs.0))
    }
}

/// Saturates at the `Decimal` bounds instead of panicking.
impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    #[test]
    fn test_overflow() {
        let max = Amount::new(Decimal::MAX);
        assert_eq!(max.checked_add(amt("1")), None);
        assert_eq!(Amount::new(Decimal::MIN).checked_sub(amt("1")), None);
        assert_eq!(amt("1.50").checked_add(amt("2")), Some(amt("3.50")));
        assert_eq!(max + max, max);
        assert_eq!(Amount::new(Decimal::MIN) - max, Amount::new(Decimal::MIN));
    }

    #[test]
    fn test_parse_plain() {
        assert_eq!(amt("68.50").value(), Decimal::from_str("68.50").unwrap());
    }

    #[test]
    fn test_parse_negative_with_dollar_sign() {
        assert_eq!(amt("-$50.00").value(), Decimal::from_str("-50.00").unwrap());
    }

    #[test]
    fn test_parse_with_commas() {
        assert_eq!(amt("$1,234,567.89").value(), Decimal::from_str("1234567.89").unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Amount::from_str("twelve").is_err());
        assert!(Amount::from_str("").is_err());
    }

    #[test]
    fn test_display_is_plain_decimal() {
        assert_eq!(amt("5000.00").to_string(), "5000.00");
        assert_eq!(amt("-$7.5").to_string(), "-7.5");
    }

    #[test]
    fn test_rescale_rounds_half_up() {
        assert_eq!(amt("10.005").rescaled().to_string(), "10.01");
        assert_eq!(amt("10.004").rescaled().to_string(), "10.00");
        assert_eq!(amt("-10.005").rescaled().to_string(), "-10.01");
        assert_eq!(amt("7").rescaled().to_string(), "7.00");
    }

    #[test]
    fn test_money() {
        assert_eq!(amt("1234.5").money(), "$1,234.50");
        assert_eq!(amt("-60000").money(), "-$60,000.00");
        assert_eq!(Amount::ZERO.money(), "$0.00");
    }

    #[test]
    fn test_sum_and_sub() {
        let total: Amount = [amt("1.25"), amt("2.50")].iter().sum();
        assert_eq!(total, amt("3.75"));
        assert_eq!(amt("5000.00") - amt("68.50"), amt("4931.50"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&amt("50.00")).unwrap();
        assert_eq!(json, "\"50.00\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amt("50"));
    }
}
