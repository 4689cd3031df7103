use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("invalid amount: '{0}'")]
pub struct MoneyError(pub String);

/// Signed monetary amount. Internal convention: expenses are negative,
/// credits/refunds are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).to_i64().unwrap()
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn to_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Parse a statement amount string. Accepts `$` signs, thousands commas,
    /// accounting parentheses for negatives, and a leading `-`.
    pub fn parse(s: &str) -> Result<Self, MoneyError> {
        let s = s.trim();
        let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
            (true, &s[1..s.len() - 1])
        } else {
            (false, s)
        };
        let cleaned = s.replace([',', '$', ' '], "");
        if cleaned.is_empty() {
            return Err(MoneyError(s.to_string()));
        }
        let mut dec = Decimal::from_str(&cleaned).map_err(|_| MoneyError(s.to_string()))?;
        if negative {
            dec = -dec;
        }
        Ok(Money(dec.round_dp(2)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// How a statement format encodes charge direction. `normalize` maps a raw
/// amount onto the internal sign convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Charges are already negative in the export (Chase CSV).
    DebitsNegative,
    /// Charges are positive, credits negative (Amex, Discover CSV).
    ChargesPositive,
    /// Separate debit/credit columns, both unsigned (Capital One CSV).
    SplitColumns,
}

impl SignConvention {
    pub fn normalize(self, raw: Money) -> Money {
        match self {
            SignConvention::DebitsNegative => raw,
            SignConvention::ChargesPositive => -raw,
            SignConvention::SplitColumns => raw,
        }
    }

    /// Combine split debit/credit cells into one signed amount. A debit is an
    /// expense, a credit an inflow; a row with neither has no amount.
    pub fn combine(debit: Option<Money>, credit: Option<Money>) -> Option<Money> {
        match (debit, credit) {
            (Some(d), None) => Some(-d.abs()),
            (None, Some(c)) => Some(c.abs()),
            (Some(d), Some(c)) => Some(c.abs() - d.abs()),
            (None, None) => None,
        }
    }
}
