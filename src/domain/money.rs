use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of fraction digits carried by every stored or compared amount.
pub const SCALE: u32 = 2;

/// Largest operation amount accepted, in cents (one trillion units).
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000_000;

/// Money is an arbitrary-precision decimal pinned to two fraction digits.
/// Values are canonicalized with banker's rounding on construction, so
/// `12.345` becomes `12.34` and `12.355` becomes `12.36`.
///
/// Balances and ledger deltas may be negative; operation amounts go through
/// [`Amount::parse_positive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn zero() -> Self {
        Self::from_cents(0)
    }

    /// Build an amount from integer minor units. Example: 4000 -> "40.00"
    pub fn from_cents(cents: i64) -> Self {
        Amount(Decimal::new(cents, SCALE))
    }

    /// Canonicalize an arbitrary decimal to two fraction digits.
    pub fn canonical(value: Decimal) -> Self {
        let mut value = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointNearestEven);
        value.rescale(SCALE);
        Amount(value)
    }

    /// Validate a caller-supplied operation amount.
    ///
    /// Fails when the input is missing or blank, is not a decimal number,
    /// is zero or negative once canonicalized, or exceeds [`MAX_AMOUNT_CENTS`].
    pub fn parse_positive(input: Option<&str>) -> Result<Self, AmountError> {
        let raw = input.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(AmountError::Missing);
        }

        let value = Decimal::from_str(raw).map_err(|_| AmountError::NotNumeric(raw.to_string()))?;
        let amount = Self::canonical(value);

        if !amount.is_positive() {
            return Err(AmountError::NotPositive(raw.to_string()));
        }
        if amount > Self::from_cents(MAX_AMOUNT_CENTS) {
            return Err(AmountError::OutOfRange(raw.to_string()));
        }
        Ok(amount)
    }

    /// Integer minor units, the representation used by the store.
    pub fn to_cents(self) -> Result<i64, AmountError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| AmountError::OutOfRange(self.to_string()))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        !self.0.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::canonical(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parse a signed amount (balances, report totals). Use
    /// [`Amount::parse_positive`] for operation inputs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        Decimal::from_str(raw)
            .map(Self::canonical)
            .map_err(|_| AmountError::NotNumeric(raw.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Self::canonical(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Self::canonical(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, amount| acc + amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Missing,
    NotNumeric(String),
    NotPositive(String),
    OutOfRange(String),
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Missing => write!(f, "amount is required"),
            AmountError::NotNumeric(raw) => write!(f, "'{}' is not a decimal number", raw),
            AmountError::NotPositive(raw) => write!(f, "amount must be greater than 0, got '{}'", raw),
            AmountError::OutOfRange(raw) => write!(f, "amount '{}' is out of range", raw),
        }
    }
}

impl std::error::Error for AmountError {}
