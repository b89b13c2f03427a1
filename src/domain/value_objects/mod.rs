//! Value objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        if value.chars().any(char::is_whitespace) { return Err(SkuError::Whitespace); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong, Whitespace }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "SKU empty"),
            Self::TooLong => write!(f, "SKU too long"),
            Self::Whitespace => write!(f, "SKU must not contain whitespace"),
        }
    }
}

/// URL-safe handle derived from a display name ("Air Runner 2" -> "air-runner-2")
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        while slug.ends_with('-') { slug.pop(); }
        Self(slug)
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Subtracts, flooring the result at zero.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new((self.amount - other.amount).max(Decimal::ZERO), &self.currency))
    }

    pub fn min(&self, other: &Money) -> Money {
        if other.amount < self.amount { other.clone() } else { self.clone() }
    }

    /// Rounds half away from zero to two decimal places.
    pub fn rounded(&self) -> Money {
        Money::new(self.amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero), &self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.amount, self.currency) }
}

#[derive(Debug, Clone)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sku() { let sku = Sku::new(" run-001 ").unwrap(); assert_eq!(sku.as_str(), "RUN-001"); }

    #[test]
    fn test_sku_rejects_inner_whitespace() { assert_eq!(Sku::new("RUN 001"), Err(SkuError::Whitespace)); }

    #[test]
    fn test_slug() {
        assert_eq!(Slug::from_name("  Air Runner 2 (Men's) ").as_str(), "air-runner-2-men-s");
        assert_eq!(Slug::from_name("--").as_str(), "");
    }

    #[test]
    fn test_money_add() {
        let a = Money::new(dec!(100), "INR");
        let b = Money::new(dec!(50), "INR");
        assert_eq!(a.add(&b).unwrap().amount(), dec!(150));
        assert!(a.add(&Money::new(dec!(1), "USD")).is_err());
    }

    #[test]
    fn test_money_saturating_sub_and_round() {
        let a = Money::new(dec!(10), "INR");
        assert_eq!(a.saturating_sub(&Money::new(dec!(25), "INR")).unwrap().amount(), dec!(0));
        assert_eq!(Money::new(dec!(1.005), "INR").rounded().amount(), dec!(1.01));
    }
}
