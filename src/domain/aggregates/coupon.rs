//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub kind: CouponKind,
    /// Percentage points for `Percentage`, currency amount for `Fixed`.
    pub value: Decimal,
    pub min_order: Decimal,
    pub max_discount: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CouponKind { Percentage, Fixed }

/// Why a coupon cannot be used right now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    Unknown,
    Inactive,
    NotStarted,
    Expired,
    Exhausted,
    BelowMinimum { min_order: Decimal },
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Coupon code is not valid"),
            Self::Inactive => write!(f, "Coupon is no longer active"),
            Self::NotStarted => write!(f, "Coupon is not active yet"),
            Self::Expired => write!(f, "Coupon has expired"),
            Self::Exhausted => write!(f, "Coupon usage limit reached"),
            Self::BelowMinimum { min_order } => write!(f, "Coupon requires a minimum order of {}", min_order),
        }
    }
}

impl Coupon {
    pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

    pub fn validate_terms(&self) -> Result<(), String> {
        if self.code.is_empty() || self.code.len() > 32 { return Err("Coupon code must be 1-32 characters".into()); }
        if self.value <= Decimal::ZERO { return Err("Coupon value must be positive".into()); }
        if self.kind == CouponKind::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err("Percentage coupons cannot exceed 100".into());
        }
        if self.min_order.is_sign_negative() { return Err("Minimum order must not be negative".into()); }
        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at) {
            if end <= start { return Err("Coupon must expire after it starts".into()); }
        }
        Ok(())
    }

    /// Checks whether the coupon applies to a cart with the given subtotal.
    pub fn check(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.active { return Err(CouponRejection::Inactive); }
        if self.starts_at.is_some_and(|s| now < s) { return Err(CouponRejection::NotStarted); }
        if self.expires_at.is_some_and(|e| now >= e) { return Err(CouponRejection::Expired); }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) { return Err(CouponRejection::Exhausted); }
        if subtotal.amount() < self.min_order { return Err(CouponRejection::BelowMinimum { min_order: self.min_order }); }
        Ok(())
    }

    /// Discount for the subtotal, never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: &Money) -> Money {
        let raw = match self.kind {
            CouponKind::Percentage => {
                let pct = subtotal.amount() * self.value / Decimal::ONE_HUNDRED;
                self.max_discount.map_or(pct, |cap| pct.min(cap))
            }
            CouponKind::Fixed => self.value,
        };
        Money::new(raw.max(Decimal::ZERO), subtotal.currency()).min(subtotal).rounded()
    }
}

#[cfg(test)]
pub(crate) fn sample(code: &str, kind: CouponKind, value: Decimal) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::now_v7(), code: code.into(), description: String::new(), kind, value,
        min_order: Decimal::ZERO, max_discount: None, starts_at: None, expires_at: None,
        usage_limit: None, used_count: 0, active: true, created_at: now, updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn inr(v: Decimal) -> Money { Money::new(v, "INR") }

    #[test]
    fn test_percentage_discount_with_cap() {
        let mut c = sample("SAVE20", CouponKind::Percentage, dec!(20));
        assert_eq!(c.discount_for(&inr(dec!(1000))).amount(), dec!(200));
        c.max_discount = Some(dec!(150));
        assert_eq!(c.discount_for(&inr(dec!(1000))).amount(), dec!(150));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let c = sample("FLAT500", CouponKind::Fixed, dec!(500));
        assert_eq!(c.discount_for(&inr(dec!(300))).amount(), dec!(300));
    }

    #[test]
    fn test_check_rules() {
        let now = Utc::now();
        let mut c = sample("X", CouponKind::Fixed, dec!(50));
        c.min_order = dec!(999);
        assert_eq!(c.check(&inr(dec!(500)), now), Err(CouponRejection::BelowMinimum { min_order: dec!(999) }));
        assert!(c.check(&inr(dec!(999)), now).is_ok());

        c.expires_at = Some(now);
        assert_eq!(c.check(&inr(dec!(999)), now), Err(CouponRejection::Expired));
        c.expires_at = None;
        c.starts_at = Some(now + Duration::hours(1));
        assert_eq!(c.check(&inr(dec!(999)), now), Err(CouponRejection::NotStarted));
        c.starts_at = None;
        c.usage_limit = Some(2);
        c.used_count = 2;
        assert_eq!(c.check(&inr(dec!(999)), now), Err(CouponRejection::Exhausted));
        c.used_count = 0;
        c.active = false;
        assert_eq!(c.check(&inr(dec!(999)), now), Err(CouponRejection::Inactive));
    }

    #[test]
    fn test_terms_validation() {
        assert!(sample("BIG", CouponKind::Percentage, dec!(101)).validate_terms().is_err());
        assert!(sample("ZERO", CouponKind::Fixed, dec!(0)).validate_terms().is_err());
        assert!(sample("OK", CouponKind::Percentage, dec!(15)).validate_terms().is_ok());
    }
}
