//! Cart pricing: subtotal, coupon discount, shipping and total.
//!
//! Prices always come from the catalog at quote time; the cart only stores
//! product, size and quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, CouponRejection, OrderLine};
use crate::domain::value_objects::{Money, MoneyError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShippingPolicy { pub flat_fee: Decimal, pub free_threshold: Decimal }

impl ShippingPolicy {
    /// An empty cart ships free; otherwise the fee applies below the threshold.
    pub fn fee_for(&self, item_count: u32, discounted_subtotal: &Money) -> Money {
        if item_count == 0 || discounted_subtotal.amount() >= self.free_threshold {
            Money::zero(discounted_subtotal.currency())
        } else {
            Money::new(self.flat_fee, discounted_subtotal.currency())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteLine {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub size: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    /// False when the product was unpublished, the size removed, or stock fell below the quantity.
    pub available: bool,
}

impl QuoteLine {
    pub fn to_order_line(&self) -> OrderLine {
        OrderLine {
            product_id: self.product_id, sku: self.sku.clone(), name: self.name.clone(), size: self.size.clone(),
            image: self.image.clone(), quantity: self.quantity, unit_price: self.unit_price.clone(),
            line_total: self.line_total.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppliedCoupon { pub code: String, pub discount: Money }

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub item_count: u32,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub coupon: Option<AppliedCoupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_rejection: Option<CouponRejection>,
}

impl Quote {
    pub fn has_unavailable_lines(&self) -> bool { self.lines.iter().any(|l| !l.available) }
}

/// What the cart's coupon code resolved to.
pub enum CouponInput<'a> {
    None,
    Unknown,
    Found(&'a Coupon),
}

pub fn quote(
    lines: Vec<QuoteLine>, coupon: CouponInput<'_>, policy: &ShippingPolicy, currency: &str, now: DateTime<Utc>,
) -> Result<Quote, MoneyError> {
    let mut subtotal = Money::zero(currency);
    for line in lines.iter().filter(|l| l.available) {
        subtotal = subtotal.add(&line.line_total)?;
    }
    let item_count: u32 = lines.iter().filter(|l| l.available).map(|l| l.quantity).sum();

    let (applied, rejection) = match coupon {
        CouponInput::None => (None, None),
        CouponInput::Unknown => (None, Some(CouponRejection::Unknown)),
        CouponInput::Found(c) => match c.check(&subtotal, now) {
            Ok(()) => (Some(AppliedCoupon { code: c.code.clone(), discount: c.discount_for(&subtotal) }), None),
            Err(reason) => (None, Some(reason)),
        },
    };

    let discount = applied.as_ref().map_or_else(|| Money::zero(currency), |a| a.discount.clone());
    let discounted = subtotal.saturating_sub(&discount)?;
    let shipping = policy.fee_for(item_count, &discounted);
    let total = discounted.add(&shipping)?;

    Ok(Quote { lines, item_count, subtotal, discount, shipping, total, coupon: applied, coupon_rejection: rejection })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::coupon::{self, CouponKind};
    use rust_decimal_macros::dec;

    fn policy() -> ShippingPolicy { ShippingPolicy { flat_fee: dec!(79), free_threshold: dec!(999) } }

    fn line(price: Decimal, qty: u32, available: bool) -> QuoteLine {
        let unit = Money::new(price, "INR");
        QuoteLine {
            product_id: Uuid::new_v4(), sku: "S".into(), name: "Shoe".into(), size: "UK 8".into(), image: None,
            quantity: qty, line_total: unit.multiply(qty), unit_price: unit, available,
        }
    }

    #[test]
    fn test_empty_cart_is_free() {
        let q = quote(vec![], CouponInput::None, &policy(), "INR", Utc::now()).unwrap();
        assert!(q.total.is_zero());
        assert!(q.shipping.is_zero());
    }

    #[test]
    fn test_flat_fee_below_threshold() {
        let q = quote(vec![line(dec!(400), 2, true)], CouponInput::None, &policy(), "INR", Utc::now()).unwrap();
        assert_eq!(q.subtotal.amount(), dec!(800));
        assert_eq!(q.shipping.amount(), dec!(79));
        assert_eq!(q.total.amount(), dec!(879));
    }

    #[test]
    fn test_discount_can_push_below_free_shipping() {
        let c = coupon::sample("TENOFF", CouponKind::Percentage, dec!(10));
        let q = quote(vec![line(dec!(1000), 1, true)], CouponInput::Found(&c), &policy(), "INR", Utc::now()).unwrap();
        assert_eq!(q.discount.amount(), dec!(100));
        assert_eq!(q.shipping.amount(), dec!(79));
        assert_eq!(q.total.amount(), dec!(979));
        assert_eq!(q.coupon.unwrap().code, "TENOFF");
    }

    #[test]
    fn test_unavailable_lines_excluded_and_rejection_reported() {
        let mut c = coupon::sample("BIG", CouponKind::Fixed, dec!(50));
        c.min_order = dec!(2000);
        let lines = vec![line(dec!(1500), 1, true), line(dec!(900), 1, false)];
        let q = quote(lines, CouponInput::Found(&c), &policy(), "INR", Utc::now()).unwrap();
        assert_eq!(q.subtotal.amount(), dec!(1500));
        assert_eq!(q.item_count, 1);
        assert!(q.coupon.is_none());
        assert_eq!(q.coupon_rejection, Some(CouponRejection::BelowMinimum { min_order: dec!(2000) }));
        assert!(q.has_unavailable_lines());
    }

    #[test]
    fn test_coupon_covering_subtotal_still_pays_shipping() {
        let c = coupon::sample("FLAT500", CouponKind::Fixed, dec!(500));
        let q = quote(vec![line(dec!(300), 1, true)], CouponInput::Found(&c), &policy(), "INR", Utc::now()).unwrap();
        assert_eq!(q.discount.amount(), dec!(300));
        assert_eq!(q.shipping.amount(), dec!(79));
        assert_eq!(q.total.amount(), dec!(79));
    }

    #[test]
    fn test_only_unavailable_lines_ship_free() {
        let q = quote(vec![line(dec!(300), 1, false)], CouponInput::None, &policy(), "INR", Utc::now()).unwrap();
        assert!(q.shipping.is_zero());
        assert!(q.total.is_zero());
    }

    #[test]
    fn test_unknown_coupon() {
        let q = quote(vec![line(dec!(10), 1, true)], CouponInput::Unknown, &policy(), "INR", Utc::now()).unwrap();
        assert_eq!(q.coupon_rejection, Some(CouponRejection::Unknown));
    }
}
