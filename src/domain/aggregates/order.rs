//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub email: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    pub payment: PaymentDetails,
    pub tracking: Option<Tracking>,
    pub history: Vec<StatusChange>,
    pub note: Option<String>,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
    #[serde(skip)]
    pub fingerprint: Option<String>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub size: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 3, max = 12))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Tracking {
    #[validate(length(min = 1, max = 60))]
    pub carrier: String,
    #[validate(length(min = 1, max = 60))]
    pub number: String,
    #[validate(url)]
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange { pub status: OrderStatus, pub at: DateTime<Utc>, pub note: Option<String> }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus { PendingPayment, Confirmed, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod { CashOnDelivery, Online }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus { Pending, Paid, Failed, Refunded }

/// Who asked for a cancellation; customers have a narrower window than staff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor { Customer, Admin }

/// Priced snapshot an order is created from.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub customer_id: Uuid,
    pub email: String,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub fingerprint: Option<String>,
}

impl Order {
    pub fn create(draft: OrderDraft, reserved_until: Option<DateTime<Utc>>) -> Result<Self, OrderError> {
        if draft.lines.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        let status = match draft.payment_method {
            PaymentMethod::Online => OrderStatus::PendingPayment,
            PaymentMethod::CashOnDelivery => OrderStatus::Confirmed,
        };
        Ok(Self {
            id: Uuid::now_v7(), order_number: Self::next_number(now), customer_id: draft.customer_id,
            email: draft.email, status, lines: draft.lines, subtotal: draft.subtotal,
            discount: draft.discount, shipping: draft.shipping, total: draft.total,
            coupon_code: draft.coupon_code, shipping_address: draft.shipping_address,
            payment: PaymentDetails {
                method: draft.payment_method, status: PaymentStatus::Pending,
                gateway_order_id: None, payment_id: None, paid_at: None,
            },
            tracking: None, history: vec![StatusChange { status, at: now, note: None }],
            note: draft.note, idempotency_key: draft.idempotency_key, fingerprint: draft.fingerprint,
            reserved_until: match draft.payment_method {
                PaymentMethod::Online => reserved_until,
                PaymentMethod::CashOnDelivery => None,
            },
            version: 0, created_at: now, updated_at: now,
        })
    }

    fn next_number(now: DateTime<Utc>) -> String {
        format!("ORD-{}-{:06}", now.format("%y%m%d"), rand::random::<u32>() % 1_000_000)
    }

    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }

    pub fn contains_product(&self, product_id: Uuid) -> bool { self.lines.iter().any(|l| l.product_id == product_id) }

    pub fn is_awaiting_payment(&self) -> bool { self.status == OrderStatus::PendingPayment }

    pub fn attach_gateway_order(&mut self, gateway_order_id: String) {
        self.payment.gateway_order_id = Some(gateway_order_id);
        self.touch();
    }

    pub fn mark_paid(&mut self, payment_id: String) -> Result<OrderEvent, OrderError> {
        self.expect(&[OrderStatus::PendingPayment], OrderStatus::Confirmed)?;
        self.payment.status = PaymentStatus::Paid;
        self.payment.payment_id = Some(payment_id.clone());
        self.payment.paid_at = Some(Utc::now());
        self.reserved_until = None;
        self.transition(OrderStatus::Confirmed, Some("payment received".into()));
        Ok(OrderEvent::Paid { order_id: self.id, payment_id })
    }

    pub fn mark_payment_failed(&mut self, reason: &str) -> Result<OrderEvent, OrderError> {
        self.expect(&[OrderStatus::PendingPayment], OrderStatus::Cancelled)?;
        self.payment.status = PaymentStatus::Failed;
        self.reserved_until = None;
        let reason = format!("payment failed: {}", reason);
        self.transition(OrderStatus::Cancelled, Some(reason.clone()));
        Ok(OrderEvent::Cancelled { order_id: self.id, reason })
    }

    pub fn expire(&mut self) -> Result<OrderEvent, OrderError> {
        self.expect(&[OrderStatus::PendingPayment], OrderStatus::Cancelled)?;
        self.reserved_until = None;
        let reason = "payment window expired".to_string();
        self.transition(OrderStatus::Cancelled, Some(reason.clone()));
        Ok(OrderEvent::Cancelled { order_id: self.id, reason })
    }

    pub fn start_processing(&mut self) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::Confirmed], OrderStatus::Processing)?;
        self.transition(OrderStatus::Processing, None);
        Ok(())
    }

    pub fn ship(&mut self, tracking: Tracking) -> Result<OrderEvent, OrderError> {
        self.expect(&[OrderStatus::Confirmed, OrderStatus::Processing], OrderStatus::Shipped)?;
        let tracking_number = Some(tracking.number.clone());
        self.tracking = Some(tracking);
        self.transition(OrderStatus::Shipped, None);
        Ok(OrderEvent::Shipped { order_id: self.id, tracking_number })
    }

    pub fn deliver(&mut self) -> Result<OrderEvent, OrderError> {
        self.expect(&[OrderStatus::Shipped], OrderStatus::Delivered)?;
        if self.payment.method == PaymentMethod::CashOnDelivery {
            self.payment.status = PaymentStatus::Paid;
            self.payment.paid_at = Some(Utc::now());
        }
        self.transition(OrderStatus::Delivered, None);
        Ok(OrderEvent::Delivered { order_id: self.id })
    }

    pub fn cancel(&mut self, actor: Actor, reason: Option<String>) -> Result<OrderEvent, OrderError> {
        let allowed: &[OrderStatus] = match actor {
            Actor::Customer => &[OrderStatus::PendingPayment, OrderStatus::Confirmed],
            Actor::Admin => &[OrderStatus::PendingPayment, OrderStatus::Confirmed, OrderStatus::Processing],
        };
        self.expect(allowed, OrderStatus::Cancelled)?;
        if self.payment.status == PaymentStatus::Paid { self.payment.status = PaymentStatus::Refunded; }
        self.reserved_until = None;
        let reason = reason.unwrap_or_else(|| match actor {
            Actor::Customer => "cancelled by customer".into(),
            Actor::Admin => "cancelled by store".into(),
        });
        self.transition(OrderStatus::Cancelled, Some(reason.clone()));
        Ok(OrderEvent::Cancelled { order_id: self.id, reason })
    }

    fn expect(&self, from: &[OrderStatus], to: OrderStatus) -> Result<(), OrderError> {
        if from.contains(&self.status) { Ok(()) } else { Err(OrderError::InvalidTransition { from: self.status, to }) }
    }

    fn transition(&mut self, status: OrderStatus, note: Option<String>) {
        self.status = status;
        self.history.push(StatusChange { status, at: Utc::now(), note });
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order has no items"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {} to {}", from, to),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_draft(method: PaymentMethod) -> OrderDraft {
    use rust_decimal_macros::dec;
    let price = Money::new(dec!(1500), "INR");
    OrderDraft {
        customer_id: Uuid::new_v4(), email: "buyer@example.com".into(),
        lines: vec![OrderLine {
            product_id: Uuid::new_v4(), sku: "RUN-1".into(), name: "Runner".into(), size: "UK 8".into(),
            image: None, quantity: 2, unit_price: price.clone(), line_total: price.multiply(2),
        }],
        subtotal: price.multiply(2), discount: Money::zero("INR"), shipping: Money::zero("INR"),
        total: price.multiply(2), coupon_code: None, shipping_address: Address::default(),
        payment_method: method, note: None, idempotency_key: None, fingerprint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking() -> Tracking { Tracking { carrier: "Delhivery".into(), number: "DL123".into(), url: None } }

    #[test]
    fn test_online_order_workflow() {
        let mut order = Order::create(sample_draft(PaymentMethod::Online), Some(Utc::now())).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(order.order_number.starts_with("ORD-"));
        order.mark_paid("pay_1".into()).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment.status, PaymentStatus::Paid);
        assert!(order.reserved_until.is_none());
        order.start_processing().unwrap();
        order.ship(tracking()).unwrap();
        order.deliver().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.history.len(), 5);
    }

    #[test]
    fn test_cod_order_is_confirmed_and_paid_on_delivery() {
        let mut order = Order::create(sample_draft(PaymentMethod::CashOnDelivery), Some(Utc::now())).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.reserved_until.is_none());
        assert!(order.mark_paid("x".into()).is_err());
        order.ship(tracking()).unwrap();
        order.deliver().unwrap();
        assert_eq!(order.payment.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_customer_cannot_cancel_processing_order() {
        let mut order = Order::create(sample_draft(PaymentMethod::CashOnDelivery), None).unwrap();
        order.start_processing().unwrap();
        let err = order.cancel(Actor::Customer, None).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: OrderStatus::Processing, to: OrderStatus::Cancelled });
        order.cancel(Actor::Admin, None).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_paid_cancellation_marks_refund() {
        let mut order = Order::create(sample_draft(PaymentMethod::Online), None).unwrap();
        order.mark_paid("pay_1".into()).unwrap();
        order.cancel(Actor::Customer, Some("changed my mind".into())).unwrap();
        assert_eq!(order.payment.status, PaymentStatus::Refunded);
        assert_eq!(order.history.last().unwrap().note.as_deref(), Some("changed my mind"));
    }

    #[test]
    fn test_expire_only_while_pending() {
        let mut order = Order::create(sample_draft(PaymentMethod::Online), None).unwrap();
        order.expire().unwrap();
        assert!(order.expire().is_err());
        assert!(order.ship(tracking()).is_err());
    }

    #[test]
    fn test_empty_order_rejected() {
        let mut draft = sample_draft(PaymentMethod::Online);
        draft.lines.clear();
        assert_eq!(Order::create(draft, None).unwrap_err(), OrderError::NoItems);
    }
}
