//! Checkout and the order lifecycle.
//!
//! Stock moves through reservations owned by the store:
//!
//! * placing an order takes stock with guarded decrements. Online orders
//!   hold it until the payment window closes, COD orders commit at once.
//! * a verified payment commits the hold.
//! * a failed payment, a cancellation or an expired window releases it.
//!
//! The reservation row is the arbiter between a late payment and the
//! sweeper: whichever moves it out of `held` first wins, the other backs off.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::config::StoreSettings;
use crate::domain::aggregates::order::StatusChange;
use crate::domain::aggregates::{
    Actor, Address, Order, OrderDraft, OrderStatus, PaymentMethod, PaymentStatus, Tracking,
};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::QuoteLine;
use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};
use crate::services::cart::{CartService, PricedCart};
use crate::services::catalog::CatalogService;
use crate::services::events::EventPublisher;
use crate::services::payments::{self, PaymentGateway, PaymentIntent};
use crate::store::{OrderFilter, Page, PageRequest, PlaceOutcome, Placement, ReservationLine, Storage};

/// Orders handled per sweep.
const SWEEP_BATCH: u32 = 100;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    /// Falls back to the customer's default address.
    #[validate]
    pub shipping_address: Option<Address>,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl PlaceOrderRequest {
    fn fingerprint(&self) -> String {
        payments::fingerprint(&serde_json::to_string(self).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub signature: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[validate]
    pub tracking: Option<Tracking>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntent>,
    /// False when an earlier request with the same idempotency key is replayed.
    #[serde(skip)]
    pub created: bool,
}

/// Public order status, looked up by order number and email.
#[derive(Debug, Serialize)]
pub struct TrackedOrder {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub item_count: u32,
    pub total: Money,
    pub tracking: Option<Tracking>,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_orders: u32,
    pub released_lines: u32,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Storage>,
    carts: CartService,
    catalog: CatalogService,
    payments: PaymentGateway,
    events: Arc<dyn EventPublisher>,
    settings: StoreSettings,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Storage>,
        carts: CartService,
        catalog: CatalogService,
        payments: PaymentGateway,
        events: Arc<dyn EventPublisher>,
        settings: StoreSettings,
    ) -> Self {
        Self { store, carts, catalog, payments, events, settings }
    }

    /// Turns the customer's cart into an order.
    ///
    /// With an idempotency key, a repeat of the same request returns the
    /// original order and takes no stock; reusing the key for a different
    /// request is a conflict.
    #[instrument(skip(self, input, idempotency_key), fields(customer_id = %customer_id))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        idempotency_key: Option<String>,
        input: PlaceOrderRequest,
    ) -> Result<PlacedOrder> {
        input.validate()?;
        let key = match idempotency_key.map(|k| k.trim().to_string()) {
            Some(k) if k.is_empty() || k.len() > 100 => {
                return Err(StoreError::Validation("Idempotency-Key must be 1-100 characters".into()));
            }
            other => other,
        };
        let fingerprint = input.fingerprint();
        if let Some(key) = &key {
            if let Some(existing) = self.store.order_by_idempotency_key(customer_id, key).await? {
                return self.replay(existing, &fingerprint);
            }
        }

        let customer = self.store.customer(customer_id).await?.ok_or_else(|| StoreError::not_found("Customer"))?;
        if customer.blocked {
            return Err(StoreError::Forbidden("Account is blocked".into()));
        }
        let address = input.shipping_address.clone()
            .or_else(|| customer.default_address.clone())
            .ok_or_else(|| StoreError::Validation("A shipping address is required".into()))?;
        address.validate()?;

        let cart = self.store.cart(customer_id).await?;
        if cart.is_empty() {
            // a concurrent request with the same key may have just placed the order and cleared the cart
            if let Some(key) = &key {
                if let Some(existing) = self.store.order_by_idempotency_key(customer_id, key).await? {
                    return self.replay(existing, &fingerprint);
                }
            }
            return Err(StoreError::Validation("Cart is empty".into()));
        }
        let priced = self.carts.price(cart).await?;
        ensure_lines_available(&priced)?;
        if let Some(reason) = priced.quote.coupon_rejection.clone() {
            return Err(StoreError::CouponRejected(reason));
        }

        let quote = &priced.quote;
        let mut order = Order::create(
            OrderDraft {
                customer_id,
                email: customer.email.clone(),
                lines: quote.lines.iter().map(QuoteLine::to_order_line).collect(),
                subtotal: quote.subtotal.clone(),
                discount: quote.discount.clone(),
                shipping: quote.shipping.clone(),
                total: quote.total.clone(),
                coupon_code: quote.coupon.as_ref().map(|c| c.code.clone()),
                shipping_address: address,
                payment_method: input.payment_method,
                note: input.note.clone(),
                idempotency_key: key,
                fingerprint: Some(fingerprint.clone()),
            },
            Some(Utc::now() + self.settings.payment_window),
        )?;
        let intent = (order.payment.method == PaymentMethod::Online).then(|| self.payments.open_intent(&order));
        if let Some(intent) = &intent {
            order.attach_gateway_order(intent.gateway_order_id.clone());
        }

        let lines = order.lines.iter()
            .map(|l| ReservationLine { product_id: l.product_id, size: l.size.clone(), quantity: l.quantity })
            .collect();
        let hold_until = order.reserved_until;
        let coupon_id = quote.coupon.as_ref().and(priced.coupon.as_ref()).map(|c| c.id);
        let placement = Placement::new(order, lines, hold_until, coupon_id);

        let order = match self.store.place_order(placement).await? {
            PlaceOutcome::Replayed(existing) => return self.replay(existing, &fingerprint),
            PlaceOutcome::Created(order) => order,
        };

        let PricedCart { mut cart, products, .. } = priced;
        cart.clear();
        self.store.save_cart(&cart).await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total.amount(),
            method = %order.payment.method,
            "order placed"
        );
        self.events.publish(OrderEvent::Placed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_id,
            total: order.total.amount(),
        }.into()).await;

        let threshold = self.settings.low_stock_threshold;
        for line in &order.lines {
            let before = products.get(&line.product_id).and_then(|p| p.size(&line.size)).map(|s| s.stock);
            if let Some(before) = before.filter(|b| *b >= threshold) {
                self.catalog.warn_if_low(line.product_id, &line.size, before.saturating_sub(line.quantity)).await;
            }
        }

        Ok(PlacedOrder { order, payment_intent: intent, created: true })
    }

    fn replay(&self, existing: Order, fingerprint: &str) -> Result<PlacedOrder> {
        if existing.fingerprint.as_deref() != Some(fingerprint) {
            return Err(StoreError::Conflict("Idempotency-Key was already used for a different request".into()));
        }
        tracing::info!(order_id = %existing.id, "idempotent replay");
        let payment_intent = existing.is_awaiting_payment().then(|| self.payments.open_intent(&existing));
        Ok(PlacedOrder { order: existing, payment_intent, created: false })
    }

    /// Confirms an online payment. A bad signature leaves the order pending so
    /// the client can retry within the payment window.
    #[instrument(skip(self, input), fields(payment_id = %input.payment_id))]
    pub async fn confirm_payment(&self, customer_id: Uuid, order_id: Uuid, input: ConfirmPaymentRequest) -> Result<Order> {
        input.validate()?;
        let mut order = self.customer_order(customer_id, order_id).await?;
        if order.payment.status == PaymentStatus::Paid && order.payment.payment_id.as_deref() == Some(input.payment_id.as_str()) {
            return Ok(order);
        }
        if !order.is_awaiting_payment() {
            return Err(StoreError::InvalidTransition { from: order.status, to: OrderStatus::Confirmed });
        }
        let gateway_order_id = order.payment.gateway_order_id.clone()
            .ok_or_else(|| StoreError::Internal(format!("order {} has no gateway reference", order.id)))?;
        if !self.payments.verify(&gateway_order_id, &input.payment_id, &input.signature)? {
            tracing::warn!(order_id = %order.id, "payment signature mismatch");
            return Err(StoreError::PaymentVerification);
        }

        if self.store.commit_reservations(order.id).await? == 0 {
            // The sweeper released the hold first; finish the cancellation if it has not.
            if let Ok(event) = order.expire() {
                if self.store.update_order(&mut order).await.is_ok() {
                    self.events.publish(event.into()).await;
                }
            }
            tracing::warn!(order_id = %order.id, "payment arrived after the hold lapsed");
            return Err(StoreError::Conflict("Payment window expired, the order was cancelled".into()));
        }

        let event = order.mark_paid(input.payment_id)?;
        self.store.update_order(&mut order).await?;
        tracing::info!(order_id = %order.id, "payment confirmed");
        self.events.publish(event.into()).await;
        Ok(order)
    }

    #[instrument(skip(self, input))]
    pub async fn fail_payment(&self, customer_id: Uuid, order_id: Uuid, input: ReasonRequest) -> Result<Order> {
        input.validate()?;
        let mut order = self.customer_order(customer_id, order_id).await?;
        let reason = input.reason.unwrap_or_else(|| "declined".into());
        let event = order.mark_payment_failed(&reason)?;
        let released = self.store.release_held(order.id).await?;
        if released == 0 {
            // a confirmation committed the hold first
            tracing::warn!(order_id = %order.id, "payment failure arrived after the hold was committed");
            return Err(StoreError::Conflict("The payment for this order is already being settled".into()));
        }
        self.store.update_order(&mut order).await?;
        tracing::info!(order_id = %order.id, released, "payment failed, hold released");
        self.events.publish(event.into()).await;
        Ok(order)
    }

    pub async fn cancel(&self, customer_id: Uuid, order_id: Uuid, input: ReasonRequest) -> Result<Order> {
        input.validate()?;
        let order = self.customer_order(customer_id, order_id).await?;
        self.cancel_order(order, Actor::Customer, input.reason).await
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn cancel_order(&self, mut order: Order, actor: Actor, reason: Option<String>) -> Result<Order> {
        let event = order.cancel(actor, reason)?;
        self.store.update_order(&mut order).await?;
        let restocked = self.store.restock(order.id).await?;
        tracing::info!(restocked, ?actor, "order cancelled");
        self.events.publish(event.into()).await;
        Ok(order)
    }

    pub async fn get_for_customer(&self, customer_id: Uuid, order_id: Uuid) -> Result<Order> {
        self.customer_order(customer_id, order_id).await
    }

    pub async fn list_for_customer(&self, customer_id: Uuid, page: PageRequest) -> Result<Page<Order>> {
        self.store.list_orders(&OrderFilter { customer_id: Some(customer_id), status: None, page }).await
    }

    /// Unknown numbers and mismatched emails look the same to the caller.
    pub async fn track(&self, order_number: &str, email: &str) -> Result<TrackedOrder> {
        let order = self.store.order_by_number(order_number.trim()).await?
            .filter(|o| o.email.eq_ignore_ascii_case(email.trim()))
            .ok_or_else(|| StoreError::not_found("Order"))?;
        Ok(TrackedOrder {
            order_number: order.order_number.clone(),
            status: order.status,
            payment_status: order.payment.status,
            item_count: order.item_count(),
            total: order.total,
            tracking: order.tracking,
            history: order.history,
            created_at: order.created_at,
        })
    }

    pub async fn admin_list(&self, query: AdminOrderQuery) -> Result<Page<Order>> {
        self.store.list_orders(&OrderFilter {
            customer_id: query.customer_id,
            status: query.status,
            page: PageRequest::new(query.page, query.per_page),
        }).await
    }

    pub async fn admin_get(&self, order_id: Uuid) -> Result<Order> {
        self.store.order(order_id).await?.ok_or_else(|| StoreError::not_found("Order"))
    }

    #[instrument(skip(self, input), fields(status = %input.status))]
    pub async fn update_status(&self, order_id: Uuid, input: StatusUpdateRequest) -> Result<Order> {
        input.validate()?;
        let mut order = self.admin_get(order_id).await?;
        let event = match input.status {
            OrderStatus::Processing => {
                order.start_processing()?;
                None
            }
            OrderStatus::Shipped => {
                let tracking = input.tracking
                    .ok_or_else(|| StoreError::Validation("Tracking details are required to ship an order".into()))?;
                Some(order.ship(tracking)?)
            }
            OrderStatus::Delivered => Some(order.deliver()?),
            OrderStatus::Cancelled => return self.cancel_order(order, Actor::Admin, input.note).await,
            to => return Err(StoreError::InvalidTransition { from: order.status, to }),
        };
        self.store.update_order(&mut order).await?;
        tracing::info!(order_id = %order.id, status = %order.status, "order status updated");
        if let Some(event) = event {
            self.events.publish(event.into()).await;
        }
        Ok(order)
    }

    /// Cancels online orders whose payment window has closed and returns their stock.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for mut order in self.store.expired_pending(now, SWEEP_BATCH).await? {
            let released = self.store.release_held(order.id).await?;
            if released == 0 {
                // payment confirmation committed the hold first
                continue;
            }
            report.released_lines += released;
            let event = match order.expire() {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "expired order left its pending state");
                    continue;
                }
            };
            match self.store.update_order(&mut order).await {
                Ok(()) => {
                    report.expired_orders += 1;
                    self.events.publish(event.into()).await;
                }
                Err(e) => tracing::warn!(order_id = %order.id, error = %e, "expired order changed concurrently"),
            }
        }
        if report.expired_orders > 0 {
            tracing::info!(expired = report.expired_orders, released = report.released_lines, "payment holds released");
        }
        Ok(report)
    }

    async fn customer_order(&self, customer_id: Uuid, order_id: Uuid) -> Result<Order> {
        self.store.order(order_id).await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or_else(|| StoreError::not_found("Order"))
    }
}

fn ensure_lines_available(priced: &PricedCart) -> Result<()> {
    let Some(line) = priced.quote.lines.iter().find(|l| !l.available) else { return Ok(()) };
    match priced.products.get(&line.product_id).filter(|p| p.is_visible()) {
        Some(product) => match product.size(&line.size) {
            Some(size) => Err(StoreError::InsufficientStock {
                product_id: line.product_id,
                size: line.size.clone(),
                available: size.stock,
                requested: line.quantity,
            }),
            None => Err(StoreError::Conflict(format!("Size {} of {} is no longer offered", line.size, product.name))),
        },
        None => Err(StoreError::Conflict(format!("{} is no longer available", line.name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{coupon, product, CouponKind, Customer, Product, Role};
    use crate::domain::events::DomainEvent;
    use crate::services::cart::AddItemRequest;
    use crate::services::events::RecordingPublisher;
    use crate::store::{CouponStore, CustomerStore, MemoryStore, OrderStore, ProductStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        orders: OrderService,
        carts: CartService,
        store: Arc<MemoryStore>,
        events: Arc<RecordingPublisher>,
        payments: PaymentGateway,
        customer: Customer,
        product: Product,
    }

    async fn fixture(stock: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingPublisher::default());
        let settings = StoreSettings::default();
        let carts = CartService::new(store.clone(), settings.clone());
        let catalog = CatalogService::new(store.clone(), events.clone(), settings.clone());
        let payments = PaymentGateway::new("gateway-secret");
        let orders = OrderService::new(store.clone(), carts.clone(), catalog, payments.clone(), events.clone(), settings);

        let mut customer = Customer::register("Meera Iyer", "meera@example.com", "x".into(), Role::Customer);
        customer.default_address = Some(address());
        store.insert_customer(&customer).await.unwrap();
        let product = product::sample("Trail Blazer", dec!(1800), &[("UK 6", stock)]);
        store.insert_product(&product).await.unwrap();
        Fixture { orders, carts, store, events, payments, customer, product }
    }

    fn address() -> Address {
        Address {
            full_name: "Meera Iyer".into(), line1: "12 MG Road".into(), line2: None, city: "Bengaluru".into(),
            state: "KA".into(), postal_code: "560001".into(), country: "IN".into(), phone: "9876543210".into(),
        }
    }

    fn request(method: PaymentMethod) -> PlaceOrderRequest {
        PlaceOrderRequest { shipping_address: None, payment_method: method, note: None }
    }

    impl Fixture {
        async fn add_to_cart(&self, quantity: u32) {
            let req = AddItemRequest { product_id: self.product.id, size: "UK 6".into(), quantity };
            self.carts.add_item(self.customer.id, req).await.unwrap();
        }

        async fn stock(&self) -> u32 {
            self.store.product(self.product.id).await.unwrap().unwrap().size("UK 6").unwrap().stock
        }

        fn signed(&self, order: &Order, payment_id: &str) -> ConfirmPaymentRequest {
            let gw = order.payment.gateway_order_id.as_deref().unwrap();
            ConfirmPaymentRequest { payment_id: payment_id.into(), signature: self.payments.sign(gw, payment_id).unwrap() }
        }
    }

    #[tokio::test]
    async fn test_online_checkout_holds_then_commits() {
        let f = fixture(5).await;
        f.add_to_cart(2).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        assert!(placed.created);
        assert_eq!(placed.order.status, OrderStatus::PendingPayment);
        assert_eq!(placed.order.total.amount(), dec!(3600));
        let intent = placed.payment_intent.clone().unwrap();
        assert_eq!(placed.order.payment.gateway_order_id.as_deref(), Some(intent.gateway_order_id.as_str()));
        assert_eq!(f.stock().await, 3);
        assert!(f.carts.view(f.customer.id).await.unwrap().quote.lines.is_empty());

        let paid = f.orders.confirm_payment(f.customer.id, placed.order.id, f.signed(&placed.order, "pay_9")).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Confirmed);
        assert_eq!(paid.payment.status, PaymentStatus::Paid);
        // stock stays taken and the hold can no longer be released
        assert_eq!(f.store.release_held(paid.id).await.unwrap(), 0);
        assert_eq!(f.stock().await, 3);
        assert!(f.events.subjects().contains(&"store.orders.paid"));
    }

    #[tokio::test]
    async fn test_bad_signature_keeps_order_pending() {
        let f = fixture(5).await;
        f.add_to_cart(1).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        let forged = ConfirmPaymentRequest { payment_id: "pay_1".into(), signature: "00".repeat(32) };
        let err = f.orders.confirm_payment(f.customer.id, placed.order.id, forged).await.unwrap_err();
        assert!(matches!(err, StoreError::PaymentVerification));
        let order = f.orders.get_for_customer(f.customer.id, placed.order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_failed_payment_releases_stock() {
        let f = fixture(5).await;
        f.add_to_cart(3).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        assert_eq!(f.stock().await, 2);
        let order = f.orders.fail_payment(f.customer.id, placed.order.id, ReasonRequest::default()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment.status, PaymentStatus::Failed);
        assert_eq!(f.stock().await, 5);
    }

    #[tokio::test]
    async fn test_failure_after_commit_keeps_the_hold() {
        let f = fixture(5).await;
        f.add_to_cart(1).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        // a confirmation committed the hold but has not written the order yet
        assert_eq!(f.store.commit_reservations(placed.order.id).await.unwrap(), 1);
        let err = f.orders.fail_payment(f.customer.id, placed.order.id, ReasonRequest::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let order = f.orders.admin_get(placed.order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(f.stock().await, 4);
    }

    #[tokio::test]
    async fn test_commit_after_failure_finds_no_hold() {
        let f = fixture(5).await;
        f.add_to_cart(2).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        f.orders.fail_payment(f.customer.id, placed.order.id, ReasonRequest::default()).await.unwrap();
        assert_eq!(f.store.commit_reservations(placed.order.id).await.unwrap(), 0);
        assert_eq!(f.stock().await, 5);
        let late = f.orders.confirm_payment(f.customer.id, placed.order.id, f.signed(&placed.order, "pay_3")).await;
        assert!(matches!(late, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_sweep_expires_lapsed_holds_once() {
        let f = fixture(4).await;
        f.add_to_cart(4).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        assert_eq!(f.stock().await, 0);

        let early = f.orders.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(early, SweepReport::default());

        let later = Utc::now() + chrono::Duration::minutes(16);
        let report = f.orders.sweep_expired(later).await.unwrap();
        assert_eq!(report, SweepReport { expired_orders: 1, released_lines: 1 });
        assert_eq!(f.stock().await, 4);
        assert_eq!(f.orders.sweep_expired(later).await.unwrap(), SweepReport::default());

        // a payment that arrives after the sweep is refused
        let late = f.orders.confirm_payment(f.customer.id, placed.order.id, f.signed(&placed.order, "pay_late")).await;
        assert!(matches!(late, Err(StoreError::InvalidTransition { .. })));
        assert_eq!(f.stock().await, 4);
    }

    #[tokio::test]
    async fn test_payment_after_release_but_before_cancel_is_refused() {
        let f = fixture(2).await;
        f.add_to_cart(1).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await.unwrap();
        // sweeper released the hold but has not written the cancellation yet
        f.store.release_held(placed.order.id).await.unwrap();
        let err = f.orders.confirm_payment(f.customer.id, placed.order.id, f.signed(&placed.order, "pay_2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let order = f.orders.admin_get(placed.order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(f.stock().await, 2);
    }

    #[tokio::test]
    async fn test_idempotent_replay_and_key_reuse() {
        let f = fixture(5).await;
        f.add_to_cart(1).await;
        let key = Some("checkout-123".to_string());
        let first = f.orders.place_order(f.customer.id, key.clone(), request(PaymentMethod::CashOnDelivery)).await.unwrap();
        let again = f.orders.place_order(f.customer.id, key.clone(), request(PaymentMethod::CashOnDelivery)).await.unwrap();
        assert!(first.created);
        assert!(!again.created);
        assert_eq!(first.order.id, again.order.id);
        assert_eq!(f.stock().await, 4);

        let different = f.orders.place_order(f.customer.id, key, request(PaymentMethod::Online)).await;
        assert!(matches!(different, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cod_cancel_restocks_and_admin_ships() {
        let f = fixture(5).await;
        f.add_to_cart(2).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::CashOnDelivery)).await.unwrap();
        assert_eq!(placed.order.status, OrderStatus::Confirmed);
        assert!(placed.payment_intent.is_none());
        let cancelled = f.orders.cancel(f.customer.id, placed.order.id, ReasonRequest::default()).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(f.stock().await, 5);

        f.add_to_cart(1).await;
        let placed = f.orders.place_order(f.customer.id, None, request(PaymentMethod::CashOnDelivery)).await.unwrap();
        let no_tracking = StatusUpdateRequest { status: OrderStatus::Shipped, tracking: None, note: None };
        assert!(matches!(f.orders.update_status(placed.order.id, no_tracking).await, Err(StoreError::Validation(_))));
        let ship = StatusUpdateRequest {
            status: OrderStatus::Shipped,
            tracking: Some(Tracking { carrier: "BlueDart".into(), number: "BD42".into(), url: None }),
            note: None,
        };
        f.orders.update_status(placed.order.id, ship).await.unwrap();
        let deliver = StatusUpdateRequest { status: OrderStatus::Delivered, tracking: None, note: None };
        let delivered = f.orders.update_status(placed.order.id, deliver).await.unwrap();
        assert_eq!(delivered.payment.status, PaymentStatus::Paid);

        let tracked = f.orders.track(&delivered.order_number, "MEERA@example.com").await.unwrap();
        assert_eq!(tracked.status, OrderStatus::Delivered);
        assert!(f.orders.track(&delivered.order_number, "someone@example.com").await.is_err());
        // the customer can no longer cancel a delivered order
        let late = f.orders.cancel(f.customer.id, delivered.id, ReasonRequest::default()).await;
        assert!(matches!(late, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_blocked_customer_and_empty_cart() {
        let f = fixture(5).await;
        let empty = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await;
        assert!(matches!(empty, Err(StoreError::Validation(_))));

        f.add_to_cart(1).await;
        let mut blocked = f.customer.clone();
        blocked.block();
        f.store.update_customer(&blocked).await.unwrap();
        let refused = f.orders.place_order(f.customer.id, None, request(PaymentMethod::Online)).await;
        assert!(matches!(refused, Err(StoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_exhausted_coupon_aborts_without_taking_stock() {
        let f = fixture(5).await;
        let mut c = coupon::sample("ONCE", CouponKind::Fixed, dec!(100));
        c.usage_limit = Some(1);
        f.store.insert_coupon(&c).await.unwrap();
        f.add_to_cart(1).await;
        f.carts.apply_coupon(f.customer.id, crate::services::cart::ApplyCouponRequest { code: "ONCE".into() }).await.unwrap();

        // another shopper uses the last redemption in the meantime
        let mut other_cart_order = Order::create(
            crate::domain::aggregates::order::sample_draft(PaymentMethod::CashOnDelivery), None,
        ).unwrap();
        other_cart_order.lines[0].product_id = f.product.id;
        other_cart_order.lines[0].size = "UK 6".into();
        other_cart_order.lines[0].quantity = 1;
        f.store.place_order(Placement {
            lines: vec![ReservationLine { product_id: f.product.id, size: "UK 6".into(), quantity: 1 }],
            hold_until: None,
            coupon_id: Some(c.id),
            order: other_cart_order,
        }).await.unwrap();
        assert_eq!(f.stock().await, 4);

        let err = f.orders.place_order(f.customer.id, None, request(PaymentMethod::CashOnDelivery)).await.unwrap_err();
        assert!(matches!(err, StoreError::CouponRejected(_)));
        assert_eq!(f.stock().await, 4);
        let placed_events = f.events.events().into_iter()
            .filter(|e| matches!(e, DomainEvent::Order(OrderEvent::Placed { .. })))
            .count();
        assert_eq!(placed_events, 0);
    }
}
