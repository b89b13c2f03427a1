//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Inventory(InventoryEvent),
    Review(ReviewEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, customer_id: Uuid, total: Decimal },
    Paid { order_id: Uuid, payment_id: String },
    Cancelled { order_id: Uuid, reason: String },
    Shipped { order_id: Uuid, tracking_number: Option<String> },
    Delivered { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    StockLow { product_id: Uuid, size: String, stock: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    Posted { review_id: Uuid, product_id: Uuid, rating: u8 },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "store.orders.placed",
            Self::Order(OrderEvent::Paid { .. }) => "store.orders.paid",
            Self::Order(OrderEvent::Cancelled { .. }) => "store.orders.cancelled",
            Self::Order(OrderEvent::Shipped { .. }) => "store.orders.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "store.orders.delivered",
            Self::Inventory(InventoryEvent::StockLow { .. }) => "store.inventory.low",
            Self::Review(ReviewEvent::Posted { .. }) => "store.reviews.posted",
        }
    }
}

impl From<OrderEvent> for DomainEvent {
    fn from(e: OrderEvent) -> Self { Self::Order(e) }
}

impl From<InventoryEvent> for DomainEvent {
    fn from(e: InventoryEvent) -> Self { Self::Inventory(e) }
}

impl From<ReviewEvent> for DomainEvent {
    fn from(e: ReviewEvent) -> Self { Self::Review(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_is_tagged() {
        let event = DomainEvent::from(OrderEvent::Delivered { order_id: Uuid::nil() });
        assert_eq!(event.subject(), "store.orders.delivered");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "delivered");
    }
}
