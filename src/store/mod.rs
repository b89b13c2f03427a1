//! Storage traits and their implementations.
//!
//! Every aggregate gets its own trait; `Storage` bundles them so services can
//! hold a single `Arc<dyn Storage>`. `PgStore` is the production backend and
//! `MemoryStore` serves local development and tests. Both must keep the
//! same semantics, in particular the all-or-nothing behaviour of
//! [`OrderStore::place_order`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::domain::aggregates::{
    BestSeller, Cart, Category, Collection, Coupon, Customer, Gender, Order, OrderStatus, Product, ProductStatus, Review,
};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> { pub data: Vec<T>, pub total: u64, pub page: u32, pub per_page: u32 }

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { data: self.data.into_iter().map(f).collect(), total: self.total, page: self.page, per_page: self.per_page }
    }
}

/// Page number and size, clamped to sane bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct PageRequest { pub page: u32, pub per_page: u32 }

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
    }
    pub fn offset(&self) -> u64 { (self.page as u64 - 1) * self.per_page as u64 }
    pub fn limit(&self) -> u64 { self.per_page as u64 }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductSort { #[default] Newest, PriceAsc, PriceDesc, Rating, Name }

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<Category>,
    pub gender: Option<Gender>,
    pub brand: Option<String>,
    /// Only products with this size in stock.
    pub size: Option<String>,
    pub min_price: Option<rust_decimal::Decimal>,
    pub max_price: Option<rust_decimal::Decimal>,
    /// `None` means every status.
    pub status: Option<ProductStatus>,
    pub sort: ProductSort,
    pub page: PageRequest,
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub page: PageRequest,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LowStock { pub product_id: Uuid, pub name: String, pub sku: String, pub size: String, pub stock: u32 }

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct CustomerOrderSummary { pub order_count: u64, pub total_spent: rust_decimal::Decimal }

/// One line of stock to take for an order.
///
/// Lines order by product, then size; that is the order size rows are locked in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReservationLine { pub product_id: Uuid, pub size: String, pub quantity: u32 }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ReservationState { Held, Committed, Released }

/// Everything `place_order` applies in one atomic step.
#[derive(Clone, Debug)]
pub struct Placement {
    pub order: Order,
    /// Sorted when built with [`Placement::new`].
    pub lines: Vec<ReservationLine>,
    /// Held reservations lapse at this instant; `None` commits them immediately.
    pub hold_until: Option<DateTime<Utc>>,
    pub coupon_id: Option<Uuid>,
}

impl Placement {
    pub fn new(order: Order, mut lines: Vec<ReservationLine>, hold_until: Option<DateTime<Utc>>, coupon_id: Option<Uuid>) -> Self {
        lines.sort();
        Self { order, lines, hold_until, coupon_id }
    }
}

#[derive(Clone, Debug)]
pub enum PlaceOutcome {
    Created(Order),
    /// An order with the same idempotency key already existed.
    Replayed(Order),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Fails with `Conflict` when the SKU or slug is taken.
    async fn insert_product(&self, product: &Product) -> Result<()>;
    /// Writes catalog fields; sizes and stock are only changed through the stock operations.
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>>;
    /// Sets a size's stock, creating the size if needed.
    async fn set_stock(&self, product_id: Uuid, size: &str, stock: u32) -> Result<u32>;
    /// Adds `delta` to a size's stock; fails with `InsufficientStock` rather than going negative.
    async fn adjust_stock(&self, product_id: Uuid, size: &str, delta: i32) -> Result<u32>;
    async fn low_stock(&self, threshold: u32) -> Result<Vec<LowStock>>;
    /// Recomputes the rating average and count from reviews.
    async fn refresh_rating(&self, product_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Fails with `Conflict` when the email is registered.
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;
    async fn update_customer(&self, customer: &Customer) -> Result<()>;
    async fn customer(&self, id: Uuid) -> Result<Option<Customer>>;
    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>>;
    async fn list_customers(&self, search: Option<&str>, page: PageRequest) -> Result<Page<Customer>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Empty cart when the customer has none yet.
    async fn cart(&self, customer_id: Uuid) -> Result<Cart>;
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn update_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn delete_coupon(&self, id: Uuid) -> Result<bool>;
    async fn coupon(&self, id: Uuid) -> Result<Option<Coupon>>;
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically: replay on a known idempotency key, otherwise take stock for every
    /// line with a `stock >= quantity` guard, consume one coupon use, record the
    /// reservations and insert the order. Any failure leaves no trace.
    async fn place_order(&self, placement: Placement) -> Result<PlaceOutcome>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>>;
    async fn order_by_idempotency_key(&self, customer_id: Uuid, key: &str) -> Result<Option<Order>>;
    /// Optimistic write: fails with `Conflict` when `order.version` is stale, bumps it on success.
    async fn update_order(&self, order: &mut Order) -> Result<()>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>>;
    /// Held -> committed. Returns how many reservations changed.
    async fn commit_reservations(&self, order_id: Uuid) -> Result<u32>;
    /// Held -> released, returning the stock. Returns how many reservations changed.
    async fn release_held(&self, order_id: Uuid) -> Result<u32>;
    /// Held or committed -> released, returning the stock.
    async fn restock(&self, order_id: Uuid) -> Result<u32>;
    async fn expired_pending(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Order>>;
    async fn has_delivered_purchase(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool>;
    async fn order_summary(&self, customer_id: Uuid) -> Result<CustomerOrderSummary>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Fails with `Conflict` when the customer already reviewed the product.
    async fn insert_review(&self, review: &Review) -> Result<()>;
    async fn review(&self, id: Uuid) -> Result<Option<Review>>;
    async fn delete_review(&self, id: Uuid) -> Result<bool>;
    async fn reviews_for(&self, product_id: Uuid, page: PageRequest) -> Result<Page<Review>>;
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn wishlist(&self, customer_id: Uuid) -> Result<Vec<Uuid>>;
    /// Returns false when the product was already listed.
    async fn add_to_wishlist(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool>;
    async fn remove_from_wishlist(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_collection(&self, collection: &Collection) -> Result<()>;
    async fn update_collection(&self, collection: &Collection) -> Result<()>;
    async fn delete_collection(&self, id: Uuid) -> Result<bool>;
    async fn collection(&self, id: Uuid) -> Result<Option<Collection>>;
    async fn collection_by_slug(&self, slug: &str) -> Result<Option<Collection>>;
    async fn list_collections(&self, active_only: bool) -> Result<Vec<Collection>>;
    async fn best_sellers(&self) -> Result<Vec<BestSeller>>;
    async fn replace_best_sellers(&self, ranking: &[BestSeller]) -> Result<()>;
}

#[async_trait]
pub trait Storage:
    ProductStore + CustomerStore + CartStore + CouponStore + OrderStore + ReviewStore + WishlistStore + ContentStore
{
    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<()>;
}
