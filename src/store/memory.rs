//! In-process storage behind a single `RwLock`.
//!
//! Every operation takes the lock once, so multi-step operations such as
//! `place_order` are atomic with respect to each other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::{CouponRejection, PaymentStatus, ProductError, MAX_STOCK};
use crate::domain::aggregates::review::average_rating;
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    customers: HashMap<Uuid, Customer>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<Uuid, Coupon>,
    orders: HashMap<Uuid, Order>,
    reservations: Vec<Reservation>,
    reviews: HashMap<Uuid, Review>,
    wishlists: HashMap<Uuid, Vec<Uuid>>,
    collections: HashMap<Uuid, Collection>,
    best_sellers: Vec<BestSeller>,
}

#[derive(Clone, Debug)]
struct Reservation {
    order_id: Uuid,
    product_id: Uuid,
    size: String,
    quantity: u32,
    state: ReservationState,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl Inner {
    fn stock_of(&self, product_id: Uuid, size: &str) -> u32 {
        self.products.get(&product_id).and_then(|p| p.size(size)).map(|s| s.stock).unwrap_or(0)
    }

    fn stock_mut(&mut self, product_id: Uuid, size: &str) -> Option<&mut u32> {
        self.products.get_mut(&product_id)
            .and_then(|p| p.sizes.iter_mut().find(|s| s.size == size))
            .map(|s| &mut s.stock)
    }

    fn transition_reservations(&mut self, order_id: Uuid, from: &[ReservationState], to: ReservationState) -> u32 {
        let mut returned = Vec::new();
        let mut changed = 0;
        for r in self.reservations.iter_mut().filter(|r| r.order_id == order_id && from.contains(&r.state)) {
            r.state = to;
            changed += 1;
            if to == ReservationState::Released { returned.push((r.product_id, r.size.clone(), r.quantity)); }
        }
        for (product_id, size, quantity) in returned {
            if let Some(stock) = self.stock_mut(product_id, &size) { *stock += quantity; }
        }
        changed
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let data = items.into_iter().skip(page.offset() as usize).take(page.limit() as usize).collect();
    Page { data, total, page: page.page, per_page: page.per_page }
}

fn matches_product(p: &Product, f: &ProductFilter) -> bool {
    if let Some(status) = f.status { if p.status != status { return false; } }
    if let Some(category) = f.category { if p.category != category { return false; } }
    if let Some(gender) = f.gender { if p.gender != gender { return false; } }
    if let Some(brand) = &f.brand { if !p.brand.eq_ignore_ascii_case(brand) { return false; } }
    if let Some(size) = &f.size { if !p.size(size).is_some_and(|s| s.stock > 0) { return false; } }
    if let Some(min) = f.min_price { if p.price.amount() < min { return false; } }
    if let Some(max) = f.max_price { if p.price.amount() > max { return false; } }
    if let Some(q) = &f.search {
        let q = q.to_lowercase();
        let hit = p.name.to_lowercase().contains(&q)
            || p.brand.to_lowercase().contains(&q)
            || p.tags.iter().any(|t| t.contains(&q));
        if !hit { return false; }
    }
    true
}

fn sort_products(products: &mut [Product], sort: ProductSort) {
    match sort {
        ProductSort::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
        ProductSort::PriceAsc => products.sort_by(|a, b| a.price.amount().cmp(&b.price.amount()).then(a.id.cmp(&b.id))),
        ProductSort::PriceDesc => products.sort_by(|a, b| b.price.amount().cmp(&a.price.amount()).then(a.id.cmp(&b.id))),
        ProductSort::Rating => products.sort_by(|a, b| {
            b.rating_average.total_cmp(&a.rating_average).then(b.rating_count.cmp(&a.rating_count)).then(a.id.cmp(&b.id))
        }),
        ProductSort::Name => products.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id))),
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Conflict(format!("SKU '{}' already exists", product.sku)));
        }
        if inner.products.values().any(|p| p.slug == product.slug) {
            return Err(StoreError::Conflict(format!("A product named '{}' already exists", product.name)));
        }
        inner.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.products.values().any(|p| p.id != product.id && (p.slug == product.slug || p.sku == product.sku)) {
            return Err(StoreError::Conflict(format!("Another product already uses '{}'", product.slug)));
        }
        let stored = inner.products.get_mut(&product.id).ok_or_else(|| StoreError::not_found("Product"))?;
        let sizes = std::mem::take(&mut stored.sizes);
        let (rating_average, rating_count) = (stored.rating_average, stored.rating_count);
        *stored = Product { sizes, rating_average, rating_count, ..product.clone() };
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.products.get(id).cloned()).collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>> {
        let inner = self.inner.read().await;
        let mut products: Vec<Product> = inner.products.values().filter(|p| matches_product(p, filter)).cloned().collect();
        sort_products(&mut products, filter.sort);
        Ok(paginate(products, filter.page))
    }

    async fn set_stock(&self, product_id: Uuid, size: &str, stock: u32) -> Result<u32> {
        let mut inner = self.inner.write().await;
        let product = inner.products.get_mut(&product_id).ok_or_else(|| StoreError::not_found("Product"))?;
        product.put_size(size, stock)?;
        Ok(stock)
    }

    async fn adjust_stock(&self, product_id: Uuid, size: &str, delta: i32) -> Result<u32> {
        let mut inner = self.inner.write().await;
        if !inner.products.contains_key(&product_id) { return Err(StoreError::not_found("Product")); }
        let stock = inner.stock_mut(product_id, size).ok_or_else(|| StoreError::not_found(format!("Size '{}'", size)))?;
        let next = i64::from(*stock) + i64::from(delta);
        if next < 0 {
            return Err(StoreError::InsufficientStock {
                product_id, size: size.to_string(), available: *stock, requested: delta.unsigned_abs(),
            });
        }
        *stock = u32::try_from(next).ok().filter(|n| *n <= MAX_STOCK).ok_or(ProductError::StockLimit)?;
        Ok(*stock)
    }

    async fn low_stock(&self, threshold: u32) -> Result<Vec<LowStock>> {
        let inner = self.inner.read().await;
        let mut out: Vec<LowStock> = inner.products.values()
            .filter(|p| p.status != ProductStatus::Archived)
            .flat_map(|p| p.sizes.iter().filter(move |s| s.stock <= threshold).map(move |s| LowStock {
                product_id: p.id, name: p.name.clone(), sku: p.sku.to_string(), size: s.size.clone(), stock: s.stock,
            }))
            .collect();
        out.sort_by(|a, b| a.stock.cmp(&b.stock).then(a.name.cmp(&b.name)).then(a.size.cmp(&b.size)));
        Ok(out)
    }

    async fn refresh_rating(&self, product_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let (avg, count) = average_rating(inner.reviews.values().filter(|r| r.product_id == product_id).map(|r| r.rating));
        if let Some(p) = inner.products.get_mut(&product_id) {
            p.rating_average = avg;
            p.rating_count = count;
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.customers.values().any(|c| c.email == customer.email) {
            return Err(StoreError::Conflict("Email is already registered".into()));
        }
        inner.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.customers.get_mut(&customer.id).ok_or_else(|| StoreError::not_found("Customer"))?;
        *stored = customer.clone();
        Ok(())
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> {
        Ok(self.inner.read().await.customers.get(&id).cloned())
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let email = Customer::normalize_email(email);
        Ok(self.inner.read().await.customers.values().find(|c| c.email == email).cloned())
    }

    async fn list_customers(&self, search: Option<&str>, page: PageRequest) -> Result<Page<Customer>> {
        let inner = self.inner.read().await;
        let needle = search.map(str::to_lowercase);
        let mut customers: Vec<Customer> = inner.customers.values()
            .filter(|c| needle.as_ref().map_or(true, |n| c.email.contains(n) || c.name.to_lowercase().contains(n)))
            .cloned()
            .collect();
        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(customers, page))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart(&self, customer_id: Uuid) -> Result<Cart> {
        Ok(self.inner.read().await.carts.get(&customer_id).cloned().unwrap_or_else(|| Cart::new(customer_id)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.inner.write().await.carts.insert(cart.customer_id, cart.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::Conflict(format!("Coupon '{}' already exists", coupon.code)));
        }
        inner.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn update_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.coupons.values().any(|c| c.id != coupon.id && c.code == coupon.code) {
            return Err(StoreError::Conflict(format!("Coupon '{}' already exists", coupon.code)));
        }
        let stored = inner.coupons.get_mut(&coupon.id).ok_or_else(|| StoreError::not_found("Coupon"))?;
        // usage is owned by order placement
        let used_count = stored.used_count;
        *stored = Coupon { used_count, ..coupon.clone() };
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.coupons.remove(&id).is_some())
    }

    async fn coupon(&self, id: Uuid) -> Result<Option<Coupon>> {
        Ok(self.inner.read().await.coupons.get(&id).cloned())
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let code = Coupon::normalize_code(code);
        Ok(self.inner.read().await.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let mut coupons: Vec<Coupon> = self.inner.read().await.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, placement: Placement) -> Result<PlaceOutcome> {
        let mut inner = self.inner.write().await;
        let order = placement.order;

        if let Some(key) = &order.idempotency_key {
            if let Some(existing) = inner.orders.values()
                .find(|o| o.customer_id == order.customer_id && o.idempotency_key.as_deref() == Some(key.as_str()))
            {
                return Ok(PlaceOutcome::Replayed(existing.clone()));
            }
        }
        if inner.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict("Order number collision, please retry".into()));
        }

        // check every line before touching anything
        let mut requested: HashMap<(Uuid, &str), u32> = HashMap::new();
        for line in &placement.lines {
            let wanted = requested.entry((line.product_id, line.size.as_str())).or_insert(0);
            *wanted += line.quantity;
            let available = inner.stock_of(line.product_id, &line.size);
            if available < *wanted {
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id, size: line.size.clone(), available, requested: *wanted,
                });
            }
        }
        if let Some(coupon_id) = placement.coupon_id {
            let coupon = inner.coupons.get(&coupon_id).ok_or(StoreError::CouponRejected(CouponRejection::Unknown))?;
            if coupon.usage_limit.is_some_and(|limit| coupon.used_count >= limit) {
                return Err(StoreError::CouponRejected(CouponRejection::Exhausted));
            }
        }

        let state = if placement.hold_until.is_some() { ReservationState::Held } else { ReservationState::Committed };
        for line in &placement.lines {
            if let Some(stock) = inner.stock_mut(line.product_id, &line.size) { *stock -= line.quantity; }
            inner.reservations.push(Reservation {
                order_id: order.id, product_id: line.product_id, size: line.size.clone(),
                quantity: line.quantity, state,
            });
        }
        if let Some(coupon) = placement.coupon_id.and_then(|id| inner.coupons.get_mut(&id)) {
            coupon.used_count += 1;
        }
        inner.orders.insert(order.id, order.clone());
        Ok(PlaceOutcome::Created(order))
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.values().find(|o| o.order_number == order_number).cloned())
    }

    async fn order_by_idempotency_key(&self, customer_id: Uuid, key: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.values()
            .find(|o| o.customer_id == customer_id && o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_order(&self, order: &mut Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.orders.get_mut(&order.id).ok_or_else(|| StoreError::not_found("Order"))?;
        if stored.version != order.version {
            return Err(StoreError::Conflict("Order was modified concurrently, reload and retry".into()));
        }
        order.version += 1;
        *stored = order.clone();
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values()
            .filter(|o| filter.customer_id.map_or(true, |c| o.customer_id == c))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(orders, filter.page))
    }

    async fn commit_reservations(&self, order_id: Uuid) -> Result<u32> {
        Ok(self.inner.write().await.transition_reservations(order_id, &[ReservationState::Held], ReservationState::Committed))
    }

    async fn release_held(&self, order_id: Uuid) -> Result<u32> {
        Ok(self.inner.write().await.transition_reservations(order_id, &[ReservationState::Held], ReservationState::Released))
    }

    async fn restock(&self, order_id: Uuid) -> Result<u32> {
        Ok(self.inner.write().await.transition_reservations(
            order_id, &[ReservationState::Held, ReservationState::Committed], ReservationState::Released,
        ))
    }

    async fn expired_pending(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut expired: Vec<Order> = inner.orders.values()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.reserved_until.is_some_and(|t| t <= now))
            .cloned()
            .collect();
        expired.sort_by_key(|o| o.reserved_until);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn has_delivered_purchase(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool> {
        Ok(self.inner.read().await.orders.values().any(|o| {
            o.customer_id == customer_id && o.status == OrderStatus::Delivered && o.contains_product(product_id)
        }))
    }

    async fn order_summary(&self, customer_id: Uuid) -> Result<CustomerOrderSummary> {
        let inner = self.inner.read().await;
        let mine = inner.orders.values().filter(|o| o.customer_id == customer_id);
        let mut summary = CustomerOrderSummary::default();
        for o in mine {
            summary.order_count += 1;
            if o.payment.status == PaymentStatus::Paid { summary.total_spent += o.total.amount(); }
        }
        Ok(summary)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.reviews.values().any(|r| r.product_id == review.product_id && r.customer_id == review.customer_id) {
            return Err(StoreError::Conflict("You have already reviewed this product".into()));
        }
        inner.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn review(&self, id: Uuid) -> Result<Option<Review>> {
        Ok(self.inner.read().await.reviews.get(&id).cloned())
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.reviews.remove(&id).is_some())
    }

    async fn reviews_for(&self, product_id: Uuid, page: PageRequest) -> Result<Page<Review>> {
        let inner = self.inner.read().await;
        let mut reviews: Vec<Review> = inner.reviews.values().filter(|r| r.product_id == product_id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(reviews, page))
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn wishlist(&self, customer_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.inner.read().await.wishlists.get(&customer_id).cloned().unwrap_or_default())
    }

    async fn add_to_wishlist(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let list = inner.wishlists.entry(customer_id).or_default();
        if list.contains(&product_id) { return Ok(false); }
        list.push(product_id);
        Ok(true)
    }

    async fn remove_from_wishlist(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(list) = inner.wishlists.get_mut(&customer_id) else { return Ok(false) };
        let before = list.len();
        list.retain(|p| *p != product_id);
        Ok(list.len() != before)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.collections.values().any(|c| c.slug == collection.slug) {
            return Err(StoreError::Conflict(format!("Collection '{}' already exists", collection.slug)));
        }
        inner.collections.insert(collection.id, collection.clone());
        Ok(())
    }

    async fn update_collection(&self, collection: &Collection) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.collections.values().any(|c| c.id != collection.id && c.slug == collection.slug) {
            return Err(StoreError::Conflict(format!("Collection '{}' already exists", collection.slug)));
        }
        let stored = inner.collections.get_mut(&collection.id).ok_or_else(|| StoreError::not_found("Collection"))?;
        *stored = collection.clone();
        Ok(())
    }

    async fn delete_collection(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.collections.remove(&id).is_some())
    }

    async fn collection(&self, id: Uuid) -> Result<Option<Collection>> {
        Ok(self.inner.read().await.collections.get(&id).cloned())
    }

    async fn collection_by_slug(&self, slug: &str) -> Result<Option<Collection>> {
        Ok(self.inner.read().await.collections.values().find(|c| c.slug == slug).cloned())
    }

    async fn list_collections(&self, active_only: bool) -> Result<Vec<Collection>> {
        let mut out: Vec<Collection> = self.inner.read().await.collections.values()
            .filter(|c| !active_only || c.active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.position.cmp(&b.position).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    async fn best_sellers(&self) -> Result<Vec<BestSeller>> {
        let mut out = self.inner.read().await.best_sellers.clone();
        out.sort_by_key(|b| b.rank);
        Ok(out)
    }

    async fn replace_best_sellers(&self, ranking: &[BestSeller]) -> Result<()> {
        self.inner.write().await.best_sellers = ranking.to_vec();
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn ping(&self) -> Result<()> { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::sample_draft;
    use crate::domain::aggregates::{product, PaymentMethod};
    use rust_decimal_macros::dec;

    fn placement_for(product: &Product, size: &str, quantity: u32, hold: bool) -> Placement {
        let order = Order::create(sample_draft(PaymentMethod::Online), None).unwrap();
        Placement {
            order,
            lines: vec![ReservationLine { product_id: product.id, size: size.into(), quantity }],
            hold_until: hold.then(Utc::now),
            coupon_id: None,
        }
    }

    #[tokio::test]
    async fn test_place_order_takes_stock_atomically() {
        let store = MemoryStore::new();
        let p = product::sample("Court", dec!(1000), &[("UK 8", 2), ("UK 9", 1)]);
        store.insert_product(&p).await.unwrap();

        let mut placement = placement_for(&p, "UK 8", 2, true);
        placement.lines.push(ReservationLine { product_id: p.id, size: "UK 9".into(), quantity: 2 });
        let err = store.place_order(placement).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 1, requested: 2, .. }));
        // nothing was taken by the failed attempt
        assert_eq!(store.product(p.id).await.unwrap().unwrap().size("UK 8").unwrap().stock, 2);

        store.place_order(placement_for(&p, "UK 8", 2, true)).await.unwrap();
        assert_eq!(store.product(p.id).await.unwrap().unwrap().size("UK 8").unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_release_happens_once() {
        let store = MemoryStore::new();
        let p = product::sample("Court", dec!(1000), &[("UK 8", 3)]);
        store.insert_product(&p).await.unwrap();
        let placement = placement_for(&p, "UK 8", 2, true);
        let order_id = placement.order.id;
        store.place_order(placement).await.unwrap();

        assert_eq!(store.release_held(order_id).await.unwrap(), 1);
        assert_eq!(store.release_held(order_id).await.unwrap(), 0);
        assert_eq!(store.restock(order_id).await.unwrap(), 0);
        assert_eq!(store.commit_reservations(order_id).await.unwrap(), 0);
        assert_eq!(store.product(p.id).await.unwrap().unwrap().size("UK 8").unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_idempotent_replay() {
        let store = MemoryStore::new();
        let p = product::sample("Court", dec!(1000), &[("UK 8", 5)]);
        store.insert_product(&p).await.unwrap();
        let mut first = placement_for(&p, "UK 8", 1, false);
        first.order.idempotency_key = Some("k1".into());
        let mut second = placement_for(&p, "UK 8", 1, false);
        second.order.customer_id = first.order.customer_id;
        second.order.idempotency_key = Some("k1".into());

        let created = store.place_order(first).await.unwrap();
        let replayed = store.place_order(second).await.unwrap();
        match (created, replayed) {
            (PlaceOutcome::Created(a), PlaceOutcome::Replayed(b)) => assert_eq!(a.id, b.id),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.product(p.id).await.unwrap().unwrap().size("UK 8").unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_stale_order_version_conflicts() {
        let store = MemoryStore::new();
        let p = product::sample("Court", dec!(1000), &[("UK 8", 5)]);
        store.insert_product(&p).await.unwrap();
        let placement = placement_for(&p, "UK 8", 1, true);
        let id = placement.order.id;
        store.place_order(placement).await.unwrap();

        let mut a = store.order(id).await.unwrap().unwrap();
        let mut b = a.clone();
        a.expire().unwrap();
        store.update_order(&mut a).await.unwrap();
        b.mark_paid("pay".into()).unwrap();
        assert!(matches!(store.update_order(&mut b).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_adjust_stock_never_negative() {
        let store = MemoryStore::new();
        let p = product::sample("Court", dec!(1000), &[("UK 8", 1)]);
        store.insert_product(&p).await.unwrap();
        assert_eq!(store.adjust_stock(p.id, "UK 8", 4).await.unwrap(), 5);
        assert!(matches!(store.adjust_stock(p.id, "UK 8", -6).await, Err(StoreError::InsufficientStock { .. })));
        assert_eq!(store.adjust_stock(p.id, "UK 8", -5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_adjust_stock_stays_within_limit() {
        let store = MemoryStore::new();
        let p = product::sample("Court", dec!(1000), &[("UK 8", MAX_STOCK)]);
        store.insert_product(&p).await.unwrap();
        assert!(matches!(store.adjust_stock(p.id, "UK 8", i32::MAX).await, Err(StoreError::Validation(_))));
        assert_eq!(store.product(p.id).await.unwrap().unwrap().size("UK 8").unwrap().stock, MAX_STOCK);
    }
}
