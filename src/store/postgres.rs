//! PostgreSQL storage.
//!
//! Nested order data (lines, address, payment, tracking, history) lives in JSONB
//! columns; sizes and reservations get their own tables because stock is
//! changed with guarded row updates.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder};
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::order::{PaymentDetails, StatusChange};
use crate::domain::aggregates::{
    Address, CartItem, CouponKind, CouponRejection, OrderLine, ProductError, Role, SizeStock, Tracking, MAX_STOCK,
};
use crate::domain::value_objects::{Money, Sku};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub fn pool(&self) -> &PgPool { &self.pool }

    async fn load_products(&self, rows: Vec<ProductRow>) -> Result<Vec<Product>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let sizes = sqlx::query_as::<_, SizeRow>(
            "SELECT product_id, size, stock FROM product_sizes WHERE product_id = ANY($1) ORDER BY product_id, size",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_product: HashMap<Uuid, Vec<SizeStock>> = HashMap::new();
        for s in sizes {
            by_product.entry(s.product_id).or_default().push(SizeStock { size: s.size, stock: s.stock as u32 });
        }
        rows.into_iter()
            .map(|row| {
                let sizes = by_product.remove(&row.id).unwrap_or_default();
                row.into_product(sizes)
            })
            .collect()
    }

    async fn load_product(&self, row: Option<ProductRow>) -> Result<Option<Product>> {
        match row {
            Some(row) => Ok(self.load_products(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn move_reservations(&self, order_id: Uuid, from: &[ReservationState], to: ReservationState) -> Result<u32> {
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();
        if to != ReservationState::Released {
            let done = sqlx::query(
                "UPDATE stock_reservations SET state = $3, updated_at = NOW() WHERE order_id = $1 AND state = ANY($2)",
            )
            .bind(order_id)
            .bind(&from)
            .bind(to.to_string())
            .execute(&self.pool)
            .await?;
            return Ok(done.rows_affected() as u32);
        }
        // Released rows hand their quantity back in the same statement so a
        // reservation can never be returned twice.
        let released: i64 = sqlx::query_scalar(
            r#"
            WITH released AS (
                UPDATE stock_reservations SET state = 'released', updated_at = NOW()
                WHERE order_id = $1 AND state = ANY($2)
                RETURNING product_id, size, quantity
            ), returned AS (
                UPDATE product_sizes ps SET stock = ps.stock + r.quantity
                FROM (SELECT product_id, size, SUM(quantity)::INT AS quantity FROM released GROUP BY product_id, size) r
                WHERE ps.product_id = r.product_id AND ps.size = r.size
                RETURNING 1
            )
            SELECT COUNT(*) FROM released
            "#,
        )
        .bind(order_id)
        .bind(&from)
        .fetch_one(&self.pool)
        .await?;
        Ok(released as u32)
    }
}

fn parse<T: FromStr>(column: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| StoreError::Internal(format!("unexpected {} value '{}'", column, raw)))
}

/// Maps a unique-constraint violation to `Conflict`, passing other errors through.
fn conflict_on_duplicate(err: sqlx::Error, message: impl Into<String>) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message.into()),
        _ => StoreError::Database(err),
    }
}

#[derive(FromRow)]
struct SizeRow { product_id: Uuid, size: String, stock: i32 }

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    slug: String,
    brand: String,
    description: String,
    category: String,
    gender: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    currency: String,
    images: Vec<String>,
    tags: Vec<String>,
    status: String,
    rating_average: f64,
    rating_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, sizes: Vec<SizeStock>) -> Result<Product> {
        Ok(Product {
            id: self.id,
            sku: Sku::new(self.sku).map_err(|e| StoreError::Internal(e.to_string()))?,
            name: self.name,
            slug: self.slug,
            brand: self.brand,
            description: self.description,
            category: parse("category", &self.category)?,
            gender: parse("gender", &self.gender)?,
            price: Money::new(self.price, &self.currency),
            compare_at_price: self.compare_at_price.map(|p| Money::new(p, &self.currency)),
            images: self.images,
            tags: self.tags,
            sizes,
            status: parse("status", &self.status)?,
            rating_average: self.rating_average,
            rating_count: self.rating_count as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    phone: Option<String>,
    default_address: Option<Json<Address>>,
    role: String,
    blocked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;

    fn try_from(row: CustomerRow) -> Result<Self> {
        Ok(Customer {
            id: row.id, name: row.name, email: row.email, password_hash: row.password_hash, phone: row.phone,
            default_address: row.default_address.map(|a| a.0), role: parse::<Role>("role", &row.role)?,
            blocked: row.blocked, created_at: row.created_at, updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CartRow { customer_id: Uuid, items: Json<Vec<CartItem>>, coupon_code: Option<String>, updated_at: DateTime<Utc> }

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    description: String,
    kind: String,
    value: Decimal,
    min_order: Decimal,
    max_discount: Option<Decimal>,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    used_count: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> Result<Self> {
        Ok(Coupon {
            id: row.id, code: row.code, description: row.description, kind: parse::<CouponKind>("kind", &row.kind)?,
            value: row.value, min_order: row.min_order, max_discount: row.max_discount,
            starts_at: row.starts_at, expires_at: row.expires_at,
            usage_limit: row.usage_limit.map(|l| l as u32), used_count: row.used_count as u32,
            active: row.active, created_at: row.created_at, updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    email: String,
    status: String,
    lines: Json<Vec<OrderLine>>,
    currency: String,
    subtotal: Decimal,
    discount: Decimal,
    shipping: Decimal,
    total: Decimal,
    coupon_code: Option<String>,
    shipping_address: Json<Address>,
    payment: Json<PaymentDetails>,
    tracking: Option<Json<Tracking>>,
    history: Json<Vec<StatusChange>>,
    note: Option<String>,
    idempotency_key: Option<String>,
    fingerprint: Option<String>,
    reserved_until: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self> {
        let money = |amount| Money::new(amount, &row.currency);
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            customer_id: row.customer_id,
            email: row.email,
            status: parse("status", &row.status)?,
            lines: row.lines.0,
            subtotal: money(row.subtotal),
            discount: money(row.discount),
            shipping: money(row.shipping),
            total: money(row.total),
            coupon_code: row.coupon_code,
            shipping_address: row.shipping_address.0,
            payment: row.payment.0,
            tracking: row.tracking.map(|t| t.0),
            history: row.history.0,
            note: row.note,
            idempotency_key: row.idempotency_key,
            fingerprint: row.fingerprint,
            reserved_until: row.reserved_until,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    customer_id: Uuid,
    author: String,
    rating: i16,
    title: String,
    body: String,
    verified_purchase: bool,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id, product_id: row.product_id, customer_id: row.customer_id, author: row.author,
            rating: row.rating as u8, title: row.title, body: row.body,
            verified_purchase: row.verified_purchase, created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct CollectionRow {
    id: Uuid,
    name: String,
    slug: String,
    description: String,
    banner_image: Option<String>,
    product_ids: Vec<Uuid>,
    position: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Collection {
            id: row.id, name: row.name, slug: row.slug, description: row.description,
            banner_image: row.banner_image, product_ids: row.product_ids, position: row.position,
            active: row.active, created_at: row.created_at, updated_at: row.updated_at,
        }
    }
}

fn push_product_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = f.status { qb.push(" AND p.status = ").push_bind(status.to_string()); }
    if let Some(category) = f.category { qb.push(" AND p.category = ").push_bind(category.to_string()); }
    if let Some(gender) = f.gender { qb.push(" AND p.gender = ").push_bind(gender.to_string()); }
    if let Some(brand) = &f.brand { qb.push(" AND LOWER(p.brand) = LOWER(").push_bind(brand.clone()).push(")"); }
    if let Some(size) = &f.size {
        qb.push(" AND EXISTS (SELECT 1 FROM product_sizes s WHERE s.product_id = p.id AND s.stock > 0 AND s.size = ")
            .push_bind(size.clone())
            .push(")");
    }
    if let Some(min) = f.min_price { qb.push(" AND p.price >= ").push_bind(min); }
    if let Some(max) = f.max_price { qb.push(" AND p.price <= ").push_bind(max); }
    if let Some(q) = &f.search {
        let pattern = format!("%{}%", q.to_lowercase().replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND (LOWER(p.name) LIKE ").push_bind(pattern.clone())
            .push(" OR LOWER(p.brand) LIKE ").push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM UNNEST(p.tags) t WHERE t LIKE ").push_bind(pattern)
            .push("))");
    }
}

fn product_order_by(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Newest => " ORDER BY p.created_at DESC, p.id DESC",
        ProductSort::PriceAsc => " ORDER BY p.price ASC, p.id",
        ProductSort::PriceDesc => " ORDER BY p.price DESC, p.id",
        ProductSort::Rating => " ORDER BY p.rating_average DESC, p.rating_count DESC, p.id",
        ProductSort::Name => " ORDER BY LOWER(p.name), p.id",
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO products (id, sku, name, slug, brand, description, category, gender, price, compare_at_price, \
             currency, images, tags, status, rating_average, rating_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, 0, $15, $16)",
        )
        .bind(product.id)
        .bind(product.sku.as_str())
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.brand)
        .bind(&product.description)
        .bind(product.category.to_string())
        .bind(product.gender.to_string())
        .bind(product.price.amount())
        .bind(product.compare_at_price.as_ref().map(Money::amount))
        .bind(product.price.currency())
        .bind(&product.images)
        .bind(&product.tags)
        .bind(product.status.to_string())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_duplicate(e, format!("SKU '{}' or name '{}' already exists", product.sku, product.name)))?;
        for s in &product.sizes {
            sqlx::query("INSERT INTO product_sizes (product_id, size, stock) VALUES ($1, $2, $3)")
                .bind(product.id)
                .bind(&s.size)
                .bind(s.stock as i32)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let done = sqlx::query(
            "UPDATE products SET sku = $2, name = $3, slug = $4, brand = $5, description = $6, category = $7, \
             gender = $8, price = $9, compare_at_price = $10, currency = $11, images = $12, tags = $13, status = $14, \
             updated_at = $15 WHERE id = $1",
        )
        .bind(product.id)
        .bind(product.sku.as_str())
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.brand)
        .bind(&product.description)
        .bind(product.category.to_string())
        .bind(product.gender.to_string())
        .bind(product.price.amount())
        .bind(product.compare_at_price.as_ref().map(Money::amount))
        .bind(product.price.currency())
        .bind(&product.images)
        .bind(&product.tags)
        .bind(product.status.to_string())
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, format!("Another product already uses '{}'", product.slug)))?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("Product")); }
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.load_product(row).await
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        self.load_product(row).await
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        let mut products: HashMap<Uuid, Product> =
            self.load_products(rows).await?.into_iter().map(|p| (p.id, p)).collect();
        Ok(ids.iter().filter_map(|id| products.remove(id)).collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_product_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT p.* FROM products p");
        push_product_filter(&mut select, filter);
        select.push(product_order_by(filter.sort));
        select.push(" LIMIT ").push_bind(filter.page.limit() as i64);
        select.push(" OFFSET ").push_bind(filter.page.offset() as i64);
        let rows = select.build_query_as::<ProductRow>().fetch_all(&self.pool).await?;

        Ok(Page {
            data: self.load_products(rows).await?,
            total: total as u64,
            page: filter.page.page,
            per_page: filter.page.per_page,
        })
    }

    async fn set_stock(&self, product_id: Uuid, size: &str, stock: u32) -> Result<u32> {
        let mut product = self.product(product_id).await?.ok_or_else(|| StoreError::not_found("Product"))?;
        product.put_size(size, stock)?;
        sqlx::query(
            "INSERT INTO product_sizes (product_id, size, stock) VALUES ($1, $2, $3) \
             ON CONFLICT (product_id, size) DO UPDATE SET stock = EXCLUDED.stock",
        )
        .bind(product_id)
        .bind(size.trim())
        .bind(stock as i32)
        .execute(&self.pool)
        .await?;
        Ok(stock)
    }

    async fn adjust_stock(&self, product_id: Uuid, size: &str, delta: i32) -> Result<u32> {
        let updated: Option<i32> = sqlx::query_scalar(
            "UPDATE product_sizes SET stock = stock + $3 \
             WHERE product_id = $1 AND size = $2 AND stock + $3 BETWEEN 0 AND $4 RETURNING stock",
        )
        .bind(product_id)
        .bind(size)
        .bind(i64::from(delta))
        .bind(i64::from(MAX_STOCK))
        .fetch_optional(&self.pool)
        .await?;
        if let Some(stock) = updated { return Ok(stock as u32); }

        let current: Option<i32> = sqlx::query_scalar("SELECT stock FROM product_sizes WHERE product_id = $1 AND size = $2")
            .bind(product_id)
            .bind(size)
            .fetch_optional(&self.pool)
            .await?;
        match current {
            Some(available) if i64::from(available) + i64::from(delta) > i64::from(MAX_STOCK) => Err(ProductError::StockLimit.into()),
            Some(available) => Err(StoreError::InsufficientStock {
                product_id, size: size.to_string(), available: available as u32, requested: delta.unsigned_abs(),
            }),
            None => Err(StoreError::not_found(format!("Size '{}'", size))),
        }
    }

    async fn low_stock(&self, threshold: u32) -> Result<Vec<LowStock>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, String, i32)>(
            "SELECT p.id, p.name, p.sku, s.size, s.stock FROM product_sizes s JOIN products p ON p.id = s.product_id \
             WHERE p.status <> 'archived' AND s.stock <= $1 ORDER BY s.stock, p.name, s.size",
        )
        .bind(threshold as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter()
            .map(|(product_id, name, sku, size, stock)| LowStock { product_id, name, sku, size, stock: stock as u32 })
            .collect())
    }

    async fn refresh_rating(&self, product_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE products SET \
             rating_average = COALESCE((SELECT ROUND(AVG(rating)::NUMERIC, 1)::FLOAT8 FROM reviews WHERE product_id = $1), 0), \
             rating_count = (SELECT COUNT(*) FROM reviews WHERE product_id = $1) \
             WHERE id = $1",
        )
        .bind(product_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            "INSERT INTO customers (id, name, email, password_hash, phone, default_address, role, blocked, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.password_hash)
        .bind(&customer.phone)
        .bind(customer.default_address.as_ref().map(Json))
        .bind(customer.role.to_string())
        .bind(customer.blocked)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Email is already registered"))?;
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        let done = sqlx::query(
            "UPDATE customers SET name = $2, password_hash = $3, phone = $4, default_address = $5, role = $6, \
             blocked = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(customer.id)
        .bind(&customer.name)
        .bind(&customer.password_hash)
        .bind(&customer.phone)
        .bind(customer.default_address.as_ref().map(Json))
        .bind(customer.role.to_string())
        .bind(customer.blocked)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("Customer")); }
        Ok(())
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Customer::try_from)
            .transpose()
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE email = $1")
            .bind(Customer::normalize_email(email))
            .fetch_optional(&self.pool)
            .await?
            .map(Customer::try_from)
            .transpose()
    }

    async fn list_customers(&self, search: Option<&str>, page: PageRequest) -> Result<Page<Customer>> {
        let pattern = search.map(|s| format!("%{}%", s.to_lowercase()));
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customers WHERE $1::TEXT IS NULL OR email LIKE $1 OR LOWER(name) LIKE $1",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT * FROM customers WHERE $1::TEXT IS NULL OR email LIKE $1 OR LOWER(name) LIKE $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(&pattern)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page {
            data: rows.into_iter().map(Customer::try_from).collect::<Result<_>>()?,
            total: total as u64,
            page: page.page,
            per_page: page.per_page,
        })
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart(&self, customer_id: Uuid) -> Result<Cart> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => Cart::restore(r.customer_id, r.items.0, r.coupon_code, r.updated_at),
            None => Cart::new(customer_id),
        })
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (customer_id, items, coupon_code, updated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (customer_id) DO UPDATE SET items = EXCLUDED.items, coupon_code = EXCLUDED.coupon_code, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.customer_id)
        .bind(Json(cart.items()))
        .bind(cart.coupon_code())
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupons (id, code, description, kind, value, min_order, max_discount, starts_at, expires_at, \
             usage_limit, used_count, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.kind.to_string())
        .bind(coupon.value)
        .bind(coupon.min_order)
        .bind(coupon.max_discount)
        .bind(coupon.starts_at)
        .bind(coupon.expires_at)
        .bind(coupon.usage_limit.map(|l| l as i32))
        .bind(coupon.used_count as i32)
        .bind(coupon.active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, format!("Coupon '{}' already exists", coupon.code)))?;
        Ok(())
    }

    async fn update_coupon(&self, coupon: &Coupon) -> Result<()> {
        let done = sqlx::query(
            "UPDATE coupons SET code = $2, description = $3, kind = $4, value = $5, min_order = $6, max_discount = $7, \
             starts_at = $8, expires_at = $9, usage_limit = $10, active = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.kind.to_string())
        .bind(coupon.value)
        .bind(coupon.min_order)
        .bind(coupon.max_discount)
        .bind(coupon.starts_at)
        .bind(coupon.expires_at)
        .bind(coupon.usage_limit.map(|l| l as i32))
        .bind(coupon.active)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, format!("Coupon '{}' already exists", coupon.code)))?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("Coupon")); }
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn coupon(&self, id: Uuid) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(Coupon::normalize_code(code))
            .fetch_optional(&self.pool)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Coupon::try_from)
            .collect()
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, placement: Placement) -> Result<PlaceOutcome> {
        let order = placement.order;
        if let Some(key) = &order.idempotency_key {
            if let Some(existing) = self.order_by_idempotency_key(order.customer_id, key).await? {
                return Ok(PlaceOutcome::Replayed(existing));
            }
        }

        let mut tx = self.pool.begin().await?;
        // size rows are locked in (product_id, size) order across concurrent checkouts
        for line in &placement.lines {
            let taken: Option<i32> = sqlx::query_scalar(
                "UPDATE product_sizes SET stock = stock - $3 WHERE product_id = $1 AND size = $2 AND stock >= $3 RETURNING stock",
            )
            .bind(line.product_id)
            .bind(&line.size)
            .bind(line.quantity as i32)
            .fetch_optional(&mut *tx)
            .await?;
            if taken.is_none() {
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT stock FROM product_sizes WHERE product_id = $1 AND size = $2")
                        .bind(line.product_id)
                        .bind(&line.size)
                        .fetch_optional(&mut *tx)
                        .await?;
                tx.rollback().await?;
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    size: line.size.clone(),
                    available: available.unwrap_or(0) as u32,
                    requested: line.quantity,
                });
            }
        }

        if let Some(coupon_id) = placement.coupon_id {
            let used: Option<Uuid> = sqlx::query_scalar(
                "UPDATE coupons SET used_count = used_count + 1 \
                 WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit) RETURNING id",
            )
            .bind(coupon_id)
            .fetch_optional(&mut *tx)
            .await?;
            if used.is_none() {
                tx.rollback().await?;
                let exists = self.coupon(coupon_id).await?.is_some();
                let reason = if exists { CouponRejection::Exhausted } else { CouponRejection::Unknown };
                return Err(StoreError::CouponRejected(reason));
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, email, status, lines, currency, subtotal, discount, \
             shipping, total, coupon_code, shipping_address, payment, tracking, history, note, idempotency_key, \
             fingerprint, reserved_until, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23) \
             ON CONFLICT (customer_id, idempotency_key) DO NOTHING",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(&order.email)
        .bind(order.status.to_string())
        .bind(Json(&order.lines))
        .bind(order.total.currency())
        .bind(order.subtotal.amount())
        .bind(order.discount.amount())
        .bind(order.shipping.amount())
        .bind(order.total.amount())
        .bind(&order.coupon_code)
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.payment))
        .bind(order.tracking.as_ref().map(Json))
        .bind(Json(&order.history))
        .bind(&order.note)
        .bind(&order.idempotency_key)
        .bind(&order.fingerprint)
        .bind(order.reserved_until)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Order number collision, please retry"))?;

        if inserted.rows_affected() == 0 {
            // A concurrent request with the same key committed first.
            tx.rollback().await?;
            let key = order.idempotency_key.as_deref().unwrap_or_default();
            return match self.order_by_idempotency_key(order.customer_id, key).await? {
                Some(existing) => Ok(PlaceOutcome::Replayed(existing)),
                None => Err(StoreError::Conflict("Order could not be placed, please retry".into())),
            };
        }

        let state = if placement.hold_until.is_some() { ReservationState::Held } else { ReservationState::Committed };
        for line in &placement.lines {
            sqlx::query("INSERT INTO stock_reservations (order_id, product_id, size, quantity, state) VALUES ($1, $2, $3, $4, $5)")
                .bind(order.id)
                .bind(line.product_id)
                .bind(&line.size)
                .bind(line.quantity as i32)
                .bind(state.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(PlaceOutcome::Created(order))
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn order_by_idempotency_key(&self, customer_id: Uuid, key: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE customer_id = $1 AND idempotency_key = $2")
            .bind(customer_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn update_order(&self, order: &mut Order) -> Result<()> {
        let done = sqlx::query(
            "UPDATE orders SET status = $3, payment = $4, tracking = $5, history = $6, reserved_until = $7, \
             updated_at = $8, version = version + 1 WHERE id = $1 AND version = $2",
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.status.to_string())
        .bind(Json(&order.payment))
        .bind(order.tracking.as_ref().map(Json))
        .bind(Json(&order.history))
        .bind(order.reserved_until)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return match self.order(order.id).await? {
                Some(_) => Err(StoreError::Conflict("Order was modified concurrently, reload and retry".into())),
                None => Err(StoreError::not_found("Order")),
            };
        }
        order.version += 1;
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>> {
        let status = filter.status.map(|s| s.to_string());
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::UUID IS NULL OR customer_id = $1) AND ($2::TEXT IS NULL OR status = $2)",
        )
        .bind(filter.customer_id)
        .bind(&status)
        .fetch_one(&self.pool)
        .await?;
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE ($1::UUID IS NULL OR customer_id = $1) AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(filter.customer_id)
        .bind(&status)
        .bind(filter.page.limit() as i64)
        .bind(filter.page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page {
            data: rows.into_iter().map(Order::try_from).collect::<Result<_>>()?,
            total: total as u64,
            page: filter.page.page,
            per_page: filter.page.per_page,
        })
    }

    async fn commit_reservations(&self, order_id: Uuid) -> Result<u32> {
        self.move_reservations(order_id, &[ReservationState::Held], ReservationState::Committed).await
    }

    async fn release_held(&self, order_id: Uuid) -> Result<u32> {
        self.move_reservations(order_id, &[ReservationState::Held], ReservationState::Released).await
    }

    async fn restock(&self, order_id: Uuid) -> Result<u32> {
        self.move_reservations(order_id, &[ReservationState::Held, ReservationState::Committed], ReservationState::Released)
            .await
    }

    async fn expired_pending(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Order>> {
        sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE status = 'pending_payment' AND reserved_until <= $1 ORDER BY reserved_until LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }

    async fn has_delivered_purchase(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE customer_id = $1 AND status = 'delivered' AND lines @> $2)",
        )
        .bind(customer_id)
        .bind(Json(serde_json::json!([{ "product_id": product_id }])))
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn order_summary(&self, customer_id: Uuid) -> Result<CustomerOrderSummary> {
        let (order_count, total_spent): (i64, Decimal) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total) FILTER (WHERE payment->>'status' = 'paid'), 0) \
             FROM orders WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(CustomerOrderSummary { order_count: order_count as u64, total_spent })
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            "INSERT INTO reviews (id, product_id, customer_id, author, rating, title, body, verified_purchase, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(review.id)
        .bind(review.product_id)
        .bind(review.customer_id)
        .bind(&review.author)
        .bind(review.rating as i16)
        .bind(&review.title)
        .bind(&review.body)
        .bind(review.verified_purchase)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, "You have already reviewed this product"))?;
        Ok(())
    }

    async fn review(&self, id: Uuid) -> Result<Option<Review>> {
        Ok(sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Review::from))
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn reviews_for(&self, product_id: Uuid, page: PageRequest) -> Result<Page<Review>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(product_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page {
            data: rows.into_iter().map(Review::from).collect(),
            total: total as u64,
            page: page.page,
            per_page: page.per_page,
        })
    }
}

#[async_trait]
impl WishlistStore for PgStore {
    async fn wishlist(&self, customer_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar("SELECT product_id FROM wishlists WHERE customer_id = $1 ORDER BY created_at")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_to_wishlist(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool> {
        let done = sqlx::query("INSERT INTO wishlists (customer_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(customer_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn remove_from_wishlist(&self, customer_id: Uuid, product_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM wishlists WHERE customer_id = $1 AND product_id = $2")
            .bind(customer_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        sqlx::query(
            "INSERT INTO collections (id, name, slug, description, banner_image, product_ids, position, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(collection.id)
        .bind(&collection.name)
        .bind(&collection.slug)
        .bind(&collection.description)
        .bind(&collection.banner_image)
        .bind(&collection.product_ids)
        .bind(collection.position)
        .bind(collection.active)
        .bind(collection.created_at)
        .bind(collection.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, format!("Collection '{}' already exists", collection.slug)))?;
        Ok(())
    }

    async fn update_collection(&self, collection: &Collection) -> Result<()> {
        let done = sqlx::query(
            "UPDATE collections SET name = $2, slug = $3, description = $4, banner_image = $5, product_ids = $6, \
             position = $7, active = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(collection.id)
        .bind(&collection.name)
        .bind(&collection.slug)
        .bind(&collection.description)
        .bind(&collection.banner_image)
        .bind(&collection.product_ids)
        .bind(collection.position)
        .bind(collection.active)
        .bind(collection.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, format!("Collection '{}' already exists", collection.slug)))?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("Collection")); }
        Ok(())
    }

    async fn delete_collection(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM collections WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn collection(&self, id: Uuid) -> Result<Option<Collection>> {
        Ok(sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Collection::from))
    }

    async fn collection_by_slug(&self, slug: &str) -> Result<Option<Collection>> {
        Ok(sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(Collection::from))
    }

    async fn list_collections(&self, active_only: bool) -> Result<Vec<Collection>> {
        Ok(sqlx::query_as::<_, CollectionRow>(
            "SELECT * FROM collections WHERE active OR NOT $1 ORDER BY position, name",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Collection::from)
        .collect())
    }

    async fn best_sellers(&self) -> Result<Vec<BestSeller>> {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as("SELECT product_id, rank FROM best_sellers ORDER BY rank")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(product_id, rank)| BestSeller { product_id, rank: rank as u32 }).collect())
    }

    async fn replace_best_sellers(&self, ranking: &[BestSeller]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM best_sellers").execute(&mut *tx).await?;
        for entry in ranking {
            sqlx::query("INSERT INTO best_sellers (product_id, rank) VALUES ($1, $2)")
                .bind(entry.product_id)
                .bind(entry.rank as i32)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
