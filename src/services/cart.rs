//! Shopping cart with live pricing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::config::StoreSettings;
use crate::domain::aggregates::{Cart, CartError, CartItem, Coupon, CouponRejection, Product};
use crate::domain::media;
use crate::domain::pricing::{self, CouponInput, Quote, QuoteLine};
use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};
use crate::store::Storage;

const CART_IMAGE_WIDTH: u32 = 240;

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 16))]
    pub size: String,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest { pub quantity: u32 }

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub customer_id: Uuid,
    pub coupon_code: Option<String>,
    #[serde(flatten)]
    pub quote: Quote,
}

/// A cart priced against the current catalog.
pub struct PricedCart {
    pub cart: Cart,
    pub quote: Quote,
    pub coupon: Option<Coupon>,
    pub products: HashMap<Uuid, Product>,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Storage>,
    settings: StoreSettings,
}

impl CartService {
    pub fn new(store: Arc<dyn Storage>, settings: StoreSettings) -> Self { Self { store, settings } }

    pub async fn view(&self, customer_id: Uuid) -> Result<CartView> {
        let cart = self.store.cart(customer_id).await?;
        Ok(self.price(cart).await?.into_view())
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id, size = %input.size))]
    pub async fn add_item(&self, customer_id: Uuid, input: AddItemRequest) -> Result<CartView> {
        input.validate()?;
        let mut cart = self.store.cart(customer_id).await?;
        let size = input.size.trim().to_string();
        let wanted = cart.quantity_of(input.product_id, &size)
            .checked_add(input.quantity)
            .ok_or(CartError::LineLimit(self.settings.max_line_quantity))?;
        self.ensure_purchasable(input.product_id, &size, wanted).await?;
        cart.add_item(CartItem { product_id: input.product_id, size, quantity: input.quantity }, self.settings.max_line_quantity)?;
        self.save_and_view(cart).await
    }

    /// Quantity 0 removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(&self, customer_id: Uuid, product_id: Uuid, size: &str, quantity: u32) -> Result<CartView> {
        let mut cart = self.store.cart(customer_id).await?;
        if quantity > 0 {
            if cart.quantity_of(product_id, size) == 0 { return Err(StoreError::not_found("Cart item")); }
            self.ensure_purchasable(product_id, size, quantity).await?;
        }
        cart.update_quantity(product_id, size, quantity, self.settings.max_line_quantity)?;
        self.save_and_view(cart).await
    }

    pub async fn remove_item(&self, customer_id: Uuid, product_id: Uuid, size: &str) -> Result<CartView> {
        let mut cart = self.store.cart(customer_id).await?;
        cart.remove_item(product_id, size)?;
        self.save_and_view(cart).await
    }

    pub async fn clear(&self, customer_id: Uuid) -> Result<()> {
        let mut cart = self.store.cart(customer_id).await?;
        cart.clear();
        self.store.save_cart(&cart).await
    }

    /// Only coupons that apply to the cart as it stands are stored.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn apply_coupon(&self, customer_id: Uuid, input: ApplyCouponRequest) -> Result<CartView> {
        input.validate()?;
        let coupon = self.store.coupon_by_code(&input.code).await?.ok_or(CouponRejection::Unknown)?;
        let mut cart = self.store.cart(customer_id).await?;
        cart.remove_coupon();
        let priced = self.price(cart.clone()).await?;
        coupon.check(&priced.quote.subtotal, Utc::now())?;
        cart.apply_coupon(&coupon.code);
        self.save_and_view(cart).await
    }

    pub async fn remove_coupon(&self, customer_id: Uuid) -> Result<CartView> {
        let mut cart = self.store.cart(customer_id).await?;
        cart.remove_coupon();
        self.save_and_view(cart).await
    }

    /// Prices every line from the catalog; lines that can no longer be bought are
    /// kept but flagged unavailable and excluded from the totals.
    pub async fn price(&self, cart: Cart) -> Result<PricedCart> {
        let ids: Vec<Uuid> = cart.items().iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, Product> =
            self.store.products_by_ids(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
        let currency = &self.settings.currency;

        let lines = cart.items().iter().map(|item| quote_line(item, products.get(&item.product_id), currency)).collect();

        let coupon = match cart.coupon_code() {
            Some(code) => self.store.coupon_by_code(code).await?,
            None => None,
        };
        let input = match (cart.coupon_code(), &coupon) {
            (None, _) => CouponInput::None,
            (Some(_), None) => CouponInput::Unknown,
            (Some(_), Some(c)) => CouponInput::Found(c),
        };
        let quote = pricing::quote(lines, input, &self.settings.shipping, currency, Utc::now())?;
        Ok(PricedCart { cart, quote, coupon, products })
    }

    async fn ensure_purchasable(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<()> {
        let product = self.store.product(product_id).await?
            .filter(Product::is_visible)
            .ok_or_else(|| StoreError::not_found("Product"))?;
        let stock = product.size(size)
            .ok_or_else(|| StoreError::Validation(format!("Size '{}' is not offered for this product", size)))?
            .stock;
        if quantity > stock {
            return Err(StoreError::InsufficientStock { product_id, size: size.to_string(), available: stock, requested: quantity });
        }
        Ok(())
    }

    async fn save_and_view(&self, cart: Cart) -> Result<CartView> {
        self.store.save_cart(&cart).await?;
        Ok(self.price(cart).await?.into_view())
    }
}

impl PricedCart {
    pub fn into_view(self) -> CartView {
        CartView { customer_id: self.cart.customer_id, coupon_code: self.cart.coupon_code().map(str::to_string), quote: self.quote }
    }
}

fn quote_line(item: &CartItem, product: Option<&Product>, currency: &str) -> QuoteLine {
    let Some(product) = product else {
        return QuoteLine {
            product_id: item.product_id, sku: String::new(), name: "Unavailable product".into(), size: item.size.clone(),
            image: None, quantity: item.quantity, unit_price: Money::zero(currency), line_total: Money::zero(currency),
            available: false,
        };
    };
    let in_stock = product.size(&item.size).is_some_and(|s| s.stock >= item.quantity);
    QuoteLine {
        product_id: product.id,
        sku: product.sku.to_string(),
        name: product.name.clone(),
        size: item.size.clone(),
        image: product.images.first().map(|url| media::optimized(url, CART_IMAGE_WIDTH)),
        quantity: item.quantity,
        unit_price: product.price.clone(),
        line_total: product.price.multiply(item.quantity),
        available: product.is_visible() && in_stock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{coupon, product, CouponKind};
    use crate::store::{CartStore, CouponStore, MemoryStore, ProductStore};
    use rust_decimal_macros::dec;

    async fn setup() -> (CartService, Arc<MemoryStore>, Product) {
        let store = Arc::new(MemoryStore::new());
        let p = product::sample("Canvas Low", dec!(600), &[("UK 7", 3)]);
        store.insert_product(&p).await.unwrap();
        (CartService::new(store.clone(), StoreSettings::default()), store, p)
    }

    fn add(p: &Product, quantity: u32) -> AddItemRequest {
        AddItemRequest { product_id: p.id, size: "UK 7".into(), quantity }
    }

    #[tokio::test]
    async fn test_add_merges_and_prices() {
        let (carts, _, p) = setup().await;
        let customer = Uuid::new_v4();
        carts.add_item(customer, add(&p, 1)).await.unwrap();
        let view = carts.add_item(customer, add(&p, 1)).await.unwrap();
        assert_eq!(view.quote.lines.len(), 1);
        assert_eq!(view.quote.item_count, 2);
        assert_eq!(view.quote.subtotal.amount(), dec!(1200));
        assert!(view.quote.shipping.is_zero());
    }

    #[tokio::test]
    async fn test_cannot_exceed_stock_or_unknown_size() {
        let (carts, _, p) = setup().await;
        let customer = Uuid::new_v4();
        carts.add_item(customer, add(&p, 2)).await.unwrap();
        let err = carts.add_item(customer, add(&p, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 3, requested: 4, .. }));
        let mut other = add(&p, 1);
        other.size = "UK 12".into();
        assert!(matches!(carts.add_item(customer, other).await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_oversized_quantity_is_rejected() {
        let (carts, store, p) = setup().await;
        let customer = Uuid::new_v4();
        carts.add_item(customer, add(&p, 1)).await.unwrap();
        let err = carts.add_item(customer, add(&p, u32::MAX)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.cart(customer).await.unwrap().quantity_of(p.id, "UK 7"), 1);
    }

    #[tokio::test]
    async fn test_coupon_must_apply_to_be_stored() {
        let (carts, store, p) = setup().await;
        let mut c = coupon::sample("BIGSPEND", CouponKind::Fixed, dec!(100));
        c.min_order = dec!(1000);
        store.insert_coupon(&c).await.unwrap();
        let customer = Uuid::new_v4();
        carts.add_item(customer, add(&p, 1)).await.unwrap();

        let err = carts.apply_coupon(customer, ApplyCouponRequest { code: "bigspend".into() }).await.unwrap_err();
        assert!(matches!(err, StoreError::CouponRejected(CouponRejection::BelowMinimum { .. })));
        let unknown = carts.apply_coupon(customer, ApplyCouponRequest { code: "NOPE".into() }).await.unwrap_err();
        assert!(matches!(unknown, StoreError::CouponRejected(CouponRejection::Unknown)));

        carts.add_item(customer, add(&p, 1)).await.unwrap();
        let view = carts.apply_coupon(customer, ApplyCouponRequest { code: "bigspend".into() }).await.unwrap();
        assert_eq!(view.coupon_code.as_deref(), Some("BIGSPEND"));
        assert_eq!(view.quote.discount.amount(), dec!(100));
        // 1200 - 100 = 1100, still above the free shipping threshold
        assert_eq!(view.quote.total.amount(), dec!(1100));
    }

    #[tokio::test]
    async fn test_unpublished_product_is_flagged() {
        let (carts, store, mut p) = setup().await;
        let customer = Uuid::new_v4();
        carts.add_item(customer, add(&p, 1)).await.unwrap();
        p.archive();
        store.update_product(&p).await.unwrap();
        let view = carts.view(customer).await.unwrap();
        assert!(view.quote.has_unavailable_lines());
        assert!(view.quote.subtotal.is_zero());
    }
}
