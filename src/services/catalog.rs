//! Product catalog: storefront browsing and back-office maintenance.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::config::StoreSettings;
use crate::domain::aggregates::{Category, Gender, Product, ProductDraft, ProductError, ProductStatus, SizeStock, MAX_STOCK};
use crate::domain::events::InventoryEvent;
use crate::domain::media;
use crate::domain::value_objects::{Money, Sku};
use crate::error::{Result, StoreError};
use crate::services::events::EventPublisher;
use crate::store::{LowStock, Page, PageRequest, ProductFilter, ProductSort, Storage};

const LIST_IMAGE_WIDTH: u32 = 480;
const DETAIL_IMAGE_WIDTH: u32 = 1200;

/// Query string of the product listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub q: Option<String>,
    pub category: Option<Category>,
    pub gender: Option<Gender>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort: ProductSort,
    pub status: Option<ProductStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductQuery {
    fn into_filter(self, status: Option<ProductStatus>) -> ProductFilter {
        ProductFilter {
            search: self.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            category: self.category,
            gender: self.gender,
            brand: self.brand,
            size: self.size,
            min_price: self.min_price,
            max_price: self.max_price,
            status,
            sort: self.sort,
            page: PageRequest::new(self.page, self.per_page),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub brand: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub category: Category,
    pub gender: Gender,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<SizeStock>,
    #[serde(default)]
    pub status: ProductStatus,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub brand: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub category: Option<Category>,
    pub gender: Option<Gender>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub clear_compare_at_price: bool,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest { pub stock: u32 }

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest { pub delta: i32 }

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Storage>,
    events: Arc<dyn EventPublisher>,
    settings: StoreSettings,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Storage>, events: Arc<dyn EventPublisher>, settings: StoreSettings) -> Self {
        Self { store, events, settings }
    }

    /// Active products only, with CDN-sized images.
    #[instrument(skip(self))]
    pub async fn list(&self, query: ProductQuery) -> Result<Page<Product>> {
        let page = self.store.list_products(&query.into_filter(Some(ProductStatus::Active))).await?;
        Ok(page.map(|p| storefront_view(p, LIST_IMAGE_WIDTH)))
    }

    pub async fn get(&self, id: Uuid) -> Result<Product> {
        let product = self.store.product(id).await?.filter(Product::is_visible);
        product.map(|p| storefront_view(p, DETAIL_IMAGE_WIDTH)).ok_or_else(|| StoreError::not_found("Product"))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Product> {
        let product = self.store.product_by_slug(slug).await?.filter(Product::is_visible);
        product.map(|p| storefront_view(p, DETAIL_IMAGE_WIDTH)).ok_or_else(|| StoreError::not_found("Product"))
    }

    /// Visible products in the order of `ids`, skipping anything unpublished.
    pub async fn visible_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let products = self.store.products_by_ids(ids).await?;
        Ok(products.into_iter().filter(Product::is_visible).map(|p| storefront_view(p, LIST_IMAGE_WIDTH)).collect())
    }

    /// Every status unless the query narrows it.
    pub async fn admin_list(&self, query: ProductQuery) -> Result<Page<Product>> {
        let status = query.status;
        self.store.list_products(&query.into_filter(status)).await
    }

    pub async fn admin_get(&self, id: Uuid) -> Result<Product> {
        self.store.product(id).await?.ok_or_else(|| StoreError::not_found("Product"))
    }

    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create(&self, input: CreateProductRequest) -> Result<Product> {
        input.validate()?;
        check_images(&input.images)?;
        let currency = &self.settings.currency;
        let product = Product::create(ProductDraft {
            sku: Sku::new(input.sku)?,
            name: input.name,
            brand: input.brand,
            description: input.description,
            category: input.category,
            gender: input.gender,
            price: Money::new(input.price, currency),
            compare_at_price: input.compare_at_price.map(|p| Money::new(p, currency)),
            images: input.images,
            tags: input.tags,
            sizes: input.sizes,
            status: input.status,
        })?;
        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, input: UpdateProductRequest) -> Result<Product> {
        input.validate()?;
        let mut product = self.admin_get(id).await?;
        let currency = self.settings.currency.clone();

        if let Some(sku) = input.sku { product.sku = Sku::new(sku)?; }
        if let Some(name) = input.name { product.rename(&name)?; }
        if let Some(brand) = input.brand { product.brand = brand.trim().to_string(); }
        if let Some(description) = input.description { product.description = description; }
        if let Some(category) = input.category { product.category = category; }
        if let Some(gender) = input.gender { product.gender = gender; }
        if input.price.is_some() || input.compare_at_price.is_some() || input.clear_compare_at_price {
            let price = input.price.map_or_else(|| product.price.clone(), |p| Money::new(p, &currency));
            let compare_at = match (input.clear_compare_at_price, input.compare_at_price) {
                (true, _) => None,
                (false, Some(mrp)) => Some(Money::new(mrp, &currency)),
                (false, None) => product.compare_at_price.clone(),
            };
            product.update_price(price, compare_at)?;
        }
        if let Some(images) = input.images {
            check_images(&images)?;
            product.images = images;
        }
        if let Some(tags) = input.tags { product.set_tags(tags); }
        match input.status {
            Some(ProductStatus::Active) => product.publish()?,
            Some(ProductStatus::Archived) => product.archive(),
            Some(ProductStatus::Draft) => product.status = ProductStatus::Draft,
            None if product.is_visible() && product.images.is_empty() => {
                return Err(crate::domain::aggregates::ProductError::MissingImage.into());
            }
            None => {}
        }
        product.updated_at = chrono::Utc::now();
        self.store.update_product(&product).await?;
        Ok(product)
    }

    /// Archiving keeps the product for order history but hides it from the storefront.
    #[instrument(skip(self))]
    pub async fn archive(&self, id: Uuid) -> Result<Product> {
        let mut product = self.admin_get(id).await?;
        product.archive();
        self.store.update_product(&product).await?;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn set_stock(&self, id: Uuid, size: &str, stock: u32) -> Result<Product> {
        if stock > MAX_STOCK { return Err(ProductError::StockLimit.into()); }
        let stock = self.store.set_stock(id, size, stock).await?;
        self.warn_if_low(id, size, stock).await;
        self.admin_get(id).await
    }

    /// Relative change, e.g. a goods receipt (+) or a write-off (-).
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, id: Uuid, size: &str, delta: i32) -> Result<Product> {
        if delta.unsigned_abs() > MAX_STOCK { return Err(ProductError::StockLimit.into()); }
        let stock = self.store.adjust_stock(id, size, delta).await?;
        tracing::info!(product_id = %id, size, delta, stock, "stock adjusted");
        if delta < 0 { self.warn_if_low(id, size, stock).await; }
        self.admin_get(id).await
    }

    pub async fn low_stock(&self) -> Result<Vec<LowStock>> {
        self.store.low_stock(self.settings.low_stock_threshold).await
    }

    pub(crate) async fn warn_if_low(&self, product_id: Uuid, size: &str, stock: u32) {
        if stock < self.settings.low_stock_threshold {
            self.events.publish(InventoryEvent::StockLow { product_id, size: size.trim().to_string(), stock }.into()).await;
        }
    }
}

fn storefront_view(mut product: Product, width: u32) -> Product {
    product.images = product.images.iter().map(|url| media::optimized(url, width)).collect();
    product
}

fn check_images(images: &[String]) -> Result<()> {
    match images.iter().find(|url| !(url.starts_with("https://") || url.starts_with("http://"))) {
        Some(bad) => Err(StoreError::Validation(format!("Image '{}' is not an http(s) URL", bad))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEvent;
    use crate::services::events::RecordingPublisher;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn service() -> (CatalogService, Arc<RecordingPublisher>) {
        let events = Arc::new(RecordingPublisher::default());
        (CatalogService::new(Arc::new(MemoryStore::new()), events.clone(), StoreSettings::default()), events)
    }

    fn request(name: &str, status: ProductStatus) -> CreateProductRequest {
        CreateProductRequest {
            sku: format!("sku-{}", name.len()), name: name.into(), brand: "Stride".into(), description: String::new(),
            category: Category::Sneakers, gender: Gender::Men, price: dec!(2999), compare_at_price: Some(dec!(3499)),
            images: vec!["https://cdn.example.com/image/upload/v1/a.jpg".into()], tags: vec!["Street".into()],
            sizes: vec![SizeStock { size: "UK 9".into(), stock: 8 }], status,
        }
    }

    #[tokio::test]
    async fn test_drafts_are_hidden_from_storefront() {
        let (catalog, _) = service();
        let draft = catalog.create(request("Draft Shoe", ProductStatus::Draft)).await.unwrap();
        let live = catalog.create(request("Live Runner", ProductStatus::Active)).await.unwrap();

        assert!(matches!(catalog.get(draft.id).await, Err(StoreError::NotFound(_))));
        let shown = catalog.get(live.id).await.unwrap();
        assert!(shown.images[0].contains("/upload/w_1200,q_auto,f_auto/"));

        let page = catalog.list(ProductQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(catalog.admin_list(ProductQuery::default()).await.unwrap().total, 2);
        assert_eq!(catalog.get_by_slug("live-runner").await.unwrap().id, live.id);
    }

    #[tokio::test]
    async fn test_adjust_below_threshold_publishes_stock_low() {
        let (catalog, events) = service();
        let p = catalog.create(request("Court Classic", ProductStatus::Active)).await.unwrap();
        catalog.adjust_stock(p.id, "UK 9", -2).await.unwrap();
        assert!(events.events().is_empty());
        let updated = catalog.adjust_stock(p.id, "UK 9", -3).await.unwrap();
        assert_eq!(updated.size("UK 9").unwrap().stock, 3);
        assert!(matches!(
            events.events().as_slice(),
            [DomainEvent::Inventory(InventoryEvent::StockLow { stock: 3, .. })]
        ));
        assert_eq!(catalog.low_stock().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stock_outside_range_is_rejected() {
        let (catalog, _) = service();
        let p = catalog.create(request("Canvas High", ProductStatus::Active)).await.unwrap();
        let too_many = catalog.set_stock(p.id, "UK 9", u32::MAX).await.unwrap_err();
        assert!(matches!(too_many, StoreError::Validation(_)));
        assert!(matches!(catalog.adjust_stock(p.id, "UK 9", i32::MAX).await, Err(StoreError::Validation(_))));
        assert!(matches!(catalog.adjust_stock(p.id, "UK 9", MAX_STOCK as i32).await, Err(StoreError::Validation(_))));
        assert_eq!(catalog.admin_get(p.id).await.unwrap().size("UK 9").unwrap().stock, 8);
        let full = catalog.set_stock(p.id, "UK 9", MAX_STOCK).await.unwrap();
        assert_eq!(full.size("UK 9").unwrap().stock, MAX_STOCK);
    }

    #[tokio::test]
    async fn test_update_rejects_bad_compare_at_and_archive_hides() {
        let (catalog, _) = service();
        let p = catalog.create(request("Oxford", ProductStatus::Active)).await.unwrap();
        let bad = UpdateProductRequest { compare_at_price: Some(dec!(10)), ..Default::default() };
        assert!(matches!(catalog.update(p.id, bad).await, Err(StoreError::Validation(_))));

        let renamed = UpdateProductRequest { name: Some("Oxford Brogue".into()), ..Default::default() };
        assert_eq!(catalog.update(p.id, renamed).await.unwrap().slug, "oxford-brogue");

        catalog.archive(p.id).await.unwrap();
        assert!(catalog.get(p.id).await.is_err());
    }

    #[tokio::test]
    async fn test_non_http_images_rejected() {
        let (catalog, _) = service();
        let mut req = request("Mule", ProductStatus::Draft);
        req.images = vec!["ftp://x/a.jpg".into()];
        assert!(matches!(catalog.create(req).await, Err(StoreError::Validation(_))));
    }
}
