//! Storefront content managed from the back office: curated collections
//! and the best-seller shelf.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{content, BestSeller, Collection, Product};
use crate::error::{Result, StoreError};
use crate::services::catalog::CatalogService;
use crate::store::Storage;

#[derive(Debug, Deserialize, Validate)]
pub struct CollectionRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: String,
    #[validate(url)]
    pub banner_image: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub product_ids: Vec<Uuid>,
    #[serde(default)]
    pub position: i32,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool { true }

#[derive(Debug, Deserialize, Validate)]
pub struct BestSellersRequest {
    #[validate(length(max = 50))]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CollectionView {
    #[serde(flatten)]
    pub collection: Collection,
    pub products: Vec<Product>,
}

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn Storage>,
    catalog: CatalogService,
}

impl ContentService {
    pub fn new(store: Arc<dyn Storage>, catalog: CatalogService) -> Self { Self { store, catalog } }

    pub async fn active_collections(&self) -> Result<Vec<Collection>> {
        self.store.list_collections(true).await
    }

    /// Inactive collections are hidden; unpublished products are skipped.
    pub async fn collection_by_slug(&self, slug: &str) -> Result<CollectionView> {
        let collection = self.store.collection_by_slug(slug).await?
            .filter(|c| c.active)
            .ok_or_else(|| StoreError::not_found("Collection"))?;
        let products = self.catalog.visible_by_ids(&collection.product_ids).await?;
        Ok(CollectionView { collection, products })
    }

    pub async fn all_collections(&self) -> Result<Vec<Collection>> {
        self.store.list_collections(false).await
    }

    pub async fn collection(&self, id: Uuid) -> Result<Collection> {
        self.store.collection(id).await?.ok_or_else(|| StoreError::not_found("Collection"))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_collection(&self, input: CollectionRequest) -> Result<Collection> {
        input.validate()?;
        self.ensure_products_exist(&input.product_ids).await?;
        let collection = Collection::create(
            &input.name, &input.description, input.banner_image, input.product_ids, input.position, input.active,
        );
        if collection.slug.is_empty() {
            return Err(StoreError::Validation("Collection name must contain letters or digits".into()));
        }
        self.store.insert_collection(&collection).await?;
        Ok(collection)
    }

    #[instrument(skip(self, input))]
    pub async fn update_collection(&self, id: Uuid, input: CollectionRequest) -> Result<Collection> {
        input.validate()?;
        self.ensure_products_exist(&input.product_ids).await?;
        let mut collection = self.collection(id).await?;
        if collection.name != input.name.trim() {
            collection.rename(&input.name);
        }
        collection.description = input.description;
        collection.banner_image = input.banner_image;
        collection.set_products(input.product_ids);
        collection.position = input.position;
        collection.active = input.active;
        collection.updated_at = Utc::now();
        self.store.update_collection(&collection).await?;
        Ok(collection)
    }

    pub async fn delete_collection(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_collection(id).await? {
            return Err(StoreError::not_found("Collection"));
        }
        Ok(())
    }

    /// Ranked best sellers that are still on sale.
    pub async fn best_sellers(&self) -> Result<Vec<Product>> {
        let ranking = self.store.best_sellers().await?;
        let ids: Vec<Uuid> = ranking.iter().map(|b| b.product_id).collect();
        self.catalog.visible_by_ids(&ids).await
    }

    #[instrument(skip(self, input), fields(count = input.product_ids.len()))]
    pub async fn replace_best_sellers(&self, input: BestSellersRequest) -> Result<Vec<BestSeller>> {
        input.validate()?;
        self.ensure_products_exist(&input.product_ids).await?;
        let ranking = content::rank(input.product_ids);
        self.store.replace_best_sellers(&ranking).await?;
        Ok(ranking)
    }

    async fn ensure_products_exist(&self, ids: &[Uuid]) -> Result<()> {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        let found: HashSet<Uuid> = self.store.products_by_ids(ids).await?.into_iter().map(|p| p.id).collect();
        match wanted.difference(&found).next() {
            Some(missing) => Err(StoreError::Validation(format!("Unknown product {}", missing))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::domain::aggregates::product;
    use crate::services::events::NoopPublisher;
    use crate::store::{MemoryStore, ProductStore};
    use rust_decimal_macros::dec;

    async fn setup() -> (ContentService, Arc<MemoryStore>, Vec<Product>) {
        let store = Arc::new(MemoryStore::new());
        let mut products = Vec::new();
        for name in ["Runner One", "Runner Two", "Runner Three"] {
            let p = product::sample(name, dec!(1500), &[("UK 8", 3)]);
            store.insert_product(&p).await.unwrap();
            products.push(p);
        }
        let catalog = CatalogService::new(store.clone(), Arc::new(NoopPublisher), StoreSettings::default());
        (ContentService::new(store.clone(), catalog), store, products)
    }

    fn request(name: &str, ids: Vec<Uuid>) -> CollectionRequest {
        CollectionRequest {
            name: name.into(), description: String::new(), banner_image: None, product_ids: ids, position: 0, active: true,
        }
    }

    #[tokio::test]
    async fn test_collection_by_slug_keeps_order_and_hides_inactive() {
        let (content, _, products) = setup().await;
        let ids = vec![products[2].id, products[0].id];
        let created = content.create_collection(request("Monsoon Picks", ids.clone())).await.unwrap();
        assert_eq!(created.slug, "monsoon-picks");

        let view = content.collection_by_slug("monsoon-picks").await.unwrap();
        let shown: Vec<Uuid> = view.products.iter().map(|p| p.id).collect();
        assert_eq!(shown, ids);

        let mut hidden = request("Monsoon Picks", ids);
        hidden.active = false;
        content.update_collection(created.id, hidden).await.unwrap();
        assert!(matches!(content.collection_by_slug("monsoon-picks").await, Err(StoreError::NotFound(_))));
        assert!(content.active_collections().await.unwrap().is_empty());
        assert_eq!(content.all_collections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_products_rejected() {
        let (content, _, _) = setup().await;
        let res = content.create_collection(request("Ghosts", vec![Uuid::new_v4()])).await;
        assert!(matches!(res, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_best_sellers_skip_archived() {
        let (content, store, mut products) = setup().await;
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let ranking = content.replace_best_sellers(BestSellersRequest { product_ids: ids }).await.unwrap();
        assert_eq!(ranking[0].rank, 1);

        products[1].archive();
        store.update_product(&products[1]).await.unwrap();
        let shelf: Vec<Uuid> = content.best_sellers().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(shelf, vec![products[0].id, products[2].id]);
    }
}
