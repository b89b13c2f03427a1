use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::Product;
use crate::error::{Result, StoreError};
use crate::services::catalog::CatalogService;
use crate::store::Storage;

#[derive(Debug, Deserialize)]
pub struct WishlistRequest { pub product_id: Uuid }

#[derive(Clone)]
pub struct WishlistService {
    store: Arc<dyn Storage>,
    catalog: CatalogService,
}

impl WishlistService {
    pub fn new(store: Arc<dyn Storage>, catalog: CatalogService) -> Self { Self { store, catalog } }

    /// Saved products that are still on sale, most recently added last.
    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<Product>> {
        let ids = self.store.wishlist(customer_id).await?;
        self.catalog.visible_by_ids(&ids).await
    }

    /// Adding a product twice is a no-op.
    pub async fn add(&self, customer_id: Uuid, product_id: Uuid) -> Result<Vec<Product>> {
        self.catalog.get(product_id).await?;
        if self.store.add_to_wishlist(customer_id, product_id).await? {
            tracing::debug!(%customer_id, %product_id, "added to wishlist");
        }
        self.list(customer_id).await
    }

    pub async fn remove(&self, customer_id: Uuid, product_id: Uuid) -> Result<()> {
        if !self.store.remove_from_wishlist(customer_id, product_id).await? {
            return Err(StoreError::not_found("Wishlist item"));
        }
        Ok(())
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

    #[tokio::test]
    async fn test_add_is_idempotent_and_hides_archived() {
        let store = Arc::new(MemoryStore::new());
        let catalog = CatalogService::new(store.clone(), Arc::new(NoopPublisher), StoreSettings::default());
        let wishlist = WishlistService::new(store.clone(), catalog);
        let mut p = product::sample("Slip On", dec!(999), &[("UK 8", 2)]);
        store.insert_product(&p).await.unwrap();
        let customer = Uuid::new_v4();

        wishlist.add(customer, p.id).await.unwrap();
        assert_eq!(wishlist.add(customer, p.id).await.unwrap().len(), 1);

        p.archive();
        store.update_product(&p).await.unwrap();
        assert!(wishlist.list(customer).await.unwrap().is_empty());

        wishlist.remove(customer, p.id).await.unwrap();
        assert!(matches!(wishlist.remove(customer, p.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_product_rejected() {
        let store = Arc::new(MemoryStore::new());
        let catalog = CatalogService::new(store.clone(), Arc::new(NoopPublisher), StoreSettings::default());
        let wishlist = WishlistService::new(store, catalog);
        assert!(matches!(wishlist.add(Uuid::new_v4(), Uuid::new_v4()).await, Err(StoreError::NotFound(_))));
    }
}
