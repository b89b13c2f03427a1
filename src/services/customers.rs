//! Back-office customer management.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::Customer;
use crate::error::{Result, StoreError};
use crate::store::{CustomerOrderSummary, Page, PageRequest, Storage};

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    #[serde(flatten)]
    pub orders: CustomerOrderSummary,
}

#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn Storage>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn Storage>) -> Self { Self { store } }

    pub async fn list(&self, query: CustomerQuery) -> Result<Page<Customer>> {
        let search = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        self.store.list_customers(search, PageRequest::new(query.page, query.per_page)).await
    }

    pub async fn detail(&self, id: Uuid) -> Result<CustomerDetail> {
        let customer = self.get(id).await?;
        let orders = self.store.order_summary(id).await?;
        Ok(CustomerDetail { customer, orders })
    }

    /// Blocked customers keep their tokens but cannot log in or check out.
    #[instrument(skip(self))]
    pub async fn set_blocked(&self, id: Uuid, blocked: bool) -> Result<Customer> {
        let mut customer = self.get(id).await?;
        if blocked && customer.is_admin() {
            return Err(StoreError::Forbidden("Admin accounts cannot be blocked".into()));
        }
        if blocked { customer.block() } else { customer.unblock() }
        self.store.update_customer(&customer).await?;
        tracing::info!(customer_id = %id, blocked, "customer access changed");
        Ok(customer)
    }

    async fn get(&self, id: Uuid) -> Result<Customer> {
        self.store.customer(id).await?.ok_or_else(|| StoreError::not_found("Customer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Role;
    use crate::store::{CustomerStore, MemoryStore};

    #[tokio::test]
    async fn test_search_and_block() {
        let store = Arc::new(MemoryStore::new());
        let riya = Customer::register("Riya Das", "riya@example.com", "x".into(), Role::Customer);
        let admin = Customer::register("Ops", "ops@example.com", "x".into(), Role::Admin);
        store.insert_customer(&riya).await.unwrap();
        store.insert_customer(&admin).await.unwrap();
        let customers = CustomerService::new(store);

        let found = customers.list(CustomerQuery { q: Some("riya".into()), ..Default::default() }).await.unwrap();
        assert_eq!(found.total, 1);

        assert!(customers.set_blocked(riya.id, true).await.unwrap().blocked);
        assert!(!customers.set_blocked(riya.id, false).await.unwrap().blocked);
        assert!(matches!(customers.set_blocked(admin.id, true).await, Err(StoreError::Forbidden(_))));

        let detail = customers.detail(riya.id).await.unwrap();
        assert_eq!(detail.orders.order_count, 0);
    }
}
