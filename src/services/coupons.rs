//! Coupon administration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Coupon, CouponKind};
use crate::error::{Result, StoreError};
use crate::store::Storage;

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    pub kind: CouponKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_order: Decimal,
    pub max_discount: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool { true }

#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn Storage>,
}

impl CouponService {
    pub fn new(store: Arc<dyn Storage>) -> Self { Self { store } }

    pub async fn list(&self) -> Result<Vec<Coupon>> { self.store.list_coupons().await }

    pub async fn get(&self, id: Uuid) -> Result<Coupon> {
        self.store.coupon(id).await?.ok_or_else(|| StoreError::not_found("Coupon"))
    }

    pub async fn by_code(&self, code: &str) -> Result<Coupon> {
        self.store.coupon_by_code(code).await?.ok_or_else(|| StoreError::not_found("Coupon"))
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CouponRequest) -> Result<Coupon> {
        input.validate()?;
        let now = Utc::now();
        let coupon = Coupon {
            id: Uuid::now_v7(),
            code: Coupon::normalize_code(&input.code),
            description: input.description,
            kind: input.kind,
            value: input.value,
            min_order: input.min_order,
            max_discount: input.max_discount,
            starts_at: input.starts_at,
            expires_at: input.expires_at,
            usage_limit: input.usage_limit,
            used_count: 0,
            active: input.active,
            created_at: now,
            updated_at: now,
        };
        coupon.validate_terms().map_err(StoreError::Validation)?;
        self.store.insert_coupon(&coupon).await?;
        Ok(coupon)
    }

    /// Replaces the terms; the usage count is never reset.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, input: CouponRequest) -> Result<Coupon> {
        input.validate()?;
        let existing = self.get(id).await?;
        let coupon = Coupon {
            code: Coupon::normalize_code(&input.code),
            description: input.description,
            kind: input.kind,
            value: input.value,
            min_order: input.min_order,
            max_discount: input.max_discount,
            starts_at: input.starts_at,
            expires_at: input.expires_at,
            usage_limit: input.usage_limit,
            active: input.active,
            updated_at: Utc::now(),
            ..existing
        };
        coupon.validate_terms().map_err(StoreError::Validation)?;
        self.store.update_coupon(&coupon).await?;
        Ok(coupon)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_coupon(id).await? {
            return Err(StoreError::not_found("Coupon"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn request(code: &str) -> CouponRequest {
        CouponRequest {
            code: code.into(), description: "Festive".into(), kind: CouponKind::Percentage, value: dec!(15),
            min_order: dec!(500), max_discount: Some(dec!(300)), starts_at: None, expires_at: None,
            usage_limit: Some(100), active: true,
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let coupons = CouponService::new(Arc::new(MemoryStore::new()));
        let c = coupons.create(request(" diwali15 ")).await.unwrap();
        assert_eq!(c.code, "DIWALI15");
        assert_eq!(coupons.by_code("diwali15").await.unwrap().id, c.id);
        assert!(matches!(coupons.create(request("DIWALI15")).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_terms_are_validated() {
        let coupons = CouponService::new(Arc::new(MemoryStore::new()));
        let mut req = request("TOOMUCH");
        req.value = dec!(150);
        assert!(matches!(coupons.create(req).await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let coupons = CouponService::new(Arc::new(MemoryStore::new()));
        let c = coupons.create(request("SPRING")).await.unwrap();
        let mut req = request("SPRING");
        req.active = false;
        assert!(!coupons.update(c.id, req).await.unwrap().active);
        coupons.delete(c.id).await.unwrap();
        assert!(matches!(coupons.delete(c.id).await, Err(StoreError::NotFound(_))));
    }
}
