//! Product reviews.

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Product, Review};
use crate::domain::events::ReviewEvent;
use crate::error::{Result, StoreError};
use crate::services::events::EventPublisher;
use crate::store::{Page, PageRequest, Storage};

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn Storage>,
    events: Arc<dyn EventPublisher>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Storage>, events: Arc<dyn EventPublisher>) -> Self { Self { store, events } }

    /// One review per customer and product. It is marked verified when the
    /// customer has a delivered order containing the product.
    #[instrument(skip(self, input))]
    pub async fn post(&self, customer_id: Uuid, product_id: Uuid, input: ReviewRequest) -> Result<Review> {
        input.validate()?;
        self.store.product(product_id).await?
            .filter(Product::is_visible)
            .ok_or_else(|| StoreError::not_found("Product"))?;
        let customer = self.store.customer(customer_id).await?.ok_or_else(|| StoreError::not_found("Customer"))?;
        let verified = self.store.has_delivered_purchase(customer_id, product_id).await?;

        let review = Review::create(product_id, customer_id, &customer.name, input.rating, &input.title, &input.body, verified)?;
        self.store.insert_review(&review).await?;
        self.store.refresh_rating(product_id).await?;
        tracing::info!(review_id = %review.id, rating = review.rating, verified, "review posted");
        self.events.publish(ReviewEvent::Posted { review_id: review.id, product_id, rating: review.rating }.into()).await;
        Ok(review)
    }

    pub async fn list(&self, product_id: Uuid, page: PageRequest) -> Result<Page<Review>> {
        self.store.reviews_for(product_id, page).await
    }

    /// Authors may delete their own reviews, admins any review.
    #[instrument(skip(self))]
    pub async fn delete(&self, review_id: Uuid, requester: Uuid, is_admin: bool) -> Result<()> {
        let review = self.store.review(review_id).await?.ok_or_else(|| StoreError::not_found("Review"))?;
        if review.customer_id != requester && !is_admin {
            return Err(StoreError::Forbidden("Only the author can delete this review".into()));
        }
        self.store.delete_review(review_id).await?;
        self.store.refresh_rating(review.product_id).await
    }
}
