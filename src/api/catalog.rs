use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::extract::{AuthUser, ValidatedJson};
use super::PageQuery;
use crate::domain::aggregates::{Product, Review};
use crate::error::Result;
use crate::services::catalog::ProductQuery;
use crate::services::reviews::ReviewRequest;
use crate::state::AppState;
use crate::store::Page;

pub async fn list_products(State(state): State<AppState>, Query(query): Query<ProductQuery>) -> Result<Json<Page<Product>>> {
    Ok(Json(state.catalog.list(query).await?))
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(state.catalog.get(id).await?))
}

pub async fn product_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>> {
    Ok(Json(state.catalog.get_by_slug(&slug).await?))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Review>>> {
    Ok(Json(state.reviews.list(id, page.into()).await?))
}

pub async fn post_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = state.reviews.post(user.id, id, input).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn delete_review(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.reviews.delete(id, user.id, user.is_admin()).await?;
    Ok(StatusCode::NO_CONTENT)
}
