use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::extract::AuthUser;
use crate::domain::aggregates::Product;
use crate::error::Result;
use crate::services::wishlist::WishlistRequest;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.wishlist.list(user.id).await?))
}

pub async fn add(State(state): State<AppState>, user: AuthUser, Json(input): Json<WishlistRequest>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.wishlist.add(user.id, input.product_id).await?))
}

pub async fn remove(State(state): State<AppState>, user: AuthUser, Path(product_id): Path<Uuid>) -> Result<StatusCode> {
    state.wishlist.remove(user.id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
