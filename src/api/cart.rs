use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::extract::{AuthUser, ValidatedJson};
use crate::error::Result;
use crate::services::cart::{AddItemRequest, ApplyCouponRequest, CartView, UpdateItemRequest};
use crate::state::AppState;

pub async fn view(State(state): State<AppState>, user: AuthUser) -> Result<Json<CartView>> {
    Ok(Json(state.carts.view(user.id).await?))
}

pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<AddItemRequest>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts.add_item(user.id, input).await?))
}

pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((product_id, size)): Path<(Uuid, String)>,
    Json(input): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts.update_item(user.id, product_id, &size, input.quantity).await?))
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((product_id, size)): Path<(Uuid, String)>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts.remove_item(user.id, product_id, &size).await?))
}

pub async fn clear(State(state): State<AppState>, user: AuthUser) -> Result<StatusCode> {
    state.carts.clear(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<ApplyCouponRequest>,
) -> Result<Json<CartView>> {
    Ok(Json(state.carts.apply_coupon(user.id, input).await?))
}

pub async fn remove_coupon(State(state): State<AppState>, user: AuthUser) -> Result<Json<CartView>> {
    Ok(Json(state.carts.remove_coupon(user.id).await?))
}
