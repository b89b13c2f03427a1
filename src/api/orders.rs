use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::extract::{AuthUser, ValidatedJson, IDEMPOTENCY_HEADER};
use super::PageQuery;
use crate::domain::aggregates::Order;
use crate::error::{Result, StoreError};
use crate::services::checkout::{ConfirmPaymentRequest, PlaceOrderRequest, PlacedOrder, ReasonRequest, TrackedOrder};
use crate::state::AppState;
use crate::store::Page;

#[derive(Debug, Deserialize)]
pub struct TrackQuery { pub email: String }

/// 201 for a new order, 200 when an earlier request with the same
/// `Idempotency-Key` is replayed.
pub async fn place(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    ValidatedJson(input): ValidatedJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>)> {
    let key = match headers.get(IDEMPOTENCY_HEADER) {
        Some(value) => Some(
            value.to_str()
                .map_err(|_| StoreError::Validation("Idempotency-Key must be visible ASCII".into()))?
                .to_string(),
        ),
        None => None,
    };
    let placed = state.orders.place_order(user.id, key, input).await?;
    let status = if placed.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(placed)))
}

pub async fn list(State(state): State<AppState>, user: AuthUser, Query(page): Query<PageQuery>) -> Result<Json<Page<Order>>> {
    Ok(Json(state.orders.list_for_customer(user.id, page.into()).await?))
}

pub async fn get(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.orders.get_for_customer(user.id, id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    input: Option<Json<ReasonRequest>>,
) -> Result<Json<Order>> {
    let input = input.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.orders.cancel(user.id, id, input).await?))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<ConfirmPaymentRequest>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders.confirm_payment(user.id, id, input).await?))
}

pub async fn fail_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    input: Option<Json<ReasonRequest>>,
) -> Result<Json<Order>> {
    let input = input.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.orders.fail_payment(user.id, id, input).await?))
}

/// Public lookup, no account needed.
pub async fn track(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<TrackedOrder>> {
    Ok(Json(state.orders.track(&order_number, &query.email).await?))
}
