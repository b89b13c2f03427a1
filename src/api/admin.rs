//! Back-office endpoints. Every handler requires an admin token.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use uuid::Uuid;

use super::extract::{AdminUser, ValidatedJson};
use crate::domain::aggregates::{BestSeller, Collection, Coupon, Customer, Order, Product};
use crate::error::Result;
use crate::services::catalog::{AdjustStockRequest, CreateProductRequest, ProductQuery, SetStockRequest, UpdateProductRequest};
use crate::services::checkout::{AdminOrderQuery, StatusUpdateRequest};
use crate::services::content::{BestSellersRequest, CollectionRequest};
use crate::services::coupons::CouponRequest;
use crate::services::customers::{CustomerDetail, CustomerQuery};
use crate::state::AppState;
use crate::store::{LowStock, Page};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(archive_product))
        .route("/products/:id/sizes/:size", put(set_stock))
        .route("/products/:id/sizes/:size/adjust", post(adjust_stock))
        .route("/inventory/low-stock", get(low_stock))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", post(update_order_status))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/:id", get(get_coupon).put(update_coupon).delete(delete_coupon))
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/:id", get(get_collection).put(update_collection).delete(delete_collection))
        .route("/best-sellers", put(replace_best_sellers))
        .route("/customers", get(list_customers))
        .route("/customers/:id", get(get_customer))
        .route("/customers/:id/block", post(block_customer))
        .route("/customers/:id/unblock", post(unblock_customer))
        .route("/reviews/:id", delete(delete_review))
}

// products and inventory

async fn list_products(_: AdminUser, State(state): State<AppState>, Query(query): Query<ProductQuery>) -> Result<Json<Page<Product>>> {
    Ok(Json(state.catalog.admin_list(query).await?))
}

async fn get_product(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(state.catalog.admin_get(id).await?))
}

async fn create_product(
    _: AdminUser,
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.catalog.create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    _: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateProductRequest>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog.update(id, input).await?))
}

async fn archive_product(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(state.catalog.archive(id).await?))
}

async fn set_stock(
    _: AdminUser,
    State(state): State<AppState>,
    Path((id, size)): Path<(Uuid, String)>,
    Json(input): Json<SetStockRequest>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog.set_stock(id, &size, input.stock).await?))
}

async fn adjust_stock(
    _: AdminUser,
    State(state): State<AppState>,
    Path((id, size)): Path<(Uuid, String)>,
    Json(input): Json<AdjustStockRequest>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog.adjust_stock(id, &size, input.delta).await?))
}

async fn low_stock(_: AdminUser, State(state): State<AppState>) -> Result<Json<Vec<LowStock>>> {
    Ok(Json(state.catalog.low_stock().await?))
}

// orders

async fn list_orders(_: AdminUser, State(state): State<AppState>, Query(query): Query<AdminOrderQuery>) -> Result<Json<Page<Order>>> {
    Ok(Json(state.orders.admin_list(query).await?))
}

async fn get_order(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.orders.admin_get(id).await?))
}

async fn update_order_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<StatusUpdateRequest>,
) -> Result<Json<Order>> {
    tracing::info!(admin = %admin.email, order_id = %id, status = %input.status, "admin order update");
    Ok(Json(state.orders.update_status(id, input).await?))
}

// coupons

async fn list_coupons(_: AdminUser, State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(state.coupons.list().await?))
}

async fn get_coupon(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Coupon>> {
    Ok(Json(state.coupons.get(id).await?))
}

async fn create_coupon(
    _: AdminUser,
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CouponRequest>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let coupon = state.coupons.create(input).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn update_coupon(
    _: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CouponRequest>,
) -> Result<Json<Coupon>> {
    Ok(Json(state.coupons.update(id, input).await?))
}

async fn delete_coupon(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// content

async fn list_collections(_: AdminUser, State(state): State<AppState>) -> Result<Json<Vec<Collection>>> {
    Ok(Json(state.content.all_collections().await?))
}

async fn get_collection(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Collection>> {
    Ok(Json(state.content.collection(id).await?))
}

async fn create_collection(
    _: AdminUser,
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CollectionRequest>,
) -> Result<(StatusCode, Json<Collection>)> {
    let collection = state.content.create_collection(input).await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

async fn update_collection(
    _: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CollectionRequest>,
) -> Result<Json<Collection>> {
    Ok(Json(state.content.update_collection(id, input).await?))
}

async fn delete_collection(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.content.delete_collection(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_best_sellers(
    _: AdminUser,
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<BestSellersRequest>,
) -> Result<Json<Vec<BestSeller>>> {
    Ok(Json(state.content.replace_best_sellers(input).await?))
}

// customers

async fn list_customers(_: AdminUser, State(state): State<AppState>, Query(query): Query<CustomerQuery>) -> Result<Json<Page<Customer>>> {
    Ok(Json(state.customers.list(query).await?))
}

async fn get_customer(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CustomerDetail>> {
    Ok(Json(state.customers.detail(id).await?))
}

async fn block_customer(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Customer>> {
    Ok(Json(state.customers.set_blocked(id, true).await?))
}

async fn unblock_customer(_: AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Customer>> {
    Ok(Json(state.customers.set_blocked(id, false).await?))
}

async fn delete_review(AdminUser(admin): AdminUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.reviews.delete(id, admin.id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}
