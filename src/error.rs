//! Error type shared by services, storage and HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{CartError, CouponRejection, OrderError, OrderStatus, ProductError, ReviewError};
use crate::domain::value_objects::{MoneyError, SkuError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock for size {size}: {available} available, {requested} requested")]
    InsufficientStock { product_id: Uuid, size: String, available: u32, requested: u32 },

    #[error("{0}")]
    CouponRejected(CouponRejection),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment verification failed")]
    PaymentVerification,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// JSON body returned for every error response.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StoreError {
    pub fn not_found(what: impl std::fmt::Display) -> Self { Self::NotFound(what.to_string()) }

    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::CouponRejected(_) => (StatusCode::BAD_REQUEST, "coupon_rejected"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::InsufficientStock { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
            Self::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            Self::PaymentVerification => (StatusCode::UNPROCESSABLE_ENTITY, "payment_verification"),
            Self::Database(_) | Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }

    pub fn status(&self) -> StatusCode { self.status_and_kind().0 }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let details = match &self {
            Self::InsufficientStock { product_id, size, available, requested } => Some(serde_json::json!({
                "product_id": product_id, "size": size, "available": available, "requested": requested,
            })),
            Self::CouponRejected(reason) => serde_json::to_value(reason).ok(),
            _ => None,
        };
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Something went wrong, please try again".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        };
        (status, Json(ErrorResponse { error: kind, message, details })).into_response()
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(err: validator::ValidationErrors) -> Self { Self::Validation(err.to_string()) }
}

impl From<OrderError> for StoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => Self::Validation(err.to_string()),
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
        }
    }
}

impl From<ProductError> for StoreError {
    fn from(err: ProductError) -> Self { Self::Validation(err.to_string()) }
}

impl From<CartError> for StoreError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound => Self::not_found("Cart item"),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<ReviewError> for StoreError {
    fn from(err: ReviewError) -> Self { Self::Validation(err.to_string()) }
}

impl From<SkuError> for StoreError {
    fn from(err: SkuError) -> Self { Self::Validation(err.to_string()) }
}

impl From<MoneyError> for StoreError {
    fn from(err: MoneyError) -> Self { Self::Internal(err.to_string()) }
}

impl From<CouponRejection> for StoreError {
    fn from(reason: CouponRejection) -> Self { Self::CouponRejected(reason) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StoreError::not_found("Order").status(), StatusCode::NOT_FOUND);
        let stock = StoreError::InsufficientStock { product_id: Uuid::nil(), size: "UK 8".into(), available: 1, requested: 2 };
        assert_eq!(stock.status(), StatusCode::CONFLICT);
        assert_eq!(StoreError::PaymentVerification.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(StoreError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cart_item_missing_is_not_found() {
        assert_eq!(StoreError::from(CartError::ItemNotFound).status(), StatusCode::NOT_FOUND);
    }
}
