//! Request extractors: authenticated callers and validated JSON bodies.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Json, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::Role;
use crate::error::{ErrorResponse, StoreError};
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Caller identified by a bearer token or the `access_token` cookie.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer ").map(|s| s.trim().to_string()))
        .or_else(|| {
            headers
                .get("cookie")
                .and_then(|v| v.to_str().ok())
                .and_then(|cookies| {
                    cookies.split(';').find_map(|cookie| {
                        let (name, value) = cookie.trim().split_once('=')?;
                        (name == "access_token").then(|| value.to_string())
                    })
                })
        })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = StoreError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| StoreError::Unauthorized("Missing bearer token".into()))?;
        let claims = state.auth.verify(&token)?;
        Ok(Self { id: claims.sub, email: claims.email, role: claims.role })
    }
}

/// An authenticated caller with the admin role.
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = StoreError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(StoreError::Forbidden("Admin access required".into()));
        }
        Ok(Self(user))
    }
}

/// JSON body validated with `validator` before the handler runs.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| StoreError::Validation(e.body_text()).into_response())?;

        data.validate().map_err(|e| {
            let details = e
                .field_errors()
                .iter()
                .map(|(field, errors)| {
                    let messages: Vec<serde_json::Value> = errors
                        .iter()
                        .map(|err| serde_json::json!({ "code": err.code, "message": err.message, "params": err.params }))
                        .collect();
                    (field.to_string(), serde_json::Value::Array(messages))
                })
                .collect::<serde_json::Map<_, _>>();
            let body = ErrorResponse {
                error: "validation",
                message: "Request validation failed".to_string(),
                details: Some(serde_json::Value::Object(details)),
            };
            (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
        })?;

        Ok(Self(data))
    }
}
