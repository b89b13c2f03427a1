use axum::{extract::State, http::StatusCode, Json};

use super::extract::{AuthUser, ValidatedJson};
use crate::domain::aggregates::Customer;
use crate::error::Result;
use crate::services::auth::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let registered = state.auth.register(input).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

pub async fn login(State(state): State<AppState>, ValidatedJson(input): ValidatedJson<LoginRequest>) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth.login(input).await?))
}

pub async fn profile(State(state): State<AppState>, user: AuthUser) -> Result<Json<Customer>> {
    Ok(Json(state.auth.profile(user.id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<Customer>> {
    Ok(Json(state.auth.update_profile(user.id, input).await?))
}
