use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::aggregates::{Collection, Product};
use crate::error::Result;
use crate::services::content::CollectionView;
use crate::state::AppState;

pub async fn list_collections(State(state): State<AppState>) -> Result<Json<Vec<Collection>>> {
    Ok(Json(state.content.active_collections().await?))
}

pub async fn collection_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<CollectionView>> {
    Ok(Json(state.content.collection_by_slug(&slug).await?))
}

pub async fn best_sellers(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.content.best_sellers().await?))
}
