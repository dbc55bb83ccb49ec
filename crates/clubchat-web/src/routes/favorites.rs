use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{Extension, Router};
use clubchat_core::model::Principal;
use clubchat_core::storage::StorageBackend;

use crate::error::ApiError;
use crate::AppState;

/// Mounted behind `require_auth`, so a [`Principal`] is always present.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/favorites", get(list_favorites))
        .route(
            "/favorites/{club_name}",
            post(add_favorite).delete(remove_favorite),
        )
}

fn favorites_body(favorites: Vec<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "favorites": favorites }))
}

async fn list_favorites(Extension(principal): Extension<Principal>) -> Json<serde_json::Value> {
    favorites_body(principal.favorites)
}

async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(club_name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let club = state.storage.get_club_by_name(&club_name).await?;
    let favorites = state.storage.add_favorite(&principal.email, club.id).await?;
    Ok(favorites_body(favorites))
}

async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(club_name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let club = state.storage.get_club_by_name(&club_name).await?;
    let favorites = state
        .storage
        .remove_favorite(&principal.email, club.id)
        .await?;
    Ok(favorites_body(favorites))
}
