pub mod auth;
pub mod chat;
pub mod clubs;
pub mod favorites;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use clubchat_core::storage::StorageBackend;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .merge(auth::guarded_routes())
        .merge(favorites::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(chat::routes())
        .merge(auth::routes())
        .merge(clubs::routes())
        .merge(guarded)
        .fallback(not_found)
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let model = state
        .llm
        .as_ref()
        .map(|llm| llm.provider_name())
        .unwrap_or("disabled");

    match state.storage.count_clubs().await {
        Ok(clubs) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "store": "connected",
                "clubs": clubs,
                "model": model,
                "llm_enabled": state.config.llm.enabled,
            })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "degraded",
                    "store": "unavailable",
                    "model": model,
                })),
            )
        }
    }
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "success": false, "error": "Not found" })),
    )
}
