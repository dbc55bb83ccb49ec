use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use clubchat_core::auth::bearer_token;
use clubchat_core::error::{AuthRejection, ClubChatError};
use clubchat_core::model::{LoginInput, Principal, RegisterInput};

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Routes that need a verified principal; mounted behind [`require_auth`].
pub fn guarded_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/me", get(me))
}

/// Verify the bearer token and attach the [`Principal`] to the request,
/// or answer 401 with the rejection kind.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = match request.headers().get(AUTHORIZATION) {
        None => return Err(ClubChatError::from(AuthRejection::Missing).into()),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ClubChatError::from(AuthRejection::Malformed))?;
            bearer_token(Some(value))
                .map_err(ClubChatError::from)?
                .to_string()
        }
    };

    let principal = state.auth.verify(&state.storage, Some(&token)).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = body?;
    let user = state.auth.register(&state.storage, &input).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "User registered successfully",
            "user": user,
        })),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = body?;
    let outcome = state.auth.login(&state.storage, &input).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "token": outcome.token,
        "user": outcome.user,
    })))
}

async fn me(Extension(principal): Extension<Principal>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "user": principal }))
}
