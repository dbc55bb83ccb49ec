use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use clubchat_core::auth::bearer_token;
use clubchat_core::chat::{ChatOrchestrator, ChatRequest};
use clubchat_core::identity::ConnectionMeta;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub session_id: String,
}

/// Connection metadata for anonymous identity: forwarded client address,
/// else the socket peer, plus the User-Agent.
pub struct ClientOrigin(pub ConnectionMeta);

impl<S: Send + Sync> FromRequestParts<S> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let origin = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let signature = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(Self(ConnectionMeta::new(origin, signature)))
    }
}

/// Bearer token if the header carries a well-formed one. Anything else is
/// treated as no credential.
fn optional_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    bearer_token(Some(value)).ok().map(str::to_string)
}

async fn chat(
    State(state): State<Arc<AppState>>,
    ClientOrigin(connection): ClientOrigin,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = body?;

    let request = ChatRequest {
        message: body.message,
        session_id: body.session_id,
        bearer: optional_bearer(&headers),
        connection,
    };

    let reply = ChatOrchestrator::new(&state.storage, &state.auth, &state.llm)
        .handle(request)
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        response: reply.response,
        session_id: reply.session_id,
    }))
}
