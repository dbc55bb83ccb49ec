use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clubchat_core::error::{ClubChatError, ModelError};

/// JSON API error, rendered as `{"success": false, "error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<ClubChatError> for ApiError {
    fn from(err: ClubChatError) -> Self {
        match &err {
            ClubChatError::InvalidInput(msg) => Self::bad_request(msg.clone()),
            ClubChatError::AlreadyExists(msg) => Self::bad_request(msg.clone()),
            ClubChatError::NotFound(_) => Self::not_found(err.to_string()),
            ClubChatError::InvalidCredentials => Self::unauthorized(err.to_string()),
            ClubChatError::Auth(kind) => Self::unauthorized(kind.message()),
            ClubChatError::Model(ModelError::Unavailable(detail)) => {
                tracing::error!("model unavailable: {detail}");
                Self::internal("The assistant is unavailable right now. Please try again later.")
            }
            ClubChatError::Model(ModelError::GenerationFailed(detail)) => {
                tracing::error!("model generation failed: {detail}");
                Self::internal("The assistant could not generate a response. Please try again.")
            }
            ClubChatError::Upstream(detail) => {
                tracing::error!("upstream error: {detail}");
                Self::internal("The club directory is unavailable right now.")
            }
            _ => {
                tracing::error!("api error: {}", err);
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
