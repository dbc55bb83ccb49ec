use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use clubchat_core::error::ClubChatError;
use clubchat_core::model::{Club, CreateClubInput, UpdateClubInput};
use clubchat_core::storage::StorageBackend;

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clubs", get(list_clubs).post(create_club))
        .route(
            "/clubs/{name}",
            get(get_club).put(update_club).delete(delete_club),
        )
}

async fn list_clubs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Club>>, ApiError> {
    Ok(Json(state.storage.list_clubs(None).await?))
}

/// Lookup by name, case-insensitive. Answers with a list of zero or one clubs.
async fn get_club(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Club>>, ApiError> {
    match state.storage.get_club_by_name(&name).await {
        Ok(club) => Ok(Json(vec![club])),
        Err(ClubChatError::NotFound(_)) => Ok(Json(Vec::new())),
        Err(e) => Err(e.into()),
    }
}

async fn create_club(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateClubInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = body?;
    let club = input.into_club()?;
    state.storage.create_club(&club).await?;
    tracing::info!(name = %club.name, "club created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "club": club })),
    ))
}

async fn update_club(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<UpdateClubInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = body?;
    let club = state.storage.update_club(&name, &input).await?;
    Ok(Json(serde_json::json!({ "success": true, "club": club })))
}

async fn delete_club(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.storage.delete_club(&name).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Club '{name}' deleted"),
    })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_club_crud_roundtrip() {
        let state = state_with(None);

        let resp = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/clubs",
                serde_json::json!({
                    "name": "Robotics Club",
                    "description": "We build robots",
                    "majors": "ME, ECE",
                    "extra": { "meeting_day": "Tuesday" },
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app(state.clone())
            .oneshot(empty_request("GET", "/clubs/robotics%20club"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["name"], "Robotics Club");
        assert_eq!(json[0]["extra"]["meeting_day"], "Tuesday");

        let resp = app(state.clone())
            .oneshot(json_request(
                "PUT",
                "/clubs/Robotics%20Club",
                serde_json::json!({ "description": "Robots and drones" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["club"]["description"], "Robots and drones");

        let resp = app(state.clone())
            .oneshot(empty_request("DELETE", "/clubs/ROBOTICS%20CLUB"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app(state)
            .oneshot(empty_request("GET", "/clubs"))
            .await
            .unwrap();
        let json = body_json(resp.into_body()).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_club_lookup_is_empty_list() {
        let resp = app(state_with(None))
            .oneshot(empty_request("GET", "/clubs/Nothing"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_create_club_validation() {
        let state = state_with(None);
        let resp = app(state.clone())
            .oneshot(json_request("POST", "/clubs", serde_json::json!({ "name": "  " })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        for expected in [StatusCode::CREATED, StatusCode::BAD_REQUEST] {
            let resp = app(state.clone())
                .oneshot(json_request(
                    "POST",
                    "/clubs",
                    serde_json::json!({ "name": "Chess Club" }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_club_is_404() {
        let state = state_with(None);
        let resp = app(state.clone())
            .oneshot(json_request(
                "PUT",
                "/clubs/Ghost",
                serde_json::json!({ "description": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app(state)
            .oneshot(empty_request("DELETE", "/clubs/Ghost"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
