//! Calendar event endpoints
//!
//! - GET /api/calendar/events?start&end
//! - GET/PUT/DELETE /api/calendar/events/{id}
//! - POST /api/calendar/events
//! - POST /api/calendar/events/{id}/claim
//! - POST /api/calendar/events/{id}/complete

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateEventInput, Event, EventRange, UpdateEventInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/{id}", get(get_event).put(update_event).delete(delete_event))
        .route("/{id}/claim", post(claim_event))
        .route("/{id}/complete", post(complete_event))
}

async fn list_events(
    State(state): State<AppState>,
    Query(range): Query<EventRange>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(state.event_service.list(&range).await?))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.get(id).await?))
}

async fn create_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateEventInput>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.event_service.create(input, user.id).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateEventInput>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.update(id, input).await?))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.event_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn claim_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.claim(id, user.id).await?))
}

async fn complete_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.complete(id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_event_lifecycle() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/calendar/events",
            token,
            Some(json!({
                "title": "Swim practice",
                "start_time": "2026-03-02T16:00:00Z",
                "end_time": "2026-03-02T17:00:00Z",
                "preparation_list": ["towel", "goggles"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["assignment_status"], "pending");
        let id = created["id"].as_i64().unwrap();

        let (status, listed) = send(
            &app,
            Method::GET,
            "/api/calendar/events?start=2026-03-01T00:00:00Z&end=2026-03-03T00:00:00Z",
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, claimed) =
            send(&app, Method::POST, &format!("/api/calendar/events/{}/claim", id), token, None)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(claimed["assignment_status"], "claimed");
        assert_eq!(claimed["assigned_to"], created["created_by"]);

        let (status, done) =
            send(&app, Method::POST, &format!("/api/calendar/events/{}/complete", id), token, None)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["assignment_status"], "completed");

        let (status, _) =
            send(&app, Method::DELETE, &format!("/api/calendar/events/{}", id), token, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) =
            send(&app, Method::GET, &format!("/api/calendar/events/{}", id), token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_event_rejects_end_before_start() {
        let (app, token) = signed_in_app().await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/calendar/events",
            Some(&token),
            Some(json!({
                "title": "Backwards",
                "start_time": "2026-03-02T17:00:00Z",
                "end_time": "2026-03-02T16:00:00Z",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_events_require_auth() {
        let (app, _) = signed_in_app().await;
        let (status, body) = send(&app, Method::GET, "/api/calendar/events", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
}
