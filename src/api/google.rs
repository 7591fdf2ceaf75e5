//! Google Calendar endpoints
//!
//! `GET /google/callback` is public: Google redirects the browser there and
//! the signed `state` parameter identifies the user.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Event;
use crate::services::google_calendar::{CalendarSummary, GoogleStatus, SyncReport};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/callback", get(callback))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/auth", get(auth_url))
        .route("/disconnect", post(disconnect))
        .route("/calendars", get(calendars))
        .route("/sync", post(sync))
        .route("/export/{event_id}", post(export))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CalendarRequest {
    pub calendar_id: Option<String>,
}

async fn status(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<GoogleStatus>, ApiError> {
    Ok(Json(state.google_service.status(user.id).await?))
}

async fn auth_url(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let url = state.google_service.auth_url(user.id)?;
    Ok(Json(json!({ "auth_url": url })))
}

async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let target = state
        .google_service
        .callback(query.code.as_deref(), query.state.as_deref())
        .await;
    Redirect::to(&target)
}

async fn disconnect(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    state.google_service.disconnect(user.id).await?;
    Ok(Json(json!({ "message": "Google Calendar disconnected" })))
}

async fn calendars(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<CalendarSummary>>, ApiError> {
    Ok(Json(state.google_service.calendars(user.id).await?))
}

async fn sync(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Option<Json<CalendarRequest>>,
) -> Result<Json<SyncReport>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        state
            .google_service
            .sync(user.id, request.calendar_id.as_deref())
            .await?,
    ))
}

async fn export(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(event_id): Path<i64>,
    body: Option<Json<CalendarRequest>>,
) -> Result<Json<Event>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        state
            .google_service
            .export(user.id, event_id, request.calendar_id.as_deref())
            .await?,
    ))
}
