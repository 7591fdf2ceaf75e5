//! Notification endpoints: preferences, inbox, manual senders and web push
//! subscriptions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Event, Notification, NotificationPreferences, NotificationStats,
    UpdateNotificationPreferencesInput,
};
use crate::services::notification::{ChannelResult, SubscriptionSummary};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/read-all", put(mark_all_read))
        .route("/stats", get(notification_stats))
        .route("/test", post(send_test))
        .route("/daily-brief", post(daily_brief))
        .route("/evening-prep", post(evening_prep))
        .route("/responsibility-alert", post(responsibility_alert))
        .route("/urgent", post(send_urgent))
        .route("/handoff", post(handoff))
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", delete(unsubscribe))
        .route("/subscriptions", get(subscriptions))
        .route("/{id}/read", put(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct UrgentRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub target_user_id: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct HandoffRequest {
    pub event_id: i64,
    pub to_user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub subscription: Value,
    pub user_agent: Option<String>,
}

/// Outcome of a delivery attempt; `sent` is false when quiet hours or a
/// disabled type suppressed it
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub sent: bool,
    pub results: Vec<ChannelResult>,
}

impl From<Option<Vec<ChannelResult>>> for DeliveryResponse {
    fn from(results: Option<Vec<ChannelResult>>) -> Self {
        match results {
            Some(results) => Self {
                sent: true,
                results,
            },
            None => Self {
                sent: false,
                results: Vec::new(),
            },
        }
    }
}

async fn get_preferences(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<NotificationPreferences>, ApiError> {
    Ok(Json(state.notification_service.preferences(user.id).await?))
}

async fn update_preferences(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<UpdateNotificationPreferencesInput>,
) -> Result<Json<NotificationPreferences>, ApiError> {
    Ok(Json(
        state
            .notification_service
            .update_preferences(user.id, input)
            .await?,
    ))
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    Ok(Json(
        state
            .notification_service
            .list(user.id, query.limit, query.unread_only)
            .await?,
    ))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.notification_service.mark_read(user.id, id).await?;
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let updated = state.notification_service.mark_all_read(user.id).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn notification_stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<NotificationStats>, ApiError> {
    Ok(Json(state.notification_service.stats(user.id).await?))
}

async fn send_test(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<DeliveryResponse>, ApiError> {
    Ok(Json(state.notification_service.send_test(user.id).await?.into()))
}

async fn daily_brief(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sent = state.notification_service.send_daily_brief().await?;
    Ok(Json(json!({ "sent": sent })))
}

async fn evening_prep(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sent = state.notification_service.send_evening_prep().await?;
    Ok(Json(json!({ "sent": sent })))
}

async fn responsibility_alert(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sent = state.notification_service.send_responsibility_alert().await?;
    Ok(Json(json!({ "sent": sent })))
}

async fn send_urgent(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<UrgentRequest>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let target = body.target_user_id.unwrap_or(user.id);
    let results = state
        .notification_service
        .send_urgent(target, &body.title, &body.message, body.data.unwrap_or_else(|| json!({})))
        .await?;
    Ok(Json(results.into()))
}

async fn handoff(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<HandoffRequest>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(
        state
            .notification_service
            .handoff(body.event_id, user.id, body.to_user_id)
            .await?,
    ))
}

async fn subscribe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .notification_service
        .subscribe(user.id, &body.subscription, body.user_agent.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn unsubscribe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .notification_service
        .unsubscribe(user.id, &body.subscription)
        .await?;
    Ok(Json(json!({ "message": "Unsubscribed" })))
}

async fn subscriptions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<SubscriptionSummary>>, ApiError> {
    Ok(Json(state.notification_service.subscriptions(user.id).await?))
}
