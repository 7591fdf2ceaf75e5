//! Handoff endpoints
//!
//! - GET /api/handoffs/today
//! - POST /api/handoffs/reassign/event/{id}
//! - POST /api/handoffs/reassign/task/{id}
//! - POST /api/handoffs/swap/event/{id}
//! - GET /api/handoffs/stats
//! - GET /api/handoffs/users

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::handoff::{
    HandoffStats, HandoffUser, ReassignInput, ReassignOutcome, SwapInput, SwapOutcome,
    TodayHandoffs,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/today", get(today))
        .route("/reassign/event/{id}", post(reassign_event))
        .route("/reassign/task/{id}", post(reassign_task))
        .route("/swap/event/{id}", post(swap_event))
        .route("/stats", get(stats))
        .route("/users", get(users))
}

async fn today(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TodayHandoffs>, ApiError> {
    Ok(Json(state.handoff_service.today(user.id).await?))
}

async fn reassign_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ReassignInput>,
) -> Result<Json<ReassignOutcome>, ApiError> {
    Ok(Json(state.handoff_service.reassign_event(id, input, &user).await?))
}

async fn reassign_task(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ReassignInput>,
) -> Result<Json<ReassignOutcome>, ApiError> {
    Ok(Json(state.handoff_service.reassign_task(id, input, &user).await?))
}

async fn swap_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<SwapInput>,
) -> Result<Json<SwapOutcome>, ApiError> {
    Ok(Json(state.handoff_service.swap(id, input, &user).await?))
}

async fn stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<HandoffStats>, ApiError> {
    Ok(Json(state.handoff_service.stats(user.id).await?))
}

async fn users(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<HandoffUser>>, ApiError> {
    Ok(Json(state.handoff_service.users(user.id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{register, send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_reassign_then_stats() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let other = register(&app, "partner").await;
        let (_, partner) = send(&app, Method::GET, "/api/auth/me", Some(&other), None).await;

        let start = Utc::now() + Duration::days(3);
        let (_, event) = send(
            &app,
            Method::POST,
            "/api/calendar/events",
            token,
            Some(json!({
                "title": "Vet visit",
                "start_time": start,
                "end_time": start + Duration::hours(1),
            })),
        )
        .await;

        let (status, outcome) = send(
            &app,
            Method::POST,
            &format!("/api/handoffs/reassign/event/{}", event["id"]),
            token,
            Some(json!({"to_user_id": partner["id"], "reason": "Working late"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["new_assignee"], "partner");

        let (_, stats) = send(&app, Method::GET, "/api/handoffs/stats", token, None).await;
        assert_eq!(stats["week"]["handoffs_given"], 1);
        let (_, stats) = send(&app, Method::GET, "/api/handoffs/stats", Some(&other), None).await;
        assert_eq!(stats["week"]["handoffs_received"], 1);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/handoffs/reassign/event/{}", event["id"]),
            token,
            Some(json!({"to_user_id": 999})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, users) = send(&app, Method::GET, "/api/handoffs/users", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().unwrap().len(), 1);
        assert_eq!(users[0]["username"], "partner");

        let (status, today) = send(&app, Method::GET, "/api/handoffs/today", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(today["unassigned"]["events"].is_array());
    }

    #[tokio::test]
    async fn test_swap_needs_matching_assignments() {
        let (app, token) = signed_in_app().await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/handoffs/swap/event/1",
            Some(&token),
            Some(json!({"with_user_id": 2, "their_event_id": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
