//! Timeline suggestion endpoints
//!
//! Clients report how preparation timelines were actually used; the server
//! learns patterns from that history and proposes changes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    PatternInsight, SuggestionPreferences, TimelineStats, TimelineSuggestion,
    UpdateSuggestionPreferencesInput, UsageRecordInput,
};
use crate::services::timeline_suggestion::{
    CleanupSummary, CompletionInput, CompletionSummary, SuggestionApplication,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suggestions))
        .route("/record-usage", post(record_usage))
        .route("/record-completion", post(record_completion))
        .route("/for-event", get(suggestions_for_event))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/insights", get(insights))
        .route("/analyze-patterns", post(analyze_patterns))
        .route("/stats", get(stats))
        .route("/cleanup", post(cleanup))
        .route("/{id}/respond", post(respond))
        .route("/{id}/apply", get(apply))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ForEventQuery {
    pub event_pattern: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    pub pattern_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RespondRequest {
    pub response: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CleanupRequest {
    pub days_old: Option<i64>,
}

async fn record_usage(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(usage): Json<UsageRecordInput>,
) -> Result<impl IntoResponse, ApiError> {
    state.timeline_service.record_usage(user.id, &usage).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Usage recorded successfully" })),
    ))
}

async fn record_completion(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CompletionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let summary: CompletionSummary = state
        .timeline_service
        .record_completion(user.id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn list_suggestions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TimelineSuggestion>>, ApiError> {
    Ok(Json(state.timeline_service.list(user.id, query.limit).await?))
}

async fn suggestions_for_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<ForEventQuery>,
) -> Result<Json<Vec<TimelineSuggestion>>, ApiError> {
    Ok(Json(
        state
            .timeline_service
            .for_event(user.id, query.event_pattern.as_deref(), query.limit)
            .await?,
    ))
}

async fn respond(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RespondRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .timeline_service
        .respond(user.id, id, &body.response)
        .await?;
    Ok(Json(json!({ "message": "Response recorded" })))
}

async fn apply(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SuggestionApplication>, ApiError> {
    Ok(Json(state.timeline_service.apply(user.id, id).await?))
}

async fn get_preferences(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SuggestionPreferences>, ApiError> {
    Ok(Json(state.timeline_service.preferences(user.id).await?))
}

async fn update_preferences(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<UpdateSuggestionPreferencesInput>,
) -> Result<Json<SuggestionPreferences>, ApiError> {
    Ok(Json(
        state
            .timeline_service
            .update_preferences(user.id, &input)
            .await?,
    ))
}

async fn insights(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<InsightsQuery>,
) -> Result<Json<Vec<PatternInsight>>, ApiError> {
    Ok(Json(
        state
            .timeline_service
            .insights(user.id, query.pattern_type.as_deref(), query.limit)
            .await?,
    ))
}

async fn analyze_patterns(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let created = state.timeline_service.analyze(user.id).await?;
    Ok(Json(json!({
        "message": "Pattern analysis completed",
        "suggestions_created": created,
    })))
}

async fn stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TimelineStats>, ApiError> {
    Ok(Json(state.timeline_service.stats(user.id).await?))
}

async fn cleanup(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Option<Json<CleanupRequest>>,
) -> Result<Json<CleanupSummary>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(state.timeline_service.cleanup(user.id, request.days_old).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn completion() -> serde_json::Value {
        json!({
            "event_type": "school",
            "event_pattern": "school_morning",
            "timeline_data": [
                {"id": "custom-1", "text": "Pack water bottle", "category": "preparation", "time_offset": -30},
                {"id": "t-2", "text": "Brush teeth", "time_offset": -20},
            ],
            "completed_tasks": ["custom-1", "t-2"],
        })
    }

    #[tokio::test]
    async fn test_repeated_custom_task_becomes_suggestion() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        for _ in 0..10 {
            let (status, summary) = send(
                &app,
                Method::POST,
                "/api/timeline-suggestions/record-completion",
                token,
                Some(completion()),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(summary["records_created"], 2);
        }

        let (status, suggestions) =
            send(&app, Method::GET, "/api/timeline-suggestions", token, None).await;
        assert_eq!(status, StatusCode::OK);
        let suggestions = suggestions.as_array().unwrap().clone();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0]["suggestion_type"], "add_frequent_task");
        let id = suggestions[0]["id"].as_i64().unwrap();

        let (status, applied) = send(
            &app,
            Method::GET,
            &format!("/api/timeline-suggestions/{}/apply", id),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["type"], "add_frequent_task");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/timeline-suggestions/{}/respond", id),
            token,
            Some(json!({"response": "maybe"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/timeline-suggestions/{}/respond", id),
            token,
            Some(json!({"response": "accepted"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/timeline-suggestions/{}/apply", id),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/timeline-suggestions/record-completion",
            token,
            Some(json!({"event_pattern": "school_morning"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, Method::GET, "/api/timeline-suggestions/for-event", token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, Method::GET, "/api/timeline-suggestions/99/apply", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, prefs) =
            send(&app, Method::GET, "/api/timeline-suggestions/preferences", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(prefs["learning_mode"], true);
    }
}
