//! Preparation timeline template endpoints
//!
//! Templates are checklist templates; a timeline is the copy of a
//! template's items attached to one event.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ChecklistTemplate, PreparationTimeline, SimilarEventTimeline};
use crate::services::timeline_template::{
    AssignOutcome, AssignTemplateInput, EventDescription, ScoredTemplate, TemplateFromEventInput,
    TemplateSearch, TimelineProgressInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search))
        .route("/suggestions", post(suggestions))
        .route("/from-similar-events", post(from_similar_events))
        .route("/from-event", post(from_event))
        .route("/assign", post(assign))
        .route("/event/{event_id}", get(timeline))
        .route("/event/{event_id}/progress", put(update_progress))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<TemplateSearch>,
) -> Result<Json<Vec<ChecklistTemplate>>, ApiError> {
    Ok(Json(state.timeline_template_service.search(&query).await?))
}

async fn suggestions(
    State(state): State<AppState>,
    Json(request): Json<EventDescription>,
) -> Result<Json<Vec<ScoredTemplate>>, ApiError> {
    Ok(Json(state.timeline_template_service.suggest(&request).await?))
}

async fn from_similar_events(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<EventDescription>,
) -> Result<Json<Vec<SimilarEventTimeline>>, ApiError> {
    Ok(Json(
        state
            .timeline_template_service
            .similar_events(&request, user.id)
            .await?,
    ))
}

async fn from_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<TemplateFromEventInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .timeline_template_service
        .template_from_event(input, user.id)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn assign(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<AssignTemplateInput>,
) -> Result<Json<AssignOutcome>, ApiError> {
    Ok(Json(
        state.timeline_template_service.assign(input, user.id).await?,
    ))
}

async fn timeline(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<PreparationTimeline>, ApiError> {
    Ok(Json(state.timeline_template_service.timeline(event_id).await?))
}

async fn update_progress(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(event_id): Path<i64>,
    Json(input): Json<TimelineProgressInput>,
) -> Result<Json<PreparationTimeline>, ApiError> {
    Ok(Json(
        state
            .timeline_template_service
            .update_progress(event_id, input, user.id)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{register, send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_assign_track_and_reuse() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, template) = send(
            &app,
            Method::POST,
            "/api/checklists/templates",
            token,
            Some(json!({
                "name": "Swim bag",
                "category": "sports",
                "items": [{"id": "towel", "text": "Towel"}, {"id": "goggles", "text": "Goggles"}],
                "tags": ["swim"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", template);
        let template_id = template["id"].as_i64().unwrap();

        let start = Utc::now() + Duration::days(1);
        let (_, event) = send(
            &app,
            Method::POST,
            "/api/calendar/events",
            token,
            Some(json!({
                "title": "Swim lesson",
                "event_type": "swim",
                "start_time": start,
                "end_time": start + Duration::hours(1),
            })),
        )
        .await;
        let event_id = event["id"].as_i64().unwrap();

        let (status, found) =
            send(&app, Method::GET, "/api/timeline-templates?event_type=swim", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found[0]["name"], "Swim bag");

        let (status, assigned) = send(
            &app,
            Method::POST,
            "/api/timeline-templates/assign",
            token,
            Some(json!({
                "event_id": event_id,
                "template_id": template_id,
                "customizations": [{"item_id": "goggles", "enabled": false}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(assigned["events_updated"], 1);
        assert_eq!(assigned["timeline_items"], 2);

        let uri = format!("/api/timeline-templates/event/{}", event_id);
        let (status, timeline) = send(&app, Method::GET, &uri, token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timeline["template_name"], "Swim bag");
        assert_eq!(timeline["timeline_data"][1]["enabled"], false);

        let (status, saved) = send(
            &app,
            Method::PUT,
            &format!("{}/progress", uri),
            token,
            Some(json!({"completed_tasks": ["towel"], "timeline_data": timeline["timeline_data"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["completed_tasks"], json!(["towel"]));

        let (status, similar) = send(
            &app,
            Method::POST,
            "/api/timeline-templates/from-similar-events",
            token,
            Some(json!({"event_title": "swim"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(similar[0]["event_id"], event_id);

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/timeline-templates/from-event",
            token,
            Some(json!({"event_id": event_id, "template_name": "My swim prep"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["template_items"], 2);

        let other = register(&app, "partner").await;
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("{}/progress", uri),
            Some(&other),
            Some(json!({"completed_tasks": []})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_timeline_and_suggestions() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, _) =
            send(&app, Method::GET, "/api/timeline-templates/event/77", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/timeline-templates/assign",
            token,
            Some(json!({"event_id": 77, "template_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, suggestions) = send(
            &app,
            Method::POST,
            "/api/timeline-templates/suggestions",
            token,
            Some(json!({"event_title": "Soccer practice"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(suggestions.is_array());
    }
}
