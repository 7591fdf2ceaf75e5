//! Recurring event endpoints, mounted at `/api/calendar/recurring`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateRecurringEventInput, Event, UpdateRecurringEventInput};
use crate::services::recurring_event::{routine_templates, RoutineTemplate, TOP_UP_DAYS_AHEAD};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_recurring).post(create_recurring))
        .route("/templates", get(templates))
        .route("/generate", post(generate))
        .route("/{id}", put(update_recurring).delete(delete_recurring))
        .route("/{id}/instances", get(instances))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateQuery {
    pub update_future: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default = "default_true")]
    pub delete_future: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
}

fn default_days_ahead() -> i64 {
    TOP_UP_DAYS_AHEAD
}

async fn list_recurring(State(state): State<AppState>) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(state.recurring_service.list().await?))
}

async fn create_recurring(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateRecurringEventInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.recurring_service.create(input, user.id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_recurring(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<UpdateQuery>,
    Json(input): Json<UpdateRecurringEventInput>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(
        state
            .recurring_service
            .update(id, input, query.update_future)
            .await?,
    ))
}

async fn delete_recurring(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .recurring_service
        .delete(id, query.delete_future)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn instances(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(state.recurring_service.instances(id).await?))
}

async fn generate(
    State(state): State<AppState>,
    body: Option<Json<GenerateRequest>>,
) -> Result<Json<Value>, ApiError> {
    let days_ahead = body.map_or(TOP_UP_DAYS_AHEAD, |Json(b)| b.days_ahead);
    let results = state.recurring_service.generate_missing(days_ahead).await?;
    Ok(Json(json!({
        "message": "Instance generation completed",
        "results": results,
    })))
}

async fn templates() -> Json<Vec<RoutineTemplate>> {
    Json(routine_templates())
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use crate::models::local_to_utc;
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, Local, NaiveTime, SecondsFormat, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_daily_series_lifecycle() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let today = Local::now().date_naive();
        let start = local_to_utc(today.and_time(NaiveTime::from_hms_opt(19, 30, 0).unwrap()));

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/calendar/recurring",
            token,
            Some(json!({
                "title": "Bedtime",
                "start_time": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "end_time": (start + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true),
                "recurrence_type": "daily",
                "recurrence_end_date": (today + Duration::days(2)).to_string(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", created);
        assert_eq!(created["instances"].as_array().unwrap().len(), 3);
        let id = created["parent"]["id"].as_i64().unwrap();

        let (_, listed) = send(&app, Method::GET, "/api/calendar/recurring", token, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/api/calendar/recurring/{}?update_future=true", id),
            token,
            Some(json!({"title": "Lights out"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Lights out");
        let (_, instances) = send(
            &app,
            Method::GET,
            &format!("/api/calendar/recurring/{}/instances", id),
            token,
            None,
        )
        .await;
        assert!(instances
            .as_array()
            .unwrap()
            .iter()
            .all(|e| e["title"] == "Lights out"));

        let (status, generated) = send(
            &app,
            Method::POST,
            "/api/calendar/recurring/generate",
            token,
            Some(json!({"days_ahead": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(generated["results"][0]["instances_created"], 0);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/calendar/recurring/{}", id),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/calendar/recurring/{}/instances", id),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_and_templates() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let start = Utc::now();

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/calendar/recurring",
            token,
            Some(json!({
                "title": "Showers",
                "start_time": start,
                "end_time": start + Duration::minutes(30),
                "recurrence_type": "custom",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, templates) =
            send(&app, Method::GET, "/api/calendar/recurring/templates", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(templates.as_array().unwrap().len(), 3);
        assert_eq!(templates[0]["name"], "Bedtime Routine");

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/calendar/recurring/99",
            token,
            Some(json!({"title": "Nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
