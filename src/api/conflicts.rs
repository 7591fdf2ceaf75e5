//! Schedule conflict endpoints
//!
//! - GET /api/conflicts/detect?start&end
//! - GET /api/conflicts/upcoming
//! - GET /api/conflicts/active?limit
//! - GET /api/conflicts/stats?timeframe
//! - GET /api/conflicts/{id}
//! - POST /api/conflicts/{id}/resolve | acknowledge | ignore
//! - POST /api/conflicts/bulk-resolve
//! - POST /api/conflicts/suggest-resolution

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Conflict, ConflictResolution, ConflictSeverity, ConflictStats, ResolutionAdvice};
use crate::services::conflict::{advise, BulkResolveOutcome, DateRange, DetectionReport};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/detect", get(detect))
        .route("/upcoming", get(upcoming))
        .route("/active", get(active))
        .route("/stats", get(stats))
        .route("/bulk-resolve", post(bulk_resolve))
        .route("/suggest-resolution", post(suggest_resolution))
        .route("/{id}", get(get_conflict))
        .route("/{id}/resolve", post(resolve))
        .route("/{id}/acknowledge", post(acknowledge))
        .route("/{id}/ignore", post(ignore))
}

#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub timeframe: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResolveRequest {
    pub resolution: Option<ConflictResolution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BulkResolveRequest {
    pub conflict_ids: Vec<i64>,
    pub resolution: Option<ConflictResolution>,
}

/// The parts of a conflict advice is computed from
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdviceSubject {
    pub severity: ConflictSeverity,
    pub resolution_suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub conflict: AdviceSubject,
}

async fn detect(
    State(state): State<AppState>,
    Query(query): Query<DetectQuery>,
) -> Result<Json<DetectionReport>, ApiError> {
    let start = query.start.unwrap_or_else(Utc::now);
    let end = query.end.unwrap_or(start + Duration::days(7));
    Ok(Json(state.conflict_service.detect(DateRange { start, end }).await?))
}

async fn upcoming(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state.conflict_service.upcoming().await?;
    let urgent = report
        .conflicts
        .iter()
        .filter(|c| c.conflict.severity.is_urgent())
        .count();
    Ok(Json(json!({
        "conflicts": report.conflicts,
        "total_conflicts": report.total_conflicts,
        "urgent_conflicts": urgent,
    })))
}

async fn active(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Conflict>>, ApiError> {
    Ok(Json(state.conflict_service.active(query.limit).await?))
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ConflictStats>, ApiError> {
    let timeframe = query.timeframe.as_deref().unwrap_or("week");
    Ok(Json(state.conflict_service.stats(timeframe).await?))
}

async fn get_conflict(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Conflict>, ApiError> {
    Ok(Json(state.conflict_service.get(id).await?))
}

async fn resolve(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<Conflict>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        state
            .conflict_service
            .resolve(id, request.resolution, user.id)
            .await?,
    ))
}

async fn acknowledge(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Conflict>, ApiError> {
    Ok(Json(state.conflict_service.acknowledge(id, user.id).await?))
}

async fn ignore(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Conflict>, ApiError> {
    Ok(Json(state.conflict_service.ignore(id, user.id).await?))
}

async fn bulk_resolve(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<BulkResolveRequest>,
) -> Result<Json<BulkResolveOutcome>, ApiError> {
    Ok(Json(
        state
            .conflict_service
            .bulk_resolve(&body.conflict_ids, body.resolution, user.id)
            .await?,
    ))
}

async fn suggest_resolution(Json(body): Json<SuggestRequest>) -> Json<ResolutionAdvice> {
    Json(advise(body.conflict.severity, &body.conflict.resolution_suggestions))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, SecondsFormat, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_detect_resolve_and_close() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let (_, me) = send(&app, Method::GET, "/api/auth/me", token, None).await;

        let start = Utc::now() + Duration::days(1);
        for (title, offset) in [("Swim", 0), ("Piano", 30)] {
            let at = start + Duration::minutes(offset);
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/calendar/events",
                token,
                Some(json!({
                    "title": title,
                    "start_time": at,
                    "end_time": at + Duration::hours(1),
                    "assigned_to": me["id"],
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let uri = format!(
            "/api/conflicts/detect?start={}&end={}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            (start + Duration::days(2)).to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let (status, report) = send(&app, Method::GET, &uri, token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["total_conflicts"], 1);
        assert_eq!(report["conflicts"][0]["type"], "time_overlap");
        assert_eq!(report["severity_breakdown"]["high"], 1);

        // Detection again does not store a duplicate
        send(&app, Method::GET, &uri, token, None).await;
        let (_, active) = send(&app, Method::GET, "/api/conflicts/active", token, None).await;
        assert_eq!(active.as_array().unwrap().len(), 1);
        let id = active[0]["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/conflicts/{}/resolve", id),
            token,
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, resolved) = send(
            &app,
            Method::POST,
            &format!("/api/conflicts/{}/resolve", id),
            token,
            Some(json!({"resolution": {"actions": ["moved piano"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], "resolved");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/conflicts/{}/acknowledge", id),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, stats) =
            send(&app, Method::GET, "/api/conflicts/stats?timeframe=month", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["resolution_rate"], 100.0);
    }

    #[tokio::test]
    async fn test_errors_and_advice() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, _) = send(&app, Method::GET, "/api/conflicts/42", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(&app, Method::GET, "/api/conflicts/stats?timeframe=decade", token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/conflicts/bulk-resolve",
            token,
            Some(json!({"conflict_ids": [], "resolution": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, bulk) = send(
            &app,
            Method::POST,
            "/api/conflicts/bulk-resolve",
            token,
            Some(json!({"conflict_ids": [7, 8], "resolution": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bulk["failed_resolutions"], 2);

        let (status, advice) = send(
            &app,
            Method::POST,
            "/api/conflicts/suggest-resolution",
            token,
            Some(json!({"conflict": {
                "severity": "critical",
                "resolution_suggestions": ["Call the sitter", "Ask grandma", "Reschedule"],
            }})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(advice["estimated_effort"], "high");
        assert_eq!(advice["recommended_action"], "Call the sitter");
        assert_eq!(advice["alternative_suggestions"], json!(["Reschedule"]));

        let (status, upcoming) =
            send(&app, Method::GET, "/api/conflicts/upcoming", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(upcoming["urgent_conflicts"], 0);
    }
}
