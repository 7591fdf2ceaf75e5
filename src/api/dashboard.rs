//! Dashboard endpoints
//!
//! - GET /api/dashboard/summary
//! - GET /api/dashboard/personal/{user_id}
//! - GET /api/dashboard/family-workload

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::services::dashboard::{DashboardSummary, FamilyWorkload, PersonalDashboard};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/personal/{user_id}", get(personal))
        .route("/family-workload", get(family_workload))
}

async fn summary(State(state): State<AppState>) -> Result<Json<DashboardSummary>, ApiError> {
    Ok(Json(state.dashboard_service.summary().await?))
}

async fn personal(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<PersonalDashboard>, ApiError> {
    Ok(Json(state.dashboard_service.personal(user_id).await?))
}

async fn family_workload(State(state): State<AppState>) -> Result<Json<FamilyWorkload>, ApiError> {
    Ok(Json(state.dashboard_service.family_workload().await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_dashboard_views() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let (_, me) = send(&app, Method::GET, "/api/auth/me", token, None).await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/tasks",
            token,
            Some(json!({"title": "Book dentist", "assigned_to": me["id"], "priority": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, summary) = send(&app, Method::GET, "/api/dashboard/summary", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["tasks"]["active"], 1);
        assert_eq!(summary["tasks"]["high_priority"], 1);
        assert_eq!(summary["family_activity"][0]["active_tasks"], 1);

        let (status, personal) = send(
            &app,
            Method::GET,
            &format!("/api/dashboard/personal/{}", me["id"]),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(personal["statistics"]["pending_tasks"], 1);
        assert_eq!(personal["priority_breakdown"]["high"], 1);

        let (status, _) =
            send(&app, Method::GET, "/api/dashboard/personal/999", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, workload) =
            send(&app, Method::GET, "/api/dashboard/family-workload", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(workload["members"][0]["availability_status"], "available");
        assert_eq!(workload["balance"]["is_balanced"], true);
        assert_eq!(workload["summary"]["total_active_tasks"], 1);
    }
}
