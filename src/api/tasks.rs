//! Task endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateTaskInput, Task, TaskFilter, UpdateTaskInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/upcoming", get(upcoming_tasks))
        .route("/{id}", get(get_task).put(update_task).delete(delete_task))
        .route("/{id}/complete", post(complete_task))
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.task_service.list(&filter).await?))
}

async fn upcoming_tasks(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.task_service.upcoming(user.id).await?))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.task_service.get(id).await?))
}

async fn create_task(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateTaskInput>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.task_service.create(input, user.id).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateTaskInput>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.task_service.update(id, input).await?))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.task_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.task_service.complete(id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_task_create_complete_and_filter() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, task) = send(
            &app,
            Method::POST,
            "/api/tasks",
            token,
            Some(json!({"title": "Pack lunches", "priority": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["status"], "pending");
        let id = task["id"].as_i64().unwrap();

        let (status, done) =
            send(&app, Method::POST, &format!("/api/tasks/{}/complete", id), token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["status"], "completed");
        assert!(done["completed_at"].is_string());

        let (_, pending) = send(&app, Method::GET, "/api/tasks?status=pending", token, None).await;
        assert!(pending.as_array().unwrap().is_empty());
        let (_, completed) =
            send(&app, Method::GET, "/api/tasks?status=completed", token, None).await;
        assert_eq!(completed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_task_validation_and_missing() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/tasks",
            token,
            Some(json!({"title": "Too urgent", "priority": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::DELETE, "/api/tasks/999", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::PUT, "/api/tasks/999", token, Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
