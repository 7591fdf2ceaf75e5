//! Family notes board endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateFamilyNoteInput, FamilyNote, NoteStats, UpdateFamilyNoteInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notes).post(create_note))
        .route("/stats", get(note_stats))
        .route("/{id}", put(update_note).delete(delete_note))
        .route("/{id}/archive", put(archive_note))
}

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<NotesQuery>,
) -> Result<Json<Vec<FamilyNote>>, ApiError> {
    Ok(Json(
        state
            .family_note_service
            .list(query.status.as_deref(), query.limit)
            .await?,
    ))
}

async fn create_note(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateFamilyNoteInput>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.family_note_service.create(input, user.id).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn update_note(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateFamilyNoteInput>,
) -> Result<Json<FamilyNote>, ApiError> {
    Ok(Json(state.family_note_service.update(id, input, user.id).await?))
}

async fn archive_note(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.family_note_service.archive(id, user.id).await?;
    Ok(Json(serde_json::json!({ "message": "Note archived" })))
}

async fn delete_note(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.family_note_service.delete(id, user.id).await?;
    Ok(Json(serde_json::json!({ "message": "Note deleted" })))
}

async fn note_stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<NoteStats>, ApiError> {
    Ok(Json(state.family_note_service.stats(user.id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{register, send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_only_author_can_edit() {
        let (app, author) = signed_in_app().await;
        let other = register(&app, "sibling").await;

        let (status, note) = send(
            &app,
            Method::POST,
            "/api/family-notes",
            Some(&author),
            Some(json!({"content": "Dentist moved to Friday", "priority": "high"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/family-notes/{}", note["id"]);

        let (status, _) =
            send(&app, Method::PUT, &uri, Some(&other), Some(json!({"content": "hijack"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::PUT, &uri, Some(&author), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, stats) =
            send(&app, Method::GET, "/api/family-notes/stats", Some(&author), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["high_priority"], 1);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&author), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, notes) = send(&app, Method::GET, "/api/family-notes", Some(&author), None).await;
        assert!(notes.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_note_is_not_found() {
        let (app, token) = signed_in_app().await;
        let (status, _) =
            send(&app, Method::PUT, "/api/family-notes/77/archive", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
