//! Family member endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreateFamilyMemberInput, FamilyMember, UpdateFamilyMemberInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/members", get(list_members).post(create_member))
        .route("/members/{id}", put(update_member).delete(delete_member))
}

async fn list_members(State(state): State<AppState>) -> Result<Json<Vec<FamilyMember>>, ApiError> {
    Ok(Json(state.family_service.list().await?))
}

async fn create_member(
    State(state): State<AppState>,
    Json(input): Json<CreateFamilyMemberInput>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state.family_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateFamilyMemberInput>,
) -> Result<Json<FamilyMember>, ApiError> {
    Ok(Json(state.family_service.update(id, input).await?))
}

async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.family_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
