//! Checklist template and instance endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    ChecklistInstance, ChecklistTemplate, CreateChecklistInstanceInput,
    CreateChecklistTemplateInput,
};

/// Routes under `/checklists`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/category/{category}", get(list_category))
        .route("/templates/{id}", get(get_template))
        .route("/templates/{id}/use", post(use_template))
        .route("/instances", post(create_instance))
        .route("/instances/active", get(active_instances))
        .route("/instances/{id}", get(get_instance).delete(delete_instance))
        .route("/instances/{id}/check", put(check_item))
        .route("/instances/{id}/items", post(add_item))
}

/// `/checklist-templates`, ordered by popularity
pub fn popular_router() -> Router<AppState> {
    Router::new().route("/", get(popular_templates))
}

#[derive(Debug, Deserialize)]
pub struct CheckItemRequest {
    pub item_id: String,
    pub checked: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddItemRequest {
    pub text: String,
}

async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChecklistTemplate>>, ApiError> {
    Ok(Json(state.checklist_service.list_templates(None).await?))
}

async fn list_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<ChecklistTemplate>>, ApiError> {
    Ok(Json(state.checklist_service.list_templates(Some(&category)).await?))
}

async fn popular_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChecklistTemplate>>, ApiError> {
    Ok(Json(state.checklist_service.popular_templates().await?))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChecklistTemplate>, ApiError> {
    Ok(Json(state.checklist_service.get_template(id).await?))
}

async fn create_template(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateChecklistTemplateInput>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state.checklist_service.create_template(input, user.id).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn use_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.checklist_service.use_template(id).await?;
    Ok(Json(serde_json::json!({ "message": "Template usage recorded" })))
}

async fn create_instance(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateChecklistInstanceInput>,
) -> Result<impl IntoResponse, ApiError> {
    let instance = state.checklist_service.create_instance(input, user.id).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn active_instances(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChecklistInstance>>, ApiError> {
    Ok(Json(state.checklist_service.active_instances().await?))
}

async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChecklistInstance>, ApiError> {
    Ok(Json(state.checklist_service.get_instance(id).await?))
}

async fn check_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CheckItemRequest>,
) -> Result<Json<ChecklistInstance>, ApiError> {
    Ok(Json(
        state
            .checklist_service
            .check_item(id, &body.item_id, body.checked)
            .await?,
    ))
}

async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<ChecklistInstance>, ApiError> {
    Ok(Json(state.checklist_service.add_item(id, &body.text).await?))
}

async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.checklist_service.delete_instance(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_instance_from_template_completes() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, template) = send(
            &app,
            Method::POST,
            "/api/checklists/templates",
            token,
            Some(json!({
                "name": "Beach day",
                "category": "outings",
                "items": ["Sunscreen", "Towels"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let template_id = template["id"].as_i64().unwrap();

        let (status, instance) = send(
            &app,
            Method::POST,
            "/api/checklists/instances",
            token,
            Some(json!({"template_id": template_id, "title": "Saturday beach"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = instance["id"].as_i64().unwrap();
        let items = instance["items"].as_array().unwrap().clone();
        assert_eq!(items.len(), 2);

        let mut last = serde_json::Value::Null;
        for item in &items {
            let (status, body) = send(
                &app,
                Method::PUT,
                &format!("/api/checklists/instances/{}/check", id),
                token,
                Some(json!({"item_id": item["id"], "checked": true})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            last = body;
        }
        assert_eq!(last["status"], "completed");
        assert_eq!(last["completion_percentage"], 100.0);

        let (_, popular) = send(&app, Method::GET, "/api/checklist-templates", token, None).await;
        assert_eq!(popular[0]["usage_count"], 1);
    }

    #[tokio::test]
    async fn test_missing_template_and_item() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/checklists/instances",
            token,
            Some(json!({"template_id": 404, "title": "Nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, instance) = send(
            &app,
            Method::POST,
            "/api/checklists/instances",
            token,
            Some(json!({"title": "Errands", "custom_items": ["Bank"]})),
        )
        .await;
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/checklists/instances/{}/check", instance["id"]),
            token,
            Some(json!({"item_id": "missing", "checked": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
