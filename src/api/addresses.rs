//! Saved address endpoints, scoped to the current user

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Address, AddressType, CreateAddressInput, UpdateAddressInput};
use crate::services::address::BatchReport;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addresses).post(create_address))
        .route("/primary", get(primary_addresses))
        .route("/batch", post(batch_addresses))
        .route(
            "/{id}",
            get(get_address).put(update_address).delete(delete_address),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BatchRequest {
    pub addresses: Vec<CreateAddressInput>,
}

async fn list_addresses(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(state.address_service.list(user.id).await?))
}

async fn primary_addresses(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<HashMap<AddressType, Address>>, ApiError> {
    Ok(Json(state.address_service.primary(user.id).await?))
}

async fn get_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Address>, ApiError> {
    Ok(Json(state.address_service.get(user.id, id).await?))
}

async fn create_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state.address_service.create(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateAddressInput>,
) -> Result<Json<Address>, ApiError> {
    Ok(Json(state.address_service.update(user.id, id, input).await?))
}

async fn delete_address(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.address_service.delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn batch_addresses(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<BatchRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    Ok(Json(state.address_service.batch(user.id, body.addresses).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_duplicate_label_and_primary_map() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let home = json!({"label": "Home", "address": "1 Elm St", "type": "home", "is_primary": true});

        let (status, _) = send(&app, Method::POST, "/api/addresses", token, Some(home.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::POST, "/api/addresses", token, Some(home)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "An address with this label already exists");

        let (status, primary) = send(&app, Method::GET, "/api/addresses/primary", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(primary["home"]["label"], "Home");
    }

    #[tokio::test]
    async fn test_batch_reports_per_index() {
        let (app, token) = signed_in_app().await;
        let (status, report) = send(
            &app,
            Method::POST,
            "/api/addresses/batch",
            Some(&token),
            Some(json!({"addresses": [
                {"label": "School", "address": "9 Oak Ave", "type": "school"},
                {"label": "", "address": "nowhere"},
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["results"][0]["action"], "created");
        assert_eq!(report["errors"][0]["index"], 1);
    }
}
