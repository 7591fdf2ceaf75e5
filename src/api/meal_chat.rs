//! Conversational meal planning endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::meal_chat::{ChatReply, Conversation};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/{id}", get(get_conversation).delete(delete_conversation))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
}

async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    Ok(Json(
        state
            .meal_chat_service
            .send(&body.message, body.conversation_id.as_deref())
            .await?,
    ))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.meal_chat_service.get(&id).await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.meal_chat_service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_chat_conversation_lifecycle() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, reply) = send(
            &app,
            Method::POST,
            "/api/meal-chat",
            token,
            Some(json!({"message": "Help me plan the week", "conversation_id": "kitchen-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["conversation_id"], "kitchen-1");
        assert_eq!(reply["intent"], "plan_week");

        let (status, conversation) =
            send(&app, Method::GET, "/api/meal-chat/kitchen-1", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(conversation["messages"].as_array().unwrap().len(), 2);

        let (status, _) = send(&app, Method::DELETE, "/api/meal-chat/kitchen-1", token, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, "/api/meal-chat/kitchen-1", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_requires_message() {
        let (app, token) = signed_in_app().await;
        let (status, _) =
            send(&app, Method::POST, "/api/meal-chat", Some(&token), Some(json!({"message": "  "})))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
