//! Telegram bot endpoints
//!
//! The webhook is public and authenticated by the secret token header.
//! Per-user routes carry the user id in the path and only accept the
//! current user's own id.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::TelegramSettings;
use crate::services::telegram::{
    BotInfo, LinkingCode, TelegramSettingsInput, TelegramStatus, Update,
};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn public_router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/link/{user_id}", post(link))
        .route("/unlink/{user_id}", delete(unlink))
        .route("/status/{user_id}", get(status))
        .route("/settings/{user_id}", put(update_settings))
        .route("/test/{user_id}", post(send_test))
        .route("/send/{user_id}", post(send_message))
        .route("/linking-code/{user_id}", get(linking_code))
        .route("/info", get(info))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LinkRequest {
    pub linking_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendRequest {
    pub message: Option<String>,
}

fn ensure_self(user: &AuthenticatedUser, user_id: i64) -> Result<(), ApiError> {
    if user.0.id != user_id {
        return Err(ApiError::forbidden("Access denied"));
    }
    Ok(())
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<Json<Value>, ApiError> {
    let secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !state.telegram_service.verify_webhook_secret(secret) {
        tracing::warn!("Rejected Telegram webhook with a bad secret token");
        return Err(ApiError::unauthorized("Invalid webhook secret"));
    }

    if let Err(e) = state.telegram_service.handle_update(&update).await {
        tracing::error!(error = %e, "Failed to handle Telegram update");
    }
    Ok(Json(json!({ "ok": true })))
}

async fn link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
    Json(body): Json<LinkRequest>,
) -> Result<Json<Value>, ApiError> {
    ensure_self(&user, user_id)?;
    let code = state
        .telegram_service
        .link(user_id, body.linking_code.as_deref())
        .await?;
    Ok(Json(json!({
        "message": "Telegram account linked",
        "linking_code": code,
    })))
}

async fn unlink(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    ensure_self(&user, user_id)?;
    state.telegram_service.unlink(user_id).await?;
    Ok(Json(json!({ "message": "Telegram account unlinked" })))
}

async fn status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Json<TelegramStatus>, ApiError> {
    ensure_self(&user, user_id)?;
    Ok(Json(state.telegram_service.status(user_id).await?))
}

async fn update_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
    Json(input): Json<TelegramSettingsInput>,
) -> Result<Json<TelegramSettings>, ApiError> {
    ensure_self(&user, user_id)?;
    Ok(Json(state.telegram_service.update_settings(user_id, input).await?))
}

async fn send_test(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    ensure_self(&user, user_id)?;
    let message_id = state.telegram_service.send_test(user_id).await?;
    Ok(Json(json!({ "message": "Test message sent", "message_id": message_id })))
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
    Json(body): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    ensure_self(&user, user_id)?;
    let message_id = state
        .telegram_service
        .send_custom(user_id, body.message.as_deref())
        .await?;
    Ok(Json(json!({ "message": "Message sent", "message_id": message_id })))
}

async fn linking_code(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Json<LinkingCode>, ApiError> {
    ensure_self(&user, user_id)?;
    Ok(Json(state.telegram_service.linking_code_for(user_id).await?))
}

async fn info(State(state): State<AppState>) -> Result<Json<BotInfo>, ApiError> {
    Ok(Json(state.telegram_service.info().await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    async fn my_id(app: &axum::Router, token: &str) -> i64 {
        let (_, me) = send(app, Method::GET, "/api/auth/me", Some(token), None).await;
        me["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_other_users_are_forbidden() {
        let (app, token) = signed_in_app().await;
        let id = my_id(&app, &token).await;

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/telegram/status/{}", id + 1),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_link_status_and_settings() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());
        let id = my_id(&app, token.unwrap()).await;

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/telegram/link/{}", id),
            token,
            Some(json!({"linking_code": "ABC"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/telegram/link/{}", id),
            token,
            Some(json!({"linking_code": "TG123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, state) =
            send(&app, Method::GET, &format!("/api/telegram/status/{}", id), token, None).await;
        assert_eq!(state["telegram_id"], "123456");
        assert_eq!(state["has_chat_connection"], false);
        assert_eq!(state["linked"], false);

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/telegram/settings/{}", id),
            token,
            Some(json!({"notifications_enabled": true, "reminder_minutes": 500})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, Method::POST, &format!("/api/telegram/test/{}", id), token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_is_public_and_answers_ok() {
        let (app, _) = signed_in_app().await;
        let update = json!({
            "message": {
                "chat": {"id": 42},
                "from": {"id": 987654321, "first_name": "Sam"},
                "text": "/help",
            }
        });
        let (status, body) =
            send(&app, Method::POST, "/api/telegram/webhook", None, Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, info) = send(&app, Method::GET, "/api/telegram/info", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(info["error"].is_object());
    }
}
