//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create an account and open a session
//! - POST /api/auth/login - Username (or email) and password login
//! - POST /api/auth/logout - Close the current session
//! - POST /api/auth/refresh - Swap the current session for a new one
//! - GET /api/auth/me - Current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateUserInput, User};
use crate::services::UserServiceError;

/// Request body for user registration
///
/// Fields default to empty so a missing field reaches validation and gets a 400.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Request body for user login
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/me", get(get_current_user))
}

fn session_cookie(token: &str, days: i64) -> HeaderMap {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token,
        days * 24 * 60 * 60
    );
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = CreateUserInput {
        username: body.username,
        email: body.email,
        password: body.password,
        full_name: body.full_name,
    };

    let (user, session) = state.user_service.register(input).await?;
    let headers = session_cookie(&session.id, state.user_service.session_expiration_days());

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/auth/login
///
/// Rate limited per client IP (10 per minute) and per username
/// (5 failures per 15 minutes).
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::validation_error("Username and password are required"));
    }

    if let Some(ip) = extract_ip_address(&headers).and_then(|s| s.parse().ok()) {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Login blocked by IP rate limit");
            return Err(ApiError::rate_limited("Too many requests, try again later", 60));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    let username = body.username.trim();
    if state.rate_limiter.is_username_limited(username).await {
        tracing::warn!(username, "Login blocked by username rate limit");
        return Err(ApiError::rate_limited(
            "Too many failed attempts, try again in 15 minutes",
            900,
        ));
    }

    let (user, session) = match state.user_service.login(username, &body.password).await {
        Ok(result) => result,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.rate_limiter.record_failed_attempt(username).await;
                tracing::info!(username, "Failed login attempt");
            }
            return Err(e.into());
        }
    };

    state.rate_limiter.clear_username_attempts(username).await;
    tracing::info!(user_id = user.id, "User logged in");

    let headers = session_cookie(&session.id, state.user_service.session_expiration_days());
    Ok((
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );

    Ok((
        response_headers,
        Json(serde_json::json!({ "message": "Logged out" })),
    ))
}

/// POST /api/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let session = state.user_service.refresh_session(&token, user.id).await?;
    let cookie = session_cookie(&session.id, state.user_service.session_expiration_days());

    Ok((cookie, Json(TokenResponse { token: session.id })))
}

/// GET /api/auth/me
async fn get_current_user(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}

/// Client address as reported by a reverse proxy
fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                return Some(ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, send, send_raw, test_app};
    use axum::http::Method;
    use serde_json::json;

    fn register_body(username: &str) -> serde_json::Value {
        json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "correct horse",
            "full_name": "Test Parent",
        })
    }

    #[test]
    fn test_extract_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(extract_ip_address(&headers), Some("10.0.0.1".to_string()));
    }

    #[tokio::test]
    async fn test_register_sets_cookie_and_hides_hash() {
        let (app, _) = test_app().await;
        let response =
            send_raw(&app, Method::POST, "/api/auth/register", None, Some(register_body("alice")))
                .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("Max-Age=604800"));

        let body = body_json(response).await;
        assert_eq!(body["user"]["username"], "alice");
        assert!(body["user"].get("password_hash").is_none());
        assert!(body["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input_and_duplicates() {
        let (app, _) = test_app().await;

        let (status, body) =
            send(&app, Method::POST, "/api/auth/register", None, Some(json!({"username": "bob"})))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) =
            send(&app, Method::POST, "/api/auth/register", None, Some(register_body("bob"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(&app, Method::POST, "/api/auth/register", None, Some(register_body("bob"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_login_me_refresh_logout() {
        let (app, _) = test_app().await;
        send(&app, Method::POST, "/api/auth/register", None, Some(register_body("carol"))).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "carol@example.com", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "carol");

        let (status, refreshed) =
            send(&app, Method::POST, "/api/auth/refresh", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let new_token = refreshed["token"].as_str().unwrap().to_string();
        assert_ne!(new_token, token);

        let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&new_token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&new_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited_after_failures() {
        let (app, _) = test_app().await;
        send(&app, Method::POST, "/api/auth/register", None, Some(register_body("dave"))).await;

        let wrong = json!({"username": "dave", "password": "wrong password"});
        for _ in 0..5 {
            let (status, body) =
                send(&app, Method::POST, "/api/auth/login", None, Some(wrong.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"]["message"], "Invalid credentials");
        }

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "dave", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["details"]["retry_after"], 900);
    }
}
