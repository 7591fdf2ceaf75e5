//! API middleware
//!
//! Contains:
//! - The shared application state handed to every handler
//! - The JSON error envelope and its mapping from service errors
//! - Session authentication (Bearer token or `session` cookie)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxAddressRepository, SqlxChecklistRepository, SqlxConflictRepository, SqlxEventRepository,
    SqlxFamilyMemberRepository, SqlxFamilyNoteRepository, SqlxMealLearningRepository,
    SqlxMealPlanRepository, SqlxNotificationRepository, SqlxPreparationTimelineRepository,
    SqlxSessionRepository, SqlxTaskRepository, SqlxTimelineRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    telegram_api, AddressService, ChecklistService, ConflictService, DashboardService,
    EmailService, EventService, FamilyNoteService, FamilyService, GoogleCalendarService,
    HandoffService, HttpCalendarApi, HttpPushGateway, LoginRateLimiter, MealChatService,
    MealLearningService, MealService, NotificationService, PushSender, RecurringEventService,
    ServiceError, TaskService, TelegramService, TimelineSuggestionService,
    TimelineTemplateService, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub event_service: Arc<EventService>,
    pub task_service: Arc<TaskService>,
    pub family_service: Arc<FamilyService>,
    pub meal_service: Arc<MealService>,
    pub meal_learning_service: Arc<MealLearningService>,
    pub meal_chat_service: Arc<MealChatService>,
    pub checklist_service: Arc<ChecklistService>,
    pub family_note_service: Arc<FamilyNoteService>,
    pub address_service: Arc<AddressService>,
    pub notification_service: Arc<NotificationService>,
    pub telegram_service: Arc<TelegramService>,
    pub google_service: Arc<GoogleCalendarService>,
    pub timeline_service: Arc<TimelineSuggestionService>,
    pub recurring_service: Arc<RecurringEventService>,
    pub conflict_service: Arc<ConflictService>,
    pub timeline_template_service: Arc<TimelineTemplateService>,
    pub dashboard_service: Arc<DashboardService>,
    pub handoff_service: Arc<HandoffService>,
}

impl AppState {
    /// Wire every repository and service over one pool
    pub fn new(pool: DynDatabasePool, config: &Config) -> anyhow::Result<Self> {
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let events = SqlxEventRepository::boxed(pool.clone());
        let tasks = SqlxTaskRepository::boxed(pool.clone());
        let family = SqlxFamilyMemberRepository::boxed(pool.clone());
        let plans = SqlxMealPlanRepository::boxed(pool.clone());
        let learning = SqlxMealLearningRepository::boxed(pool.clone());
        let checklists = SqlxChecklistRepository::boxed(pool.clone());
        let notes = SqlxFamilyNoteRepository::boxed(pool.clone());
        let addresses = SqlxAddressRepository::boxed(pool.clone());
        let notifications = SqlxNotificationRepository::boxed(pool.clone());
        let timeline = SqlxTimelineRepository::boxed(pool.clone());
        let conflicts = SqlxConflictRepository::boxed(pool.clone());
        let preparation = SqlxPreparationTimelineRepository::boxed(pool.clone());

        let telegram_api = telegram_api::from_config(&config.telegram)?;
        let push = PushSender::new(
            notifications.clone(),
            Arc::new(HttpPushGateway::new()?),
            config.push.clone(),
        );

        let user_service = UserService::new(users.clone(), sessions)
            .with_settings(config.auth.session_days, config.auth.allow_registration);

        let notification_service = NotificationService::new(
            notifications.clone(),
            users.clone(),
            events.clone(),
            tasks.clone(),
            telegram_api.clone(),
            push,
            EmailService::new(config.smtp.clone()),
        );

        let telegram_service = TelegramService::new(
            telegram_api,
            config.telegram.clone(),
            config.server.public_url.clone(),
            users.clone(),
            events.clone(),
            tasks.clone(),
            checklists.clone(),
            notifications.clone(),
        );

        let handoff_service = HandoffService::new(
            events.clone(),
            tasks.clone(),
            users.clone(),
            notifications,
        );
        let dashboard_service =
            DashboardService::new(events.clone(), tasks.clone(), users.clone(), conflicts.clone());
        let conflict_service = ConflictService::new(conflicts, events.clone(), users.clone());
        let timeline_template_service =
            TimelineTemplateService::new(checklists.clone(), preparation, events.clone());

        let google_service = GoogleCalendarService::new(
            Arc::new(HttpCalendarApi::new(config.google.clone())?),
            config.google.clone(),
            config.auth.state_secret.clone(),
            users,
            events.clone(),
        );

        Ok(Self {
            pool,
            user_service: Arc::new(user_service),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            recurring_service: Arc::new(RecurringEventService::new(events.clone())),
            event_service: Arc::new(EventService::new(events)),
            task_service: Arc::new(TaskService::new(tasks)),
            family_service: Arc::new(FamilyService::new(family.clone())),
            meal_service: Arc::new(MealService::new(plans.clone(), family.clone())),
            meal_learning_service: Arc::new(MealLearningService::new(
                learning.clone(),
                plans.clone(),
                family.clone(),
            )),
            meal_chat_service: Arc::new(MealChatService::new(
                &config.meal_chat,
                plans,
                learning,
                family,
            )),
            checklist_service: Arc::new(ChecklistService::new(checklists)),
            family_note_service: Arc::new(FamilyNoteService::new(notes)),
            address_service: Arc::new(AddressService::new(addresses)),
            notification_service: Arc::new(notification_service),
            telegram_service: Arc::new(telegram_service),
            google_service: Arc::new(google_service),
            timeline_service: Arc::new(TimelineSuggestionService::new(timeline)),
            conflict_service: Arc::new(conflict_service),
            timeline_template_service: Arc::new(timeline_template_service),
            dashboard_service: Arc::new(dashboard_service),
            handoff_service: Arc::new(handoff_service),
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Unavailable(msg) => ApiError::new("SERVICE_UNAVAILABLE", msg),
            ServiceError::InternalError(e) => {
                tracing::error!(error = %e, "Request failed");
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::RegistrationDisabled => ApiError::forbidden(err.to_string()),
            UserServiceError::InternalError(e) => {
                tracing::error!(error = %e, "Request failed");
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Extract session token from request headers
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await
        .map_err(|e| ApiError::internal_error(format!("Session validation failed: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, format!("theme=dark; session={}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(extract_session_token(request.headers()), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let request = create_request_with_cookie("test-token-456");
        assert_eq!(extract_session_token(request.headers()), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "session=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(request.headers()), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_invalid_bearer() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic invalid")
            .body(Body::empty())
            .unwrap();
        assert!(extract_session_token(request.headers()).is_none());
    }

    #[test]
    fn test_service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::not_found("Event"), StatusCode::NOT_FOUND),
            (ServiceError::validation("Title is required"), StatusCode::BAD_REQUEST),
            (ServiceError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (ServiceError::Conflict("done".into()), StatusCode::CONFLICT),
            (ServiceError::Unavailable("off".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::InternalError(anyhow::anyhow!("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(ServiceError::InternalError(anyhow::anyhow!("secret path")));
        assert_eq!(err.error.message, "Internal server error");
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = ApiError::rate_limited("Too many requests", 60);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error.details, Some(serde_json::json!({"retry_after": 60})));
    }
}
