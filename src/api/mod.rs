//! API layer - HTTP handlers and routing
//!
//! Everything is mounted under `/api`. Public routes:
//! - auth login and registration
//! - health check
//! - Telegram webhook (checked against the webhook secret)
//! - Google OAuth callback (checked against the signed state)
//!
//! Every other route goes through [`middleware::require_auth`].

pub mod addresses;
pub mod auth;
pub mod checklists;
pub mod conflicts;
pub mod dashboard;
pub mod events;
pub mod family;
pub mod family_notes;
pub mod google;
pub mod handoffs;
pub mod health;
pub mod meal_chat;
pub mod meals;
pub mod middleware;
pub mod notifications;
pub mod recurring_events;
pub mod tasks;
pub mod telegram;
pub mod timeline_suggestions;
pub mod timeline_templates;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/calendar/events", events::router())
        .nest("/calendar/recurring", recurring_events::router())
        .nest("/tasks", tasks::router())
        .nest("/family", family::router())
        .nest("/meals", meals::router())
        .nest("/meal-chat", meal_chat::router())
        .nest("/checklists", checklists::router())
        .nest("/checklist-templates", checklists::popular_router())
        .nest("/family-notes", family_notes::router())
        .nest("/addresses", addresses::router())
        .nest("/notifications", notifications::router())
        .nest("/telegram", telegram::protected_router())
        .nest("/google", google::protected_router())
        .nest("/timeline-suggestions", timeline_suggestions::router())
        .nest("/timeline-templates", timeline_templates::router())
        .nest("/conflicts", conflicts::router())
        .nest("/dashboard", dashboard::router())
        .nest("/handoffs", handoffs::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(health::router())
        .nest("/auth", auth::public_router())
        .nest("/telegram", telegram::public_router())
        .nest("/google", google::public_router())
        .merge(protected_routes)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origin = cors_origin.parse::<HeaderValue>().unwrap_or_else(|_| {
        tracing::warn!(cors_origin, "Invalid CORS origin, falling back to localhost");
        HeaderValue::from_static("http://localhost:3000")
    });

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations};
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Router over a fresh in-memory database with default config
    pub async fn test_app() -> (Router, AppState) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, &Config::default()).expect("Failed to build state");
        (build_router(state.clone(), "http://localhost:3000"), state)
    }

    /// Router plus the session token of a freshly registered user
    pub async fn signed_in_app() -> (Router, String) {
        let (app, _) = test_app().await;
        let token = register(&app, "parent").await;
        (app, token)
    }

    /// Register `username` and return its session token
    pub async fn register(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "family-password",
                "full_name": username,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "registration failed: {}", body);
        body["token"].as_str().expect("token").to_string()
    }

    pub async fn send_raw(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        }
    }

    /// Send a request and decode the JSON response
    pub async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = send_raw(app, method, uri, token, body).await;
        let status = response.status();
        (status, body_json(response).await)
    }
}
