//! Itineraries - Family coordination server

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use itineraries::{
    api::{self, AppState},
    config::Config,
    db,
    services::{standard_jobs, JobServices},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "itineraries=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Itineraries...");

    // Load configuration (file, then ITINERARIES_* overrides)
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!(url = %config.database.url, "Database connected");

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Build application state
    let state = AppState::new(pool, &config)?;

    if !config.telegram.is_configured() {
        tracing::warn!("Telegram bot token not set, Telegram messages will only be logged");
    }
    if !config.google.is_configured() {
        tracing::warn!("Google OAuth credentials not set, calendar sync disabled");
    }

    // Background jobs
    if config.scheduler.enabled {
        let scheduler = standard_jobs(
            &config.scheduler,
            JobServices {
                notifications: state.notification_service.clone(),
                telegram: state.telegram_service.clone(),
                google: state.google_service.clone(),
                users: state.user_service.clone(),
                rate_limiter: state.rate_limiter.clone(),
                recurring: state.recurring_service.clone(),
                conflicts: state.conflict_service.clone(),
            },
        )?;
        tracing::info!(jobs = ?scheduler.job_names(), "Scheduler started");
        scheduler.spawn();
    } else {
        tracing::info!("Scheduler disabled");
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
