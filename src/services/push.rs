//! Web push delivery
//!
//! Payloads are POSTed as JSON to every active subscription endpoint of a
//! user. Endpoints answering 404 or 410 are gone and get deactivated.

use crate::config::PushConfig;
use crate::db::repositories::NotificationRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The endpoint no longer exists
    Expired,
    Failed(String),
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: &Value, ttl_seconds: u64) -> Result<PushOutcome>;
}

pub struct HttpPushGateway {
    client: reqwest::Client,
}

impl HttpPushGateway {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Itineraries")
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn deliver(&self, endpoint: &str, payload: &Value, ttl_seconds: u64) -> Result<PushOutcome> {
        let response = self
            .client
            .post(endpoint)
            .header("TTL", ttl_seconds.to_string())
            .json(payload)
            .send()
            .await
            .context("Failed to reach push endpoint")?;

        let status = response.status();
        Ok(match status.as_u16() {
            404 | 410 => PushOutcome::Expired,
            _ if status.is_success() => PushOutcome::Delivered,
            _ => PushOutcome::Failed(format!("Push endpoint returned {}", status)),
        })
    }
}

pub struct PushSender {
    repo: Arc<dyn NotificationRepository>,
    gateway: Arc<dyn PushGateway>,
    config: PushConfig,
}

impl PushSender {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        gateway: Arc<dyn PushGateway>,
        config: PushConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            config,
        }
    }

    /// Deliver to every active subscription; true when at least one accepted it
    pub async fn send(&self, user_id: i64, payload: &Value) -> Result<bool> {
        let subscriptions = self.repo.list_active_subscriptions(user_id).await?;
        if subscriptions.is_empty() {
            tracing::debug!(user_id, "No push subscriptions");
            return Ok(false);
        }
        if !self.config.enabled {
            tracing::info!(
                user_id,
                subscriptions = subscriptions.len(),
                title = payload["title"].as_str().unwrap_or_default(),
                "Push disabled, notification not sent"
            );
            return Ok(false);
        }

        let mut delivered = false;
        for subscription in subscriptions {
            match self
                .gateway
                .deliver(&subscription.endpoint, payload, self.config.ttl_seconds)
                .await
            {
                Ok(PushOutcome::Delivered) => delivered = true,
                Ok(PushOutcome::Expired) => {
                    tracing::info!(subscription_id = subscription.id, "Push subscription expired");
                    self.repo.deactivate_subscription_by_id(subscription.id).await?;
                }
                Ok(PushOutcome::Failed(reason)) => {
                    tracing::warn!(subscription_id = subscription.id, %reason, "Push delivery failed");
                }
                Err(e) => {
                    tracing::warn!(subscription_id = subscription.id, error = %e, "Push delivery failed");
                }
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxNotificationRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers from a fixed table keyed by endpoint; unknown endpoints are delivered
    #[derive(Default)]
    pub(crate) struct FakeGateway {
        pub expired: Vec<String>,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushGateway for FakeGateway {
        async fn deliver(&self, endpoint: &str, _payload: &Value, _ttl: u64) -> Result<PushOutcome> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            if self.expired.iter().any(|e| e == endpoint) {
                Ok(PushOutcome::Expired)
            } else {
                Ok(PushOutcome::Delivered)
            }
        }
    }

    async fn setup(enabled: bool, gateway: Arc<FakeGateway>) -> (PushSender, Arc<dyn NotificationRepository>, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&new_user("pusher"))
            .await
            .unwrap();
        let repo = SqlxNotificationRepository::boxed(pool);
        let config = PushConfig {
            enabled,
            ..Default::default()
        };
        (PushSender::new(repo.clone(), gateway, config), repo, user.id)
    }

    #[tokio::test]
    async fn test_expired_subscription_is_deactivated() {
        let gateway = Arc::new(FakeGateway {
            expired: vec!["https://push.example/gone".to_string()],
            ..Default::default()
        });
        let (sender, repo, user) = setup(true, gateway.clone()).await;
        for endpoint in ["https://push.example/live", "https://push.example/gone"] {
            repo.upsert_subscription(user, endpoint, &json!({"endpoint": endpoint}), None)
                .await
                .unwrap();
        }

        assert!(sender.send(user, &json!({"title": "Hi"})).await.unwrap());
        assert_eq!(gateway.calls.lock().unwrap().len(), 2);

        let remaining = repo.list_active_subscriptions(user).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].endpoint, "https://push.example/live");
    }

    #[tokio::test]
    async fn test_disabled_push_does_not_call_gateway() {
        let gateway = Arc::new(FakeGateway::default());
        let (sender, repo, user) = setup(false, gateway.clone()).await;
        repo.upsert_subscription(user, "https://push.example/a", &json!({}), None)
            .await
            .unwrap();

        assert!(!sender.send(user, &json!({"title": "Hi"})).await.unwrap());
        assert!(gateway.calls.lock().unwrap().is_empty());
    }
}
