//! Notification log, preferences and push subscription repository

use crate::db::DynDatabasePool;
use crate::models::{
    local_day_bounds, Notification, NotificationPreferences, NotificationStats, PushSubscription,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

use super::family_member::json_object;

/// A notification row about to be logged
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub user_id: i64,
    pub notification_type: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub data: &'a Value,
    pub sent_via: Option<&'a str>,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &NewNotification<'_>) -> Result<i64>;

    async fn list(&self, user_id: i64, limit: i64, unread_only: bool)
        -> Result<Vec<Notification>>;

    /// Returns false when the notification is missing or already read
    async fn mark_read(&self, user_id: i64, id: i64) -> Result<bool>;

    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;

    async fn stats(&self, user_id: i64) -> Result<NotificationStats>;

    /// Whether a notification of this type whose `data[key]` equals `value`
    /// was logged for the user since `since`
    async fn exists_for(
        &self,
        user_id: i64,
        notification_type: &str,
        key: &str,
        value: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Rows delivered through `channel` since `since`
    async fn count_sent_via(&self, channel: &str, since: DateTime<Utc>) -> Result<i64>;

    /// Rows of one type created since `since`, optionally narrowed to a
    /// recipient and to a `data[key] = value` match
    async fn count_of_type(
        &self,
        notification_type: &str,
        user_id: Option<i64>,
        data_match: Option<(&str, i64)>,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Stored preferences, creating the default row on first read
    async fn get_preferences(&self, user_id: i64) -> Result<NotificationPreferences>;

    async fn save_preferences(&self, prefs: &NotificationPreferences) -> Result<()>;

    /// Insert or reactivate the subscription for `(user, endpoint)`
    async fn upsert_subscription(
        &self,
        user_id: i64,
        endpoint: &str,
        subscription_data: &Value,
        user_agent: Option<&str>,
    ) -> Result<PushSubscription>;

    /// Returns false when no subscription matched
    async fn deactivate_subscription(&self, user_id: i64, endpoint: &str) -> Result<bool>;

    async fn deactivate_subscription_by_id(&self, id: i64) -> Result<()>;

    async fn list_active_subscriptions(&self, user_id: i64) -> Result<Vec<PushSubscription>>;
}

pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_subscription(&self, user_id: i64, endpoint: &str) -> Result<PushSubscription> {
        let row = sqlx::query("SELECT * FROM push_subscriptions WHERE user_id = ? AND endpoint = ?")
            .bind(user_id)
            .bind(endpoint)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to reload push subscription")?;
        Ok(row_to_subscription(&row))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn insert(&self, n: &NewNotification<'_>) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, type, title, message, data, sent_via, sent_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(n.user_id)
        .bind(n.notification_type)
        .bind(n.title)
        .bind(n.message)
        .bind(n.data.to_string())
        .bind(n.sent_via)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to log notification")?;

        Ok(result.last_insert_rowid())
    }

    async fn list(
        &self,
        user_id: i64,
        limit: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let mut sql = String::from("SELECT * FROM notifications WHERE user_id = ?");
        if unread_only {
            sql.push_str(" AND read_at IS NULL");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list notifications")?;

        Ok(rows.iter().map(row_to_notification).collect())
    }

    async fn mark_read(&self, user_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = ? WHERE id = ? AND user_id = ? AND read_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to mark notification read")?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let result =
            sqlx::query("UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL")
                .bind(Utc::now())
                .bind(user_id)
                .execute(self.pool.sqlite())
                .await
                .context("Failed to mark notifications read")?;

        Ok(result.rows_affected())
    }

    async fn stats(&self, user_id: i64) -> Result<NotificationStats> {
        let (today_start, _) = local_day_bounds(Local::now().date_naive());
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN read_at IS NULL THEN 1 ELSE 0 END), 0) AS unread,
                COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0) AS today
            FROM notifications
            WHERE user_id = ?
            "#,
        )
        .bind(today_start)
        .bind(user_id)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to compute notification stats")?;

        Ok(NotificationStats {
            total: row.get("total"),
            unread: row.get("unread"),
            today: row.get("today"),
        })
    }

    async fn exists_for(
        &self,
        user_id: i64,
        notification_type: &str,
        key: &str,
        value: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id = ? AND type = ? AND json_extract(data, ?) = ?",
        );
        if since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(user_id)
            .bind(notification_type)
            .bind(format!("$.{}", key))
            .bind(value);
        if let Some(since) = since {
            query = query.bind(since);
        }
        let count = query
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to look up earlier notifications")?;

        Ok(count > 0)
    }

    async fn count_sent_via(&self, channel: &str, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE sent_via LIKE ? AND created_at > ?",
        )
        .bind(format!("%{}%", channel))
        .bind(since)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to count sent notifications")?;

        Ok(count)
    }

    async fn count_of_type(
        &self,
        notification_type: &str,
        user_id: Option<i64>,
        data_match: Option<(&str, i64)>,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM notifications WHERE type = ? AND created_at > ?");
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if data_match.is_some() {
            sql.push_str(" AND json_extract(data, ?) = ?");
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(notification_type)
            .bind(since);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        if let Some((key, value)) = data_match {
            query = query.bind(format!("$.{}", key)).bind(value);
        }

        Ok(query
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count notifications")?)
    }

    async fn get_preferences(&self, user_id: i64) -> Result<NotificationPreferences> {
        let row = sqlx::query("SELECT * FROM notification_preferences WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get notification preferences")?;

        if let Some(row) = row {
            return Ok(row_to_preferences(&row));
        }

        let defaults = NotificationPreferences::defaults(user_id);
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO notification_preferences
                (user_id, channel_settings, time_preferences, priority_thresholds,
                 quiet_hours, notification_types, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(defaults.channel_settings.to_string())
        .bind(defaults.time_preferences.to_string())
        .bind(defaults.priority_thresholds.to_string())
        .bind(defaults.quiet_hours.to_string())
        .bind(defaults.notification_types.to_string())
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create default notification preferences")?;

        Ok(defaults)
    }

    async fn save_preferences(&self, prefs: &NotificationPreferences) -> Result<()> {
        // Make sure the row exists before overwriting it.
        self.get_preferences(prefs.user_id).await?;

        sqlx::query(
            r#"
            UPDATE notification_preferences
            SET channel_settings = ?, time_preferences = ?, priority_thresholds = ?,
                quiet_hours = ?, notification_types = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(prefs.channel_settings.to_string())
        .bind(prefs.time_preferences.to_string())
        .bind(prefs.priority_thresholds.to_string())
        .bind(prefs.quiet_hours.to_string())
        .bind(prefs.notification_types.to_string())
        .bind(Utc::now())
        .bind(prefs.user_id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update notification preferences")?;
        Ok(())
    }

    async fn upsert_subscription(
        &self,
        user_id: i64,
        endpoint: &str,
        subscription_data: &Value,
        user_agent: Option<&str>,
    ) -> Result<PushSubscription> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO push_subscriptions (user_id, subscription_data, endpoint, user_agent,
                                            active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT (user_id, endpoint) DO UPDATE SET
                subscription_data = excluded.subscription_data,
                user_agent = excluded.user_agent,
                active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(subscription_data.to_string())
        .bind(endpoint)
        .bind(user_agent)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save push subscription")?;

        self.get_subscription(user_id, endpoint).await
    }

    async fn deactivate_subscription(&self, user_id: i64, endpoint: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE push_subscriptions SET active = 0, updated_at = ? WHERE user_id = ? AND endpoint = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(endpoint)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to deactivate push subscription")?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_subscription_by_id(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE push_subscriptions SET active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to deactivate push subscription")?;
        Ok(())
    }

    async fn list_active_subscriptions(&self, user_id: i64) -> Result<Vec<PushSubscription>> {
        let rows = sqlx::query(
            "SELECT * FROM push_subscriptions WHERE user_id = ? AND active = 1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list push subscriptions")?;

        Ok(rows.iter().map(row_to_subscription).collect())
    }
}

fn row_to_notification(row: &SqliteRow) -> Notification {
    let data: String = row.get("data");

    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        notification_type: row.get("type"),
        title: row.get("title"),
        message: row.get("message"),
        data: json_object(&data),
        sent_via: row.get("sent_via"),
        sent_at: row.get("sent_at"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    }
}

fn row_to_preferences(row: &SqliteRow) -> NotificationPreferences {
    let column = |name: &str| -> Value {
        let raw: String = row.get(name);
        json_object(&raw)
    };

    NotificationPreferences {
        user_id: row.get("user_id"),
        channel_settings: column("channel_settings"),
        time_preferences: column("time_preferences"),
        priority_thresholds: column("priority_thresholds"),
        quiet_hours: column("quiet_hours"),
        notification_types: column("notification_types"),
    }
}

fn row_to_subscription(row: &SqliteRow) -> PushSubscription {
    let data: String = row.get("subscription_data");

    PushSubscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subscription_data: json_object(&data),
        endpoint: row.get("endpoint"),
        user_agent: row.get("user_agent"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;
    use serde_json::json;

    async fn setup_test_repo() -> (SqlxNotificationRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&new_user("alice"))
            .await
            .unwrap();
        (SqlxNotificationRepository::new(pool), user.id)
    }

    async fn log(repo: &SqlxNotificationRepository, user_id: i64, kind: &str, data: Value) -> i64 {
        repo.insert(&NewNotification {
            user_id,
            notification_type: kind,
            title: "Title",
            message: "Body",
            data: &data,
            sent_via: Some("telegram"),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_state_and_stats() {
        let (repo, user) = setup_test_repo().await;
        let first = log(&repo, user, "test", json!({})).await;
        log(&repo, user, "test", json!({})).await;

        assert!(repo.mark_read(user, first).await.unwrap());
        assert!(!repo.mark_read(user, first).await.unwrap());
        assert_eq!(repo.list(user, 50, true).await.unwrap().len(), 1);

        let stats = repo.stats(user).await.unwrap();
        assert_eq!(stats, NotificationStats { total: 2, unread: 1, today: 2 });

        assert_eq!(repo.mark_all_read(user).await.unwrap(), 1);
        assert!(repo.list(user, 50, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exists_for_matches_data_key() {
        let (repo, user) = setup_test_repo().await;
        log(&repo, user, "event_reminder", json!({"event_id": 7})).await;

        assert!(repo.exists_for(user, "event_reminder", "event_id", 7, None).await.unwrap());
        assert!(!repo.exists_for(user, "event_reminder", "event_id", 8, None).await.unwrap());
        assert!(!repo.exists_for(user, "task_reminder", "event_id", 7, None).await.unwrap());
        let later = Utc::now() + Duration::minutes(1);
        assert!(!repo
            .exists_for(user, "event_reminder", "event_id", 7, Some(later))
            .await
            .unwrap());

        let since = Utc::now() - Duration::hours(24);
        assert_eq!(repo.count_sent_via("telegram", since).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_of_type_filters() {
        let (repo, user) = setup_test_repo().await;
        log(&repo, user, "event_handoff", json!({"from_user_id": 4})).await;
        log(&repo, user, "event_handoff", json!({"from_user_id": 5})).await;
        log(&repo, user, "task_handoff", json!({"from_user_id": 4})).await;

        let since = Utc::now() - Duration::days(7);
        assert_eq!(repo.count_of_type("event_handoff", None, None, since).await.unwrap(), 2);
        assert_eq!(
            repo.count_of_type("event_handoff", None, Some(("from_user_id", 4)), since)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            repo.count_of_type("event_handoff", Some(user + 1), None, since).await.unwrap(),
            0
        );
        let later = Utc::now() + Duration::minutes(1);
        assert_eq!(repo.count_of_type("event_handoff", Some(user), None, later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_preferences_created_on_first_read() {
        let (repo, user) = setup_test_repo().await;
        let mut prefs = repo.get_preferences(user).await.unwrap();
        assert_eq!(prefs, NotificationPreferences::defaults(user));

        prefs.channel_settings = json!({"push": false});
        repo.save_preferences(&prefs).await.unwrap();
        let reloaded = repo.get_preferences(user).await.unwrap();
        assert!(!reloaded.channel_enabled("push"));
        assert!(reloaded.type_enabled("daily_brief"));
    }

    #[tokio::test]
    async fn test_subscription_upsert_reactivates() {
        let (repo, user) = setup_test_repo().await;
        let keys = json!({"endpoint": "https://push.example/1", "keys": {"p256dh": "k"}});
        let sub = repo
            .upsert_subscription(user, "https://push.example/1", &keys, Some("Firefox"))
            .await
            .unwrap();
        assert!(sub.active);

        assert!(repo.deactivate_subscription(user, "https://push.example/1").await.unwrap());
        assert!(repo.list_active_subscriptions(user).await.unwrap().is_empty());
        assert!(!repo.deactivate_subscription(user, "https://push.example/none").await.unwrap());

        let again = repo
            .upsert_subscription(user, "https://push.example/1", &keys, None)
            .await
            .unwrap();
        assert_eq!(again.id, sub.id);
        assert!(again.active);
        assert_eq!(repo.list_active_subscriptions(user).await.unwrap().len(), 1);
    }
}
