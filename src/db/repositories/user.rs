//! User repository
//!
//! Database operations for user accounts, including the Telegram and Google
//! Calendar link state stored on the user row.

use crate::db::DynDatabasePool;
use crate::models::{parse_json_column, GoogleTokens, TelegramSettings, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, telegram_id, \
     telegram_chat_id, telegram_settings, preferences, google_calendar_id, google_tokens, \
     last_sync_time, sync_enabled, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user from the identity fields of `user`
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find a user whose stored Telegram id equals `telegram_id`
    async fn get_by_telegram_id(&self, telegram_id: &str) -> Result<Option<User>>;

    /// Find the user bound to a Telegram chat
    async fn get_by_telegram_chat_id(&self, chat_id: &str) -> Result<Option<User>>;

    /// All users that have a Telegram chat to deliver to
    async fn list_with_telegram_chat(&self) -> Result<Vec<User>>;

    /// All users with Google Calendar sync enabled
    async fn list_sync_enabled(&self) -> Result<Vec<User>>;

    async fn list(&self) -> Result<Vec<User>>;

    /// Store or clear the Telegram link. Clearing also drops the chat id.
    async fn set_telegram_link(&self, id: i64, telegram_id: Option<&str>) -> Result<()>;

    async fn set_telegram_chat_id(&self, id: i64, chat_id: &str) -> Result<()>;

    async fn update_telegram_settings(&self, id: i64, settings: &TelegramSettings) -> Result<()>;

    /// Number of users that linked Telegram
    async fn count_telegram_linked(&self) -> Result<i64>;

    async fn update_google_tokens(
        &self,
        id: i64,
        tokens: &GoogleTokens,
        sync_enabled: bool,
    ) -> Result<()>;

    async fn set_last_sync_time(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(self.pool.sqlite())
            .await
            .with_context(|| format!("Failed to get user by {}", clause))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn fetch_all_where(&self, clause: &str) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY id",
            USER_COLUMNS, clause
        );
        let rows = sqlx::query(&sql)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list users")?;

        rows.iter().map(row_to_user).collect()
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let settings = serde_json::to_string(&user.telegram_settings)?;
        let preferences = serde_json::to_string(&user.preferences)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, telegram_settings,
                               preferences, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(settings)
        .bind(preferences)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create user")?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .context("User vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get user by ID")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_where("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_where("email", email).await
    }

    async fn get_by_telegram_id(&self, telegram_id: &str) -> Result<Option<User>> {
        self.fetch_one_where("telegram_id", telegram_id).await
    }

    async fn get_by_telegram_chat_id(&self, chat_id: &str) -> Result<Option<User>> {
        self.fetch_one_where("telegram_chat_id", chat_id).await
    }

    async fn list_with_telegram_chat(&self) -> Result<Vec<User>> {
        self.fetch_all_where("telegram_chat_id IS NOT NULL AND telegram_chat_id != ''")
            .await
    }

    async fn list_sync_enabled(&self) -> Result<Vec<User>> {
        self.fetch_all_where("sync_enabled = 1").await
    }

    async fn list(&self) -> Result<Vec<User>> {
        self.fetch_all_where("1 = 1").await
    }

    async fn set_telegram_link(&self, id: i64, telegram_id: Option<&str>) -> Result<()> {
        let sql = if telegram_id.is_some() {
            "UPDATE users SET telegram_id = ?, updated_at = ? WHERE id = ?"
        } else {
            "UPDATE users SET telegram_id = ?, telegram_chat_id = NULL, updated_at = ? WHERE id = ?"
        };
        sqlx::query(sql)
            .bind(telegram_id)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update Telegram link")?;
        Ok(())
    }

    async fn set_telegram_chat_id(&self, id: i64, chat_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET telegram_chat_id = ?, updated_at = ? WHERE id = ?")
            .bind(chat_id)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update Telegram chat id")?;
        Ok(())
    }

    async fn update_telegram_settings(&self, id: i64, settings: &TelegramSettings) -> Result<()> {
        sqlx::query("UPDATE users SET telegram_settings = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(settings)?)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update Telegram settings")?;
        Ok(())
    }

    async fn count_telegram_linked(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM users WHERE telegram_id IS NOT NULL AND telegram_id != ''",
        )
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to count linked users")?;
        Ok(row.get("count"))
    }

    async fn update_google_tokens(
        &self,
        id: i64,
        tokens: &GoogleTokens,
        sync_enabled: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET google_tokens = ?, sync_enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(tokens)?)
        .bind(sync_enabled)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update Google tokens")?;
        Ok(())
    }

    async fn set_last_sync_time(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_sync_time = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update last sync time")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete user")?;
        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let settings: String = row.get("telegram_settings");
    let preferences: String = row.get("preferences");
    let tokens: String = row.get("google_tokens");

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        telegram_id: row.get("telegram_id"),
        telegram_chat_id: row.get("telegram_chat_id"),
        telegram_settings: parse_json_column(&settings),
        preferences: serde_json::from_str(&preferences)
            .unwrap_or_else(|_| serde_json::json!({})),
        google_calendar_id: row.get("google_calendar_id"),
        google_tokens: parse_json_column(&tokens),
        last_sync_time: row.get("last_sync_time"),
        sync_enabled: row.get("sync_enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    /// Build an unsaved user with the given name
    pub(crate) fn new_user(username: &str) -> User {
        let now = Utc::now();
        User {
            id: 0,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            full_name: format!("{} Example", username),
            telegram_id: None,
            telegram_chat_id: None,
            telegram_settings: TelegramSettings::default(),
            preferences: serde_json::json!({}),
            google_calendar_id: None,
            google_tokens: GoogleTokens::default(),
            last_sync_time: None,
            sync_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("alice")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.full_name, "alice Example");
        assert!(created.telegram_settings.notifications_enabled);

        let by_name = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        let by_email = repo.get_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert!(repo.get_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("alice")).await.unwrap();
        let mut dup = new_user("alice");
        dup.email = "other@example.com".to_string();
        assert!(repo.create(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_telegram_link_lifecycle() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("alice")).await.unwrap();

        repo.set_telegram_link(user.id, Some("123456")).await.unwrap();
        repo.set_telegram_chat_id(user.id, "987").await.unwrap();
        assert_eq!(repo.count_telegram_linked().await.unwrap(), 1);

        let linked = repo.get_by_telegram_chat_id("987").await.unwrap().unwrap();
        assert_eq!(linked.id, user.id);
        assert_eq!(repo.list_with_telegram_chat().await.unwrap().len(), 1);

        repo.set_telegram_link(user.id, None).await.unwrap();
        let unlinked = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(unlinked.telegram_id.is_none());
        assert!(unlinked.telegram_chat_id.is_none());
    }

    #[tokio::test]
    async fn test_google_tokens_roundtrip() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("alice")).await.unwrap();
        let tokens = GoogleTokens {
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            expiry_date: Some(1_700_000_000_000),
            ..Default::default()
        };

        repo.update_google_tokens(user.id, &tokens, true).await.unwrap();
        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.google_tokens, tokens);
        assert!(stored.sync_enabled);
        assert_eq!(repo.list_sync_enabled().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_telegram_settings_update() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("alice")).await.unwrap();
        let settings = TelegramSettings {
            notifications_enabled: false,
            reminder_minutes: 45,
        };
        repo.update_telegram_settings(user.id, &settings).await.unwrap();
        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.telegram_settings, settings);
    }
}
