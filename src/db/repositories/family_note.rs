//! Family note board repository

use crate::db::DynDatabasePool;
use crate::models::{parse_json_column, FamilyNote, NotePriority, NoteStats, NoteStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const NOTE_SELECT: &str = r#"
    SELECT fn.*, COALESCE(NULLIF(u.full_name, ''), u.username) AS author_name
    FROM family_notes fn
    JOIN users u ON fn.author_id = u.id
"#;

/// Fields of a note to insert
#[derive(Debug, Clone)]
pub struct NewFamilyNote {
    pub content: String,
    pub author_id: i64,
    pub priority: NotePriority,
    pub category: String,
    pub tags: Vec<String>,
    pub visible_to: Vec<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait FamilyNoteRepository: Send + Sync {
    async fn create(&self, note: &NewFamilyNote) -> Result<FamilyNote>;

    async fn get_by_id(&self, id: i64) -> Result<Option<FamilyNote>>;

    /// Unexpired notes with the given status, most urgent then newest first
    async fn list(&self, status: NoteStatus, limit: i64) -> Result<Vec<FamilyNote>>;

    /// Write back every editable field of `note`
    async fn update(&self, note: &FamilyNote) -> Result<()>;

    async fn set_status(&self, id: i64, status: NoteStatus) -> Result<()>;

    async fn stats(&self, user_id: i64) -> Result<NoteStats>;
}

pub struct SqlxFamilyNoteRepository {
    pool: DynDatabasePool,
}

impl SqlxFamilyNoteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FamilyNoteRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FamilyNoteRepository for SqlxFamilyNoteRepository {
    async fn create(&self, note: &NewFamilyNote) -> Result<FamilyNote> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO family_notes (content, author_id, priority, category, tags, visible_to,
                                      expires_at, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&note.content)
        .bind(note.author_id)
        .bind(note.priority.as_str())
        .bind(&note.category)
        .bind(serde_json::to_string(&note.tags)?)
        .bind(serde_json::to_string(&note.visible_to)?)
        .bind(note.expires_at)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create family note")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Family note vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<FamilyNote>> {
        let sql = format!("{} WHERE fn.id = ?", NOTE_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get family note")?;

        Ok(row.as_ref().map(row_to_note))
    }

    async fn list(&self, status: NoteStatus, limit: i64) -> Result<Vec<FamilyNote>> {
        let sql = format!(
            r#"{}
            WHERE fn.status = ? AND (fn.expires_at IS NULL OR fn.expires_at > ?)
            ORDER BY CASE fn.priority
                         WHEN 'urgent' THEN 4 WHEN 'high' THEN 3
                         WHEN 'normal' THEN 2 ELSE 1 END DESC,
                     fn.created_at DESC
            LIMIT ?
            "#,
            NOTE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(limit)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list family notes")?;

        Ok(rows.iter().map(row_to_note).collect())
    }

    async fn update(&self, note: &FamilyNote) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE family_notes
            SET content = ?, priority = ?, category = ?, tags = ?, visible_to = ?,
                expires_at = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&note.content)
        .bind(note.priority.as_str())
        .bind(&note.category)
        .bind(serde_json::to_string(&note.tags)?)
        .bind(serde_json::to_string(&note.visible_to)?)
        .bind(note.expires_at)
        .bind(note.status.as_str())
        .bind(Utc::now())
        .bind(note.id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update family note")?;
        Ok(())
    }

    async fn set_status(&self, id: i64, status: NoteStatus) -> Result<()> {
        sqlx::query("UPDATE family_notes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to change family note status")?;
        Ok(())
    }

    async fn stats(&self, user_id: i64) -> Result<NoteStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN priority IN ('high', 'urgent') AND status = 'active'
                                  THEN 1 ELSE 0 END), 0) AS high_priority,
                COALESCE(SUM(CASE WHEN author_id = ? THEN 1 ELSE 0 END), 0) AS user_notes,
                COALESCE(SUM(CASE WHEN created_at > ? THEN 1 ELSE 0 END), 0) AS recent
            FROM family_notes
            WHERE status != 'deleted'
            "#,
        )
        .bind(user_id)
        .bind(Utc::now() - Duration::hours(24))
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to compute note stats")?;

        Ok(NoteStats {
            total: row.get("total"),
            active: row.get("active"),
            high_priority: row.get("high_priority"),
            user_notes: row.get("user_notes"),
            recent: row.get("recent"),
        })
    }
}

fn row_to_note(row: &SqliteRow) -> FamilyNote {
    let priority: String = row.get("priority");
    let status: String = row.get("status");
    let tags: String = row.get("tags");
    let visible_to: String = row.get("visible_to");

    FamilyNote {
        id: row.get("id"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        author_name: row.try_get("author_name").ok().flatten(),
        priority: priority.parse().unwrap_or_default(),
        category: row.get("category"),
        tags: parse_json_column(&tags),
        visible_to: parse_json_column(&visible_to),
        expires_at: row.get("expires_at"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (SqlxFamilyNoteRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users.create(&new_user("alice")).await.unwrap().id;
        let bob = users.create(&new_user("bob")).await.unwrap().id;
        (SqlxFamilyNoteRepository::new(pool), alice, bob)
    }

    fn note(author_id: i64, content: &str, priority: NotePriority) -> NewFamilyNote {
        NewFamilyNote {
            content: content.to_string(),
            author_id,
            priority,
            category: "general".to_string(),
            tags: vec![],
            visible_to: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_and_hides_expired() {
        let (repo, alice, _) = setup_test_repo().await;
        repo.create(&note(alice, "normal", NotePriority::Normal)).await.unwrap();
        repo.create(&note(alice, "urgent", NotePriority::Urgent)).await.unwrap();
        let mut expired = note(alice, "expired", NotePriority::High);
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        repo.create(&expired).await.unwrap();

        let notes = repo.list(NoteStatus::Active, 10).await.unwrap();
        let contents: Vec<&str> = notes.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["urgent", "normal"]);
        assert_eq!(notes[0].author_name.as_deref(), Some("alice Example"));
    }

    #[tokio::test]
    async fn test_status_changes_and_stats() {
        let (repo, alice, bob) = setup_test_repo().await;
        let a = repo.create(&note(alice, "a", NotePriority::High)).await.unwrap();
        let b = repo.create(&note(bob, "b", NotePriority::Normal)).await.unwrap();
        let c = repo.create(&note(alice, "c", NotePriority::Low)).await.unwrap();

        repo.set_status(b.id, NoteStatus::Archived).await.unwrap();
        repo.set_status(c.id, NoteStatus::Deleted).await.unwrap();

        let stats = repo.stats(alice).await.unwrap();
        assert_eq!(
            stats,
            NoteStats {
                total: 2,
                active: 1,
                high_priority: 1,
                user_notes: 1,
                recent: 2,
            }
        );

        let mut edited = repo.get_by_id(a.id).await.unwrap().unwrap();
        edited.content = "edited".to_string();
        edited.tags = vec!["school".to_string()];
        repo.update(&edited).await.unwrap();
        let reloaded = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.content, "edited");
        assert_eq!(reloaded.tags, vec!["school"]);
    }
}
