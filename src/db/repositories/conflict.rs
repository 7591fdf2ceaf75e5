//! Conflict repository

use crate::db::DynDatabasePool;
use crate::models::{parse_json_column, Conflict, ConflictStatus, DetectedConflict};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::family_member::json_object;

/// Grouped counts over conflicts detected since a point in time
#[derive(Debug, Clone, Default)]
pub struct ConflictCounts {
    pub total: i64,
    pub resolved: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
}

#[async_trait]
pub trait ConflictRepository: Send + Sync {
    /// Store a detected conflict unless an active one with the same type and
    /// affected events already exists. Returns the id either way.
    async fn store(&self, conflict: &DetectedConflict) -> Result<i64>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Conflict>>;

    /// Active conflicts, critical first, then newest
    async fn list_active(&self, limit: Option<i64>) -> Result<Vec<Conflict>>;

    async fn count_active(&self) -> Result<i64>;

    /// Returns false when the conflict does not exist
    async fn resolve(
        &self,
        id: i64,
        user_id: i64,
        actions: &[Value],
        data: &Value,
    ) -> Result<bool>;

    /// Move an active conflict to `status`; false when it was not active
    async fn close(&self, id: i64, user_id: i64, status: ConflictStatus) -> Result<bool>;

    async fn counts_since(&self, since: DateTime<Utc>) -> Result<ConflictCounts>;
}

pub struct SqlxConflictRepository {
    pool: DynDatabasePool,
}

impl SqlxConflictRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ConflictRepository> {
        Arc::new(Self::new(pool))
    }

    async fn group_since(&self, column: &str, since: DateTime<Utc>) -> Result<BTreeMap<String, i64>> {
        let sql = format!(
            "SELECT {column} AS label, COUNT(*) AS count FROM conflicts \
             WHERE detected_at >= ? GROUP BY {column}"
        );
        let rows = sqlx::query(&sql)
            .bind(since)
            .fetch_all(self.pool.sqlite())
            .await
            .with_context(|| format!("Failed to group conflicts by {}", column))?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("label"), row.get::<i64, _>("count")))
            .collect())
    }
}

#[async_trait]
impl ConflictRepository for SqlxConflictRepository {
    async fn store(&self, c: &DetectedConflict) -> Result<i64> {
        let affected_events = serde_json::to_string(&c.affected_events)?;

        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM conflicts
            WHERE type = ? AND affected_events = ? AND status = 'active'
            ORDER BY detected_at DESC LIMIT 1
            "#,
        )
        .bind(c.conflict_type.as_str())
        .bind(&affected_events)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to look up similar conflict")?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO conflicts (type, severity, title, description, affected_events,
                                   affected_users, affected_resources, resolution_suggestions,
                                   metadata, auto_generated, detected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(c.conflict_type.as_str())
        .bind(c.severity.as_str())
        .bind(&c.title)
        .bind(&c.description)
        .bind(&affected_events)
        .bind(serde_json::to_string(&c.affected_users)?)
        .bind(serde_json::to_string(&c.affected_resources)?)
        .bind(serde_json::to_string(&c.resolution_suggestions)?)
        .bind(c.metadata.to_string())
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to store conflict")?;

        Ok(result.last_insert_rowid())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conflict>> {
        let row = sqlx::query("SELECT * FROM conflicts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get conflict")?;

        Ok(row.as_ref().map(row_to_conflict))
    }

    async fn list_active(&self, limit: Option<i64>) -> Result<Vec<Conflict>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conflicts
            WHERE status = 'active'
            ORDER BY
                CASE severity
                    WHEN 'critical' THEN 1
                    WHEN 'high' THEN 2
                    WHEN 'medium' THEN 3
                    ELSE 4
                END,
                detected_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list active conflicts")?;

        Ok(rows.iter().map(row_to_conflict).collect())
    }

    async fn count_active(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conflicts WHERE status = 'active'")
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count active conflicts")?;
        Ok(count)
    }

    async fn resolve(
        &self,
        id: i64,
        user_id: i64,
        actions: &[Value],
        data: &Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conflicts
            SET status = 'resolved', resolved_at = ?, resolved_by = ?,
                resolution_actions = ?, resolution_data = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(serde_json::to_string(actions)?)
        .bind(data.to_string())
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to resolve conflict")?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self, id: i64, user_id: i64, status: ConflictStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conflicts
            SET status = ?, resolved_by = ?, resolved_at = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(status.as_str())
        .bind(user_id)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .with_context(|| format!("Failed to mark conflict {}", status))?;

        Ok(result.rows_affected() > 0)
    }

    async fn counts_since(&self, since: DateTime<Utc>) -> Result<ConflictCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved
            FROM conflicts
            WHERE detected_at >= ?
            "#,
        )
        .bind(since)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to count conflicts")?;

        Ok(ConflictCounts {
            total: row.get("total"),
            resolved: row.get("resolved"),
            by_type: self.group_since("type", since).await?,
            by_severity: self.group_since("severity", since).await?,
            by_status: self.group_since("status", since).await?,
        })
    }
}

fn row_to_conflict(row: &SqliteRow) -> Conflict {
    let conflict_type: String = row.get("type");
    let severity: String = row.get("severity");
    let status: String = row.get("status");
    let affected_events: String = row.get("affected_events");
    let affected_users: String = row.get("affected_users");
    let affected_resources: String = row.get("affected_resources");
    let suggestions: String = row.get("resolution_suggestions");
    let actions: String = row.get("resolution_actions");
    let data: String = row.get("resolution_data");
    let metadata: String = row.get("metadata");

    Conflict {
        id: row.get("id"),
        conflict_type: conflict_type.parse().unwrap_or_default(),
        severity: severity.parse().unwrap_or_default(),
        title: row.get("title"),
        description: row.get("description"),
        affected_events: parse_json_column(&affected_events),
        affected_users: parse_json_column(&affected_users),
        affected_resources: parse_json_column(&affected_resources),
        status: status.parse().unwrap_or_default(),
        resolution_suggestions: parse_json_column(&suggestions),
        resolution_actions: parse_json_column(&actions),
        resolution_data: json_object(&data),
        auto_generated: row.get("auto_generated"),
        detected_at: row.get("detected_at"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
        metadata: json_object(&metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ConflictSeverity, ConflictType};
    use chrono::Duration;
    use serde_json::json;

    async fn setup_test_repo() -> (SqlxConflictRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&new_user("alice"))
            .await
            .unwrap();
        (SqlxConflictRepository::new(pool), user.id)
    }

    fn detected(kind: ConflictType, severity: ConflictSeverity, events: Vec<i64>) -> DetectedConflict {
        DetectedConflict {
            conflict_type: kind,
            severity,
            title: "Double-booked Person".to_string(),
            description: "Overlap".to_string(),
            affected_events: events,
            affected_users: vec![],
            affected_resources: vec![],
            resolution_suggestions: vec!["Move one event".to_string()],
            metadata: json!({"overlap_minutes": 30}),
        }
    }

    #[tokio::test]
    async fn test_store_dedupes_active_conflicts() {
        let (repo, user) = setup_test_repo().await;
        let conflict = detected(ConflictType::TimeOverlap, ConflictSeverity::High, vec![1, 2]);

        let first = repo.store(&conflict).await.unwrap();
        assert_eq!(repo.store(&conflict).await.unwrap(), first);

        // A different type over the same events is a new conflict
        let travel = detected(ConflictType::LocationTravel, ConflictSeverity::Medium, vec![1, 2]);
        assert_ne!(repo.store(&travel).await.unwrap(), first);

        // Once closed, the same conflict is stored again
        assert!(repo.close(first, user, ConflictStatus::Ignored).await.unwrap());
        assert_ne!(repo.store(&conflict).await.unwrap(), first);

        let stored = repo.get_by_id(first).await.unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::Ignored);
        assert_eq!(stored.affected_events, vec![1, 2]);
        assert_eq!(stored.metadata["overlap_minutes"], 30);
        assert!(stored.auto_generated);
    }

    #[tokio::test]
    async fn test_list_active_orders_by_severity() {
        let (repo, _) = setup_test_repo().await;
        repo.store(&detected(ConflictType::TimeOverlap, ConflictSeverity::Medium, vec![1]))
            .await
            .unwrap();
        repo.store(&detected(ConflictType::TimeOverlap, ConflictSeverity::Critical, vec![2]))
            .await
            .unwrap();
        repo.store(&detected(ConflictType::TimeOverlap, ConflictSeverity::High, vec![3]))
            .await
            .unwrap();

        let active = repo.list_active(None).await.unwrap();
        let severities: Vec<_> = active.iter().map(|c| c.severity).collect();
        assert_eq!(
            severities,
            vec![ConflictSeverity::Critical, ConflictSeverity::High, ConflictSeverity::Medium]
        );
        assert_eq!(repo.list_active(Some(1)).await.unwrap().len(), 1);
        assert_eq!(repo.count_active().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_resolve_and_counts() {
        let (repo, user) = setup_test_repo().await;
        let a = repo
            .store(&detected(ConflictType::TimeOverlap, ConflictSeverity::High, vec![1]))
            .await
            .unwrap();
        let b = repo
            .store(&detected(ConflictType::ResourceConflict, ConflictSeverity::Medium, vec![2]))
            .await
            .unwrap();

        assert!(repo
            .resolve(a, user, &[json!("reassign")], &json!({"note": "done"}))
            .await
            .unwrap());
        assert!(!repo.resolve(999, user, &[], &json!({})).await.unwrap());
        assert!(repo.close(b, user, ConflictStatus::Acknowledged).await.unwrap());
        assert!(!repo.close(b, user, ConflictStatus::Ignored).await.unwrap());

        let resolved = repo.get_by_id(a).await.unwrap().unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolved_by, Some(user));
        assert_eq!(resolved.resolution_data["note"], "done");
        assert_eq!(resolved.resolution_actions, vec![json!("reassign")]);

        let counts = repo
            .counts_since(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.by_type.get("resource_conflict"), Some(&1));
        assert_eq!(counts.by_status.get("acknowledged"), Some(&1));

        let future = repo.counts_since(Utc::now() + Duration::days(1)).await.unwrap();
        assert_eq!(future.total, 0);
        assert!(future.by_severity.is_empty());
    }
}
