//! Checklist repository
//!
//! Reusable templates and the per-event instances copied from them.

use crate::db::DynDatabasePool;
use crate::models::{
    parse_json_column, ChecklistInstance, ChecklistItem, ChecklistStatus, ChecklistTemplate,
    CreateChecklistTemplateInput,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const INSTANCE_SELECT: &str = r#"
    SELECT ci.*, ct.name AS template_name, e.title AS event_title
    FROM checklist_instances ci
    LEFT JOIN checklist_templates ct ON ci.template_id = ct.id
    LEFT JOIN events e ON ci.event_id = e.id
"#;

/// Ordering for template listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOrder {
    CategoryThenName,
    MostUsed,
}

#[async_trait]
pub trait ChecklistRepository: Send + Sync {
    async fn create_template(
        &self,
        input: &CreateChecklistTemplateInput,
        created_by: Option<i64>,
    ) -> Result<ChecklistTemplate>;

    async fn get_template(&self, id: i64) -> Result<Option<ChecklistTemplate>>;

    async fn list_templates(
        &self,
        category: Option<&str>,
        order: TemplateOrder,
    ) -> Result<Vec<ChecklistTemplate>>;

    /// Returns false when the template does not exist
    async fn increment_template_usage(&self, id: i64) -> Result<bool>;

    async fn create_instance(
        &self,
        template_id: Option<i64>,
        event_id: Option<i64>,
        title: &str,
        items: &[ChecklistItem],
        created_by: Option<i64>,
    ) -> Result<ChecklistInstance>;

    async fn get_instance(&self, id: i64) -> Result<Option<ChecklistInstance>>;

    /// Active instances, newest first
    async fn list_active_instances(&self) -> Result<Vec<ChecklistInstance>>;

    /// Persist items, completion, status and completion time
    async fn save_instance_progress(
        &self,
        id: i64,
        items: &[ChecklistItem],
        completion_percentage: f64,
        status: ChecklistStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete_instance(&self, id: i64) -> Result<bool>;
}

pub struct SqlxChecklistRepository {
    pool: DynDatabasePool,
}

impl SqlxChecklistRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ChecklistRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ChecklistRepository for SqlxChecklistRepository {
    async fn create_template(
        &self,
        input: &CreateChecklistTemplateInput,
        created_by: Option<i64>,
    ) -> Result<ChecklistTemplate> {
        let result = sqlx::query(
            r#"
            INSERT INTO checklist_templates (name, category, description, items, tags,
                                             created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(input.category.trim())
        .bind(&input.description)
        .bind(serde_json::to_string(&input.items)?)
        .bind(serde_json::to_string(&input.tags)?)
        .bind(created_by)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create checklist template")?;

        self.get_template(result.last_insert_rowid())
            .await?
            .context("Checklist template vanished after insert")
    }

    async fn get_template(&self, id: i64) -> Result<Option<ChecklistTemplate>> {
        let row = sqlx::query("SELECT * FROM checklist_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get checklist template")?;

        Ok(row.as_ref().map(row_to_template))
    }

    async fn list_templates(
        &self,
        category: Option<&str>,
        order: TemplateOrder,
    ) -> Result<Vec<ChecklistTemplate>> {
        let mut sql = String::from("SELECT * FROM checklist_templates");
        if category.is_some() {
            sql.push_str(" WHERE category = ?");
        }
        sql.push_str(match order {
            TemplateOrder::CategoryThenName => " ORDER BY category, name",
            TemplateOrder::MostUsed => " ORDER BY usage_count DESC, name",
        });

        let mut query = sqlx::query(&sql);
        if let Some(category) = category {
            query = query.bind(category);
        }
        let rows = query
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list checklist templates")?;

        Ok(rows.iter().map(row_to_template).collect())
    }

    async fn increment_template_usage(&self, id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE checklist_templates SET usage_count = usage_count + 1 WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite())
                .await
                .context("Failed to increment template usage")?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_instance(
        &self,
        template_id: Option<i64>,
        event_id: Option<i64>,
        title: &str,
        items: &[ChecklistItem],
        created_by: Option<i64>,
    ) -> Result<ChecklistInstance> {
        let result = sqlx::query(
            r#"
            INSERT INTO checklist_instances (template_id, event_id, title, items,
                                             completion_percentage, status, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(template_id)
        .bind(event_id)
        .bind(title)
        .bind(serde_json::to_string(items)?)
        .bind(ChecklistInstance::compute_completion(items))
        .bind(created_by)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create checklist instance")?;

        self.get_instance(result.last_insert_rowid())
            .await?
            .context("Checklist instance vanished after insert")
    }

    async fn get_instance(&self, id: i64) -> Result<Option<ChecklistInstance>> {
        let sql = format!("{} WHERE ci.id = ?", INSTANCE_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get checklist instance")?;

        Ok(row.as_ref().map(row_to_instance))
    }

    async fn list_active_instances(&self) -> Result<Vec<ChecklistInstance>> {
        let sql = format!(
            "{} WHERE ci.status = 'active' ORDER BY ci.created_at DESC",
            INSTANCE_SELECT
        );
        let rows = sqlx::query(&sql)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list active checklists")?;

        Ok(rows.iter().map(row_to_instance).collect())
    }

    async fn save_instance_progress(
        &self,
        id: i64,
        items: &[ChecklistItem],
        completion_percentage: f64,
        status: ChecklistStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE checklist_instances
            SET items = ?, completion_percentage = ?, status = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(items)?)
        .bind(completion_percentage)
        .bind(status.as_str())
        .bind(completed_at)
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update checklist instance")?;
        Ok(())
    }

    async fn delete_instance(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM checklist_instances WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete checklist instance")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_template(row: &SqliteRow) -> ChecklistTemplate {
    let items: String = row.get("items");
    let tags: String = row.get("tags");

    ChecklistTemplate {
        id: row.get("id"),
        name: row.get("name"),
        category: row.get("category"),
        description: row.get("description"),
        items: parse_json_column(&items),
        tags: parse_json_column(&tags),
        usage_count: row.get("usage_count"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

fn row_to_instance(row: &SqliteRow) -> ChecklistInstance {
    let items: String = row.get("items");
    let status: String = row.get("status");

    ChecklistInstance {
        id: row.get("id"),
        template_id: row.get("template_id"),
        event_id: row.get("event_id"),
        title: row.get("title"),
        items: parse_json_column(&items),
        completion_percentage: row.get("completion_percentage"),
        status: status.parse().unwrap_or_default(),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
        template_name: row.try_get("template_name").ok().flatten(),
        event_title: row.try_get("event_title").ok().flatten(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use serde_json::json;

    async fn setup_test_repo() -> SqlxChecklistRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxChecklistRepository::new(pool)
    }

    fn template_input(name: &str, category: &str) -> CreateChecklistTemplateInput {
        CreateChecklistTemplateInput {
            name: name.to_string(),
            category: category.to_string(),
            description: None,
            items: vec![json!({"text": "Sunscreen"}), json!({"text": "Towels"})],
            tags: vec!["summer".to_string()],
        }
    }

    fn item(id: &str) -> ChecklistItem {
        ChecklistItem {
            id: id.to_string(),
            text: id.to_string(),
            checked: false,
            added_at: Utc::now(),
            custom: false,
        }
    }

    #[tokio::test]
    async fn test_template_listing_orders() {
        let repo = setup_test_repo().await;
        let beach = repo.create_template(&template_input("Beach", "travel"), None).await.unwrap();
        repo.create_template(&template_input("Camping", "outdoor"), None).await.unwrap();
        repo.increment_template_usage(beach.id).await.unwrap();

        let by_category = repo
            .list_templates(None, TemplateOrder::CategoryThenName)
            .await
            .unwrap();
        assert_eq!(by_category[0].name, "Camping");

        let most_used = repo.list_templates(None, TemplateOrder::MostUsed).await.unwrap();
        assert_eq!(most_used[0].name, "Beach");
        assert_eq!(most_used[0].usage_count, 1);

        let travel = repo
            .list_templates(Some("travel"), TemplateOrder::CategoryThenName)
            .await
            .unwrap();
        assert_eq!(travel.len(), 1);
        assert!(!repo.increment_template_usage(999).await.unwrap());
    }

    #[tokio::test]
    async fn test_instance_progress_roundtrip() {
        let repo = setup_test_repo().await;
        let template = repo.create_template(&template_input("Beach", "travel"), None).await.unwrap();
        let items = vec![item("a"), item("b")];
        let instance = repo
            .create_instance(Some(template.id), None, "Beach day", &items, None)
            .await
            .unwrap();
        assert_eq!(instance.template_name.as_deref(), Some("Beach"));
        assert_eq!(instance.completion_percentage, 0.0);
        assert_eq!(instance.status, ChecklistStatus::Active);

        let mut checked = items.clone();
        checked[0].checked = true;
        checked[1].checked = true;
        let now = Utc::now();
        repo.save_instance_progress(instance.id, &checked, 100.0, ChecklistStatus::Completed, Some(now))
            .await
            .unwrap();

        let reloaded = repo.get_instance(instance.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ChecklistStatus::Completed);
        assert!(reloaded.items.iter().all(|i| i.checked));
        assert!(repo.list_active_instances().await.unwrap().is_empty());

        assert!(repo.delete_instance(instance.id).await.unwrap());
        assert!(!repo.delete_instance(instance.id).await.unwrap());
    }
}
