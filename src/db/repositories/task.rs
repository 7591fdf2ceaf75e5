//! Task repository

use crate::db::DynDatabasePool;
use crate::models::{parse_json_column, CreateTaskInput, Task, TaskFilter, TaskStatus, UpdateTaskInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const TASK_SELECT: &str = r#"
    SELECT t.*, u.full_name AS assigned_to_name, fm.name AS family_member_name
    FROM tasks t
    LEFT JOIN users u ON t.assigned_to = u.id
    LEFT JOIN family_members fm ON t.family_member_id = fm.id
"#;

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, input: &CreateTaskInput, created_by: Option<i64>) -> Result<Task>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Task>>;

    /// Tasks ordered by due date (nulls last), then priority descending
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Pending tasks the user is assigned to or created, due in `[from, to]`
    async fn list_upcoming(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    /// Unfinished tasks due in `[from, to)`. With a user, only tasks they are
    /// assigned to or created.
    async fn list_due_between(
        &self,
        user_id: Option<i64>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    /// Pending tasks assigned to the user, by priority then due date
    async fn list_pending_for_user(&self, user_id: i64) -> Result<Vec<Task>>;

    async fn update(&self, id: i64, input: &UpdateTaskInput) -> Result<Option<Task>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxTaskRepository {
    pool: DynDatabasePool,
}

impl SqlxTaskRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TaskRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create(&self, input: &CreateTaskInput, created_by: Option<i64>) -> Result<Task> {
        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let completed_at = (status == TaskStatus::Completed).then_some(now);

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (title, description, due_date, assigned_to, family_member_id,
                               category, priority, status, checklist, parent_event_id,
                               completed_at, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.due_date)
        .bind(input.assigned_to)
        .bind(input.family_member_id)
        .bind(&input.category)
        .bind(input.priority.unwrap_or(3))
        .bind(status.as_str())
        .bind(serde_json::to_string(input.checklist.as_deref().unwrap_or_default())?)
        .bind(input.parent_event_id)
        .bind(completed_at)
        .bind(created_by)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create task")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Task vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Task>> {
        let sql = format!("{} WHERE t.id = ?", TASK_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get task")?;

        Ok(row.as_ref().map(row_to_task))
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("{} WHERE 1 = 1", TASK_SELECT);
        if filter.status.is_some() {
            sql.push_str(" AND t.status = ?");
        }
        if filter.assigned_to.is_some() {
            sql.push_str(" AND t.assigned_to = ?");
        }
        sql.push_str(" ORDER BY t.due_date IS NULL, t.due_date ASC, t.priority DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(assigned_to) = filter.assigned_to {
            query = query.bind(assigned_to);
        }

        let rows = query
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list tasks")?;

        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn list_upcoming(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let sql = format!(
            "{} WHERE t.status = 'pending' AND (t.assigned_to = ? OR t.created_by = ?) \
             AND t.due_date >= ? AND t.due_date <= ? ORDER BY t.due_date",
            TASK_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(user_id)
            .bind(from)
            .bind(to)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list upcoming tasks")?;

        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn list_due_between(
        &self,
        user_id: Option<i64>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut sql = format!(
            "{} WHERE t.status != 'completed' AND t.due_date >= ? AND t.due_date < ?",
            TASK_SELECT
        );
        if user_id.is_some() {
            sql.push_str(" AND (t.assigned_to = ? OR t.created_by = ?)");
        }
        sql.push_str(" ORDER BY t.due_date, t.priority");

        let mut query = sqlx::query(&sql).bind(from).bind(to);
        if let Some(user_id) = user_id {
            query = query.bind(user_id).bind(user_id);
        }

        let rows = query
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list due tasks")?;

        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn list_pending_for_user(&self, user_id: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "{} WHERE t.status != 'completed' AND t.assigned_to = ? \
             ORDER BY t.priority, t.due_date IS NULL, t.due_date",
            TASK_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list pending tasks")?;

        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn update(&self, id: i64, input: &UpdateTaskInput) -> Result<Option<Task>> {
        let Some(mut task) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(title) = &input.title {
            task.title = title.trim().to_string();
        }
        if input.description.is_some() {
            task.description = input.description.clone();
        }
        if input.due_date.is_some() {
            task.due_date = input.due_date;
        }
        if input.assigned_to.is_some() {
            task.assigned_to = input.assigned_to;
        }
        if input.family_member_id.is_some() {
            task.family_member_id = input.family_member_id;
        }
        if input.category.is_some() {
            task.category = input.category.clone();
        }
        if let Some(priority) = input.priority {
            task.priority = priority;
        }
        if let Some(checklist) = &input.checklist {
            task.checklist = checklist.clone();
        }
        if input.parent_event_id.is_some() {
            task.parent_event_id = input.parent_event_id;
        }
        if let Some(status) = input.status {
            task.completed_at = match status {
                TaskStatus::Completed => Some(Utc::now()),
                _ => None,
            };
            task.status = status;
        }

        sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, due_date = ?, assigned_to = ?, family_member_id = ?,
                category = ?, priority = ?, status = ?, checklist = ?, parent_event_id = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.assigned_to)
        .bind(task.family_member_id)
        .bind(&task.category)
        .bind(task.priority)
        .bind(task.status.as_str())
        .bind(serde_json::to_string(&task.checklist)?)
        .bind(task.parent_event_id)
        .bind(task.completed_at)
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update task")?;

        // Reload so the joined names follow a changed assignee.
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete task")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_task(row: &SqliteRow) -> Task {
    let status: String = row.get("status");
    let checklist: String = row.get("checklist");

    Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        due_date: row.get("due_date"),
        assigned_to: row.get("assigned_to"),
        family_member_id: row.get("family_member_id"),
        category: row.get("category"),
        priority: row.get("priority"),
        status: status.parse().unwrap_or_default(),
        checklist: parse_json_column(&checklist),
        parent_event_id: row.get("parent_event_id"),
        completed_at: row.get("completed_at"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        assigned_to_name: row.try_get("assigned_to_name").ok().flatten(),
        family_member_name: row.try_get("family_member_name").ok().flatten(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    fn task_input(title: &str) -> CreateTaskInput {
        CreateTaskInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    async fn setup_test_repo() -> (SqlxTaskRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users.create(&new_user("alice")).await.unwrap().id;
        (SqlxTaskRepository::new(pool), alice)
    }

    #[tokio::test]
    async fn test_create_task_with_joined_name() {
        let (repo, alice) = setup_test_repo().await;
        let mut input = task_input("Pack lunch");
        input.assigned_to = Some(alice);
        let task = repo.create(&input, Some(alice)).await.unwrap();
        assert_eq!(task.priority, 3);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assigned_to_name.as_deref(), Some("alice Example"));
    }

    #[tokio::test]
    async fn test_list_orders_nulls_last() {
        let (repo, alice) = setup_test_repo().await;
        repo.create(&task_input("no due date"), Some(alice)).await.unwrap();
        let mut due = task_input("due soon");
        due.due_date = Some(Utc::now() + Duration::days(1));
        repo.create(&due, Some(alice)).await.unwrap();

        let tasks = repo.list(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks[0].title, "due soon");
        assert_eq!(tasks[1].title, "no due date");

        let filter = TaskFilter {
            status: Some(TaskStatus::Completed),
            assigned_to: None,
        };
        assert!(repo.list(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_change_stamps_completed_at() {
        let (repo, alice) = setup_test_repo().await;
        let task = repo.create(&task_input("Laundry"), Some(alice)).await.unwrap();

        let done = UpdateTaskInput {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let updated = repo.update(task.id, &done).await.unwrap().unwrap();
        assert!(updated.completed_at.is_some());

        let reopen = UpdateTaskInput {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        let updated = repo.update(task.id, &reopen).await.unwrap().unwrap();
        assert!(updated.completed_at.is_none());
        assert!(repo.update(999, &reopen).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upcoming_and_due_windows() {
        let (repo, alice) = setup_test_repo().await;
        let now = Utc::now();
        let mut soon = task_input("soon");
        soon.due_date = Some(now + Duration::days(2));
        soon.assigned_to = Some(alice);
        repo.create(&soon, None).await.unwrap();
        let mut far = task_input("far");
        far.due_date = Some(now + Duration::days(20));
        repo.create(&far, Some(alice)).await.unwrap();

        let upcoming = repo
            .list_upcoming(alice, now, now + Duration::days(7))
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "soon");

        let due = repo
            .list_due_between(None, now, now + Duration::days(30))
            .await
            .unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(repo.list_pending_for_user(alice).await.unwrap().len(), 1);
    }
}
