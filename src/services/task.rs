//! Task service

use crate::db::repositories::TaskRepository;
use crate::models::{CreateTaskInput, Task, TaskFilter, TaskStatus, UpdateTaskInput};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::event::check_priority;
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// How far ahead `upcoming` looks
const UPCOMING_DAYS: i64 = 7;

pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, filter: &TaskFilter) -> ServiceResult<Vec<Task>> {
        Ok(self.repo.list(filter).await.context("Failed to list tasks")?)
    }

    /// Pending tasks for the user due within the next week
    pub async fn upcoming(&self, user_id: i64) -> ServiceResult<Vec<Task>> {
        let now = Utc::now();
        Ok(self
            .repo
            .list_upcoming(user_id, now, now + Duration::days(UPCOMING_DAYS))
            .await
            .context("Failed to list upcoming tasks")?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Task> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get task")?
            .ok_or_else(|| ServiceError::not_found("Task"))
    }

    pub async fn create(&self, input: CreateTaskInput, user_id: i64) -> ServiceResult<Task> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        if let Some(priority) = input.priority {
            check_priority(priority)?;
        }

        let task = self
            .repo
            .create(&input, Some(user_id))
            .await
            .context("Failed to create task")?;
        tracing::debug!(task_id = task.id, user_id, "Task created");
        Ok(task)
    }

    pub async fn update(&self, id: i64, input: UpdateTaskInput) -> ServiceResult<Task> {
        if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::validation("Title is required"));
        }
        if let Some(priority) = input.priority {
            check_priority(priority)?;
        }

        self.repo
            .update(id, &input)
            .await
            .context("Failed to update task")?
            .ok_or_else(|| ServiceError::not_found("Task"))
    }

    pub async fn complete(&self, id: i64) -> ServiceResult<Task> {
        let input = UpdateTaskInput {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        self.update(id, input).await
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete(id).await.context("Failed to delete task")? {
            return Err(ServiceError::not_found("Task"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxTaskRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> (TaskService, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users.create(&new_user("alice")).await.unwrap().id;
        (TaskService::new(SqlxTaskRepository::boxed(pool)), alice)
    }

    fn task_input(title: &str) -> CreateTaskInput {
        CreateTaskInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_title_and_valid_priority() {
        let (service, alice) = setup_test_service().await;

        assert!(matches!(
            service.create(task_input(""), alice).await,
            Err(ServiceError::ValidationError(_))
        ));

        let mut loud = task_input("Pack bags");
        loud.priority = Some(6);
        assert!(matches!(
            service.create(loud, alice).await,
            Err(ServiceError::ValidationError(_))
        ));

        let task = service.create(task_input("Pack bags"), alice).await.unwrap();
        assert_eq!(task.priority, 3);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_complete_then_reopen() {
        let (service, alice) = setup_test_service().await;
        let task = service.create(task_input("Sign form"), alice).await.unwrap();

        let done = service.complete(task.id).await.unwrap();
        assert!(done.completed_at.is_some());

        let reopened = service
            .update(
                task.id,
                UpdateTaskInput {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(reopened.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_upcoming_only_next_week() {
        let (service, alice) = setup_test_service().await;
        let mut soon = task_input("Soon");
        soon.due_date = Some(Utc::now() + Duration::days(2));
        let mut later = task_input("Later");
        later.due_date = Some(Utc::now() + Duration::days(20));
        service.create(soon, alice).await.unwrap();
        service.create(later, alice).await.unwrap();

        let upcoming = service.upcoming(alice).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Soon");
    }

    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let (service, _) = setup_test_service().await;
        assert!(matches!(service.get(5).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.delete(5).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.complete(5).await, Err(ServiceError::NotFound(_))));
    }
}
