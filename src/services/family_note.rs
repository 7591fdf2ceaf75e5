//! Family note board
//!
//! Any member may post. Only the author may edit, archive or delete a note.

use crate::db::repositories::{FamilyNoteRepository, NewFamilyNote};
use crate::models::{
    CreateFamilyNoteInput, FamilyNote, NotePriority, NoteStats, NoteStatus, UpdateFamilyNoteInput,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

pub const DEFAULT_CATEGORY: &str = "general";

pub struct FamilyNoteService {
    repo: Arc<dyn FamilyNoteRepository>,
}

fn parse_priority(value: &str) -> ServiceResult<NotePriority> {
    value
        .parse()
        .map_err(|_| ServiceError::validation("Invalid priority"))
}

impl FamilyNoteService {
    pub fn new(repo: Arc<dyn FamilyNoteRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, status: Option<&str>, limit: Option<i64>) -> ServiceResult<Vec<FamilyNote>> {
        let status = match status {
            Some(s) => s
                .parse()
                .map_err(|_| ServiceError::validation("Invalid status"))?,
            None => NoteStatus::Active,
        };
        let limit = limit.unwrap_or(10).clamp(1, 100);

        Ok(self
            .repo
            .list(status, limit)
            .await
            .context("Failed to list family notes")?)
    }

    pub async fn create(&self, input: CreateFamilyNoteInput, author_id: i64) -> ServiceResult<FamilyNote> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ServiceError::validation("Content is required"));
        }
        let priority = match input.priority.as_deref() {
            Some(p) => parse_priority(p)?,
            None => NotePriority::Normal,
        };
        let category = input
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let note = self
            .repo
            .create(&NewFamilyNote {
                content: content.to_string(),
                author_id,
                priority,
                category,
                tags: input.tags,
                visible_to: input.visible_to,
                expires_at: input.expires_at,
            })
            .await
            .context("Failed to create family note")?;
        tracing::info!(note_id = note.id, author_id, "Family note posted");
        Ok(note)
    }

    /// Load a note the caller wrote
    async fn authored(&self, id: i64, user_id: i64) -> ServiceResult<FamilyNote> {
        let note = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get family note")?
            .ok_or_else(|| ServiceError::not_found("Note"))?;
        if note.author_id != user_id {
            return Err(ServiceError::Forbidden(
                "Only the author can change this note".to_string(),
            ));
        }
        Ok(note)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateFamilyNoteInput,
        user_id: i64,
    ) -> ServiceResult<FamilyNote> {
        let mut note = self.authored(id, user_id).await?;
        let mut changed = false;

        if let Some(content) = input.content.filter(|c| !c.trim().is_empty()) {
            note.content = content.trim().to_string();
            changed = true;
        }
        if let Some(priority) = input.priority {
            note.priority = parse_priority(&priority)?;
            changed = true;
        }
        if let Some(category) = input.category.filter(|c| !c.trim().is_empty()) {
            note.category = category;
            changed = true;
        }
        if let Some(tags) = input.tags {
            note.tags = tags;
            changed = true;
        }
        if let Some(visible_to) = input.visible_to {
            note.visible_to = visible_to;
            changed = true;
        }
        if let Some(expires_at) = input.expires_at {
            note.expires_at = Some(expires_at);
            changed = true;
        }
        if let Some(status) = input.status {
            note.status = status
                .parse()
                .map_err(|_| ServiceError::validation("Invalid status"))?;
            changed = true;
        }

        if !changed {
            return Err(ServiceError::validation("No valid fields to update"));
        }

        note.updated_at = Utc::now();
        self.repo
            .update(&note)
            .await
            .context("Failed to update family note")?;
        Ok(note)
    }

    pub async fn archive(&self, id: i64, user_id: i64) -> ServiceResult<()> {
        self.authored(id, user_id).await?;
        self.repo
            .set_status(id, NoteStatus::Archived)
            .await
            .context("Failed to archive family note")?;
        Ok(())
    }

    /// Soft delete; the row stays with status `deleted`
    pub async fn delete(&self, id: i64, user_id: i64) -> ServiceResult<()> {
        self.authored(id, user_id).await?;
        self.repo
            .set_status(id, NoteStatus::Deleted)
            .await
            .context("Failed to delete family note")?;
        Ok(())
    }

    pub async fn stats(&self, user_id: i64) -> ServiceResult<NoteStats> {
        Ok(self
            .repo
            .stats(user_id)
            .await
            .context("Failed to load note stats")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxFamilyNoteRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> (FamilyNoteService, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let author = users.create(&new_user("author")).await.unwrap();
        let other = users.create(&new_user("other")).await.unwrap();
        (
            FamilyNoteService::new(SqlxFamilyNoteRepository::boxed(pool)),
            author.id,
            other.id,
        )
    }

    fn note(content: &str, priority: Option<&str>) -> CreateFamilyNoteInput {
        CreateFamilyNoteInput {
            content: content.to_string(),
            priority: priority.map(str::to_string),
            category: None,
            tags: vec![],
            visible_to: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_validates() {
        let (service, author, _) = setup_test_service().await;
        assert!(matches!(
            service.create(note("  ", None), author).await,
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(note("Dentist", Some("critical")), author).await,
            Err(ServiceError::ValidationError(_))
        ));

        let created = service.create(note("Dentist at 3", None), author).await.unwrap();
        assert_eq!(created.priority, NotePriority::Normal);
        assert_eq!(created.category, DEFAULT_CATEGORY);
    }

    #[tokio::test]
    async fn test_only_author_can_change() {
        let (service, author, other) = setup_test_service().await;
        let created = service.create(note("Buy milk", None), author).await.unwrap();

        let edit = UpdateFamilyNoteInput {
            content: Some("Buy oat milk".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(created.id, edit.clone(), other).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(service.archive(created.id, other).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(service.delete(999, author).await, Err(ServiceError::NotFound(_))));

        let updated = service.update(created.id, edit, author).await.unwrap();
        assert_eq!(updated.content, "Buy oat milk");

        assert!(matches!(
            service.update(created.id, UpdateFamilyNoteInput::default(), author).await,
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_archive_and_delete_leave_active_list() {
        let (service, author, _) = setup_test_service().await;
        let urgent = service.create(note("Pick up Sam", Some("urgent")), author).await.unwrap();
        let normal = service.create(note("Water plants", None), author).await.unwrap();
        let gone = service.create(note("Old note", None), author).await.unwrap();

        let listed = service.list(None, None).await.unwrap();
        assert_eq!(listed[0].id, urgent.id);

        service.archive(normal.id, author).await.unwrap();
        service.delete(gone.id, author).await.unwrap();

        let active = service.list(None, None).await.unwrap();
        assert_eq!(active.len(), 1);
        let archived = service.list(Some("archived"), None).await.unwrap();
        assert_eq!(archived[0].id, normal.id);

        let stats = service.stats(author).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.high_priority, 1);
    }
}
