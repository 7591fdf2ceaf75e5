//! Event service
//!
//! Validation and assignment rules for calendar events.

use crate::db::repositories::EventRepository;
use crate::models::{
    AssignmentStatus, CreateEventInput, Event, EventRange, HandoffRecord, UpdateEventInput,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use std::sync::Arc;

pub struct EventService {
    repo: Arc<dyn EventRepository>,
}

impl EventService {
    pub fn new(repo: Arc<dyn EventRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, range: &EventRange) -> ServiceResult<Vec<Event>> {
        Ok(self.repo.list(range).await.context("Failed to list events")?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Event> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get event")?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    pub async fn create(&self, input: CreateEventInput, user_id: i64) -> ServiceResult<Event> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        if input.end_time < input.start_time {
            return Err(ServiceError::validation("End time must be after start time"));
        }
        if let Some(priority) = input.priority {
            check_priority(priority)?;
        }

        let event = self
            .repo
            .create(&input, Some(user_id))
            .await
            .context("Failed to create event")?;
        tracing::info!(event_id = event.id, user_id, "Event created");
        Ok(event)
    }

    /// Partial update; the merged times must still be ordered
    pub async fn update(&self, id: i64, input: UpdateEventInput) -> ServiceResult<Event> {
        let current = self.get(id).await?;

        if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::validation("Title is required"));
        }
        let start = input.start_time.unwrap_or(current.start_time);
        let end = input.end_time.unwrap_or(current.end_time);
        if end < start {
            return Err(ServiceError::validation("End time must be after start time"));
        }
        if let Some(priority) = input.priority {
            check_priority(priority)?;
        }

        self.repo
            .update(id, &input)
            .await
            .context("Failed to update event")?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        let deleted = self.repo.delete(id).await.context("Failed to delete event")?;
        if !deleted {
            return Err(ServiceError::not_found("Event"));
        }
        Ok(())
    }

    /// Take responsibility for an event
    pub async fn claim(&self, id: i64, user_id: i64) -> ServiceResult<Event> {
        self.repo
            .set_assignment(id, Some(user_id), AssignmentStatus::Claimed)
            .await
            .context("Failed to claim event")?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    pub async fn complete(&self, id: i64) -> ServiceResult<Event> {
        self.repo
            .set_assignment(id, None, AssignmentStatus::Completed)
            .await
            .context("Failed to complete event")?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    /// Pass an event on to another user, keeping a record of the transfer
    pub async fn handoff(&self, id: i64, from: i64, to: i64) -> ServiceResult<Event> {
        if from == to {
            return Err(ServiceError::validation("Cannot hand an event to yourself"));
        }
        let record = HandoffRecord::new(from, to);
        self.repo
            .record_handoff(id, &record)
            .await
            .context("Failed to hand off event")?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }
}

pub(crate) fn check_priority(priority: i64) -> ServiceResult<()> {
    if !(1..=5).contains(&priority) {
        return Err(ServiceError::validation("Priority must be between 1 and 5"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::event::tests::event_input;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxEventRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration, Utc};

    async fn setup_test_service() -> (EventService, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users.create(&new_user("alice")).await.unwrap().id;
        let bob = users.create(&new_user("bob")).await.unwrap().id;
        (EventService::new(SqlxEventRepository::boxed(pool)), alice, bob)
    }

    #[tokio::test]
    async fn test_create_validates_title_and_times() {
        let (service, alice, _) = setup_test_service().await;

        let blank = service.create(event_input("  ", Utc::now(), 1), alice).await;
        assert!(matches!(blank, Err(ServiceError::ValidationError(_))));

        let backwards = service.create(event_input("Swim", Utc::now(), -1), alice).await;
        assert!(matches!(backwards, Err(ServiceError::ValidationError(_))));

        let event = service
            .create(event_input("Swim", Utc::now(), 1), alice)
            .await
            .unwrap();
        assert_eq!(event.created_by, Some(alice));
    }

    #[tokio::test]
    async fn test_update_checks_merged_times() {
        let (service, alice, _) = setup_test_service().await;
        let start = Utc::now();
        let event = service.create(event_input("Recital", start, 2), alice).await.unwrap();

        let bad = UpdateEventInput {
            end_time: Some(start - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(
            service.update(event.id, bad).await,
            Err(ServiceError::ValidationError(_))
        ));

        let rename = UpdateEventInput {
            title: Some("Spring recital".to_string()),
            ..Default::default()
        };
        assert_eq!(service.update(event.id, rename).await.unwrap().title, "Spring recital");
        assert!(matches!(
            service.update(9999, UpdateEventInput::default()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_complete_and_handoff() {
        let (service, alice, bob) = setup_test_service().await;
        let event = service.create(event_input("Pickup", Utc::now(), 1), alice).await.unwrap();

        let claimed = service.claim(event.id, bob).await.unwrap();
        assert_eq!(claimed.assigned_to, Some(bob));
        assert_eq!(claimed.assignment_status, AssignmentStatus::Claimed);

        let handed = service.handoff(event.id, bob, alice).await.unwrap();
        assert_eq!(handed.assigned_to, Some(alice));
        assert_eq!(handed.handoff_history.len(), 1);

        let done = service.complete(event.id).await.unwrap();
        assert_eq!(done.assignment_status, AssignmentStatus::Completed);
        assert_eq!(done.assigned_to, Some(alice));
    }

    #[tokio::test]
    async fn test_delete_missing_event() {
        let (service, _, _) = setup_test_service().await;
        assert!(matches!(service.delete(42).await, Err(ServiceError::NotFound(_))));
    }
}
