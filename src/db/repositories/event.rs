//! Event repository
//!
//! Calendar events, their assignment state and handoff history. Recurring
//! parents are template rows; their instances are ordinary events pointing back
//! through `parent_recurring_id`.

use crate::db::DynDatabasePool;
use crate::models::{
    parse_json_column, AssignmentStatus, CreateEventInput, CreateRecurringEventInput, Event,
    EventRange, HandoffRecord, RecurrenceType, UpdateEventInput,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

use super::family_member::json_object;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, input: &CreateEventInput, created_by: Option<i64>) -> Result<Event>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Event>>;

    async fn get_by_google_id(&self, google_event_id: &str) -> Result<Option<Event>>;

    /// Events with `start_time >= start` and `end_time <= end`, ordered by start time
    async fn list(&self, range: &EventRange) -> Result<Vec<Event>>;

    /// Events starting in `[from, to)`, ordered by start time
    async fn list_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Events starting in `[from, to)` that the user created or is assigned to
    async fn list_for_user_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    async fn update(&self, id: i64, input: &UpdateEventInput) -> Result<Option<Event>>;

    /// Set the assignee (when given) and the assignment status
    async fn set_assignment(
        &self,
        id: i64,
        assigned_to: Option<i64>,
        status: AssignmentStatus,
    ) -> Result<Option<Event>>;

    /// Hand the event to `record.to`, appending the record to the history
    async fn record_handoff(&self, id: i64, record: &HandoffRecord) -> Result<Option<Event>>;

    async fn set_google_event_id(&self, id: i64, google_event_id: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Insert a recurring parent row
    async fn create_recurring(
        &self,
        input: &CreateRecurringEventInput,
        created_by: Option<i64>,
    ) -> Result<Event>;

    /// Copy `parent` into a plain event at the given times
    async fn create_instance(
        &self,
        parent: &Event,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        instance_date: NaiveDate,
    ) -> Result<Event>;

    async fn instance_exists(&self, parent_id: i64, instance_date: NaiveDate) -> Result<bool>;

    /// Recurring parents ordered by title
    async fn list_recurring(&self) -> Result<Vec<Event>>;

    /// Instances of `parent_id` dated on or after `from`, ordered by start time
    async fn list_instances_from(&self, parent_id: i64, from: NaiveDate) -> Result<Vec<Event>>;

    async fn delete_instances_from(&self, parent_id: i64, from: NaiveDate) -> Result<u64>;

    async fn set_recurrence(
        &self,
        id: i64,
        recurrence_type: RecurrenceType,
        days: &[u32],
        end_date: Option<NaiveDate>,
    ) -> Result<()>;
}

pub struct SqlxEventRepository {
    pool: DynDatabasePool,
}

impl SqlxEventRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EventRepository> {
        Arc::new(Self::new(pool))
    }

    /// Write every mutable column of `event` back to its row
    async fn save(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET title = ?, description = ?, start_time = ?, end_time = ?, location = ?,
                calendar_id = ?, event_type = ?, category = ?, priority = ?,
                preparation_list = ?, resources = ?, notes = ?, assigned_to = ?,
                backup_assignee = ?, assignment_status = ?, handoff_history = ?,
                google_event_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.location)
        .bind(&event.calendar_id)
        .bind(&event.event_type)
        .bind(&event.category)
        .bind(event.priority)
        .bind(serde_json::to_string(&event.preparation_list)?)
        .bind(serde_json::to_string(&event.resources)?)
        .bind(&event.notes)
        .bind(event.assigned_to)
        .bind(event.backup_assignee)
        .bind(event.assignment_status.as_str())
        .bind(serde_json::to_string(&event.handoff_history)?)
        .bind(&event.google_event_id)
        .bind(event.updated_at)
        .bind(event.id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update event")?;
        Ok(())
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn create(&self, input: &CreateEventInput, created_by: Option<i64>) -> Result<Event> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO events (google_event_id, title, description, start_time, end_time,
                                location, calendar_id, event_type, category, priority,
                                preparation_list, resources, notes, created_by, assigned_to,
                                backup_assignee, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.google_event_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(&input.location)
        .bind(&input.calendar_id)
        .bind(&input.event_type)
        .bind(input.category.as_deref().unwrap_or("personal"))
        .bind(input.priority.unwrap_or(3))
        .bind(serde_json::to_string(
            input.preparation_list.as_deref().unwrap_or_default(),
        )?)
        .bind(serde_json::to_string(
            input.resources.as_ref().unwrap_or(&serde_json::json!({})),
        )?)
        .bind(&input.notes)
        .bind(created_by)
        .bind(input.assigned_to)
        .bind(input.backup_assignee)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create event")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Event vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get event")?;

        Ok(row.as_ref().map(row_to_event))
    }

    async fn get_by_google_id(&self, google_event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE google_event_id = ?")
            .bind(google_event_id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get event by Google id")?;

        Ok(row.as_ref().map(row_to_event))
    }

    async fn list(&self, range: &EventRange) -> Result<Vec<Event>> {
        let mut sql = String::from("SELECT * FROM events WHERE 1 = 1");
        if range.start.is_some() {
            sql.push_str(" AND start_time >= ?");
        }
        if range.end.is_some() {
            sql.push_str(" AND end_time <= ?");
        }
        sql.push_str(" ORDER BY start_time");

        let mut query = sqlx::query(&sql);
        if let Some(start) = range.start {
            query = query.bind(start);
        }
        if let Some(end) = range.end {
            query = query.bind(end);
        }

        let rows = query
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list events")?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn list_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE start_time >= ? AND start_time < ? ORDER BY start_time",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list events in window")?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn list_for_user_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE (created_by = ? OR assigned_to = ?)
              AND start_time >= ? AND start_time < ?
            ORDER BY start_time
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list user events")?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn update(&self, id: i64, input: &UpdateEventInput) -> Result<Option<Event>> {
        let Some(mut event) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(title) = &input.title {
            event.title = title.trim().to_string();
        }
        if input.description.is_some() {
            event.description = input.description.clone();
        }
        if let Some(start) = input.start_time {
            event.start_time = start;
        }
        if let Some(end) = input.end_time {
            event.end_time = end;
        }
        if input.location.is_some() {
            event.location = input.location.clone();
        }
        if input.calendar_id.is_some() {
            event.calendar_id = input.calendar_id.clone();
        }
        if input.event_type.is_some() {
            event.event_type = input.event_type.clone();
        }
        if let Some(category) = &input.category {
            event.category = category.clone();
        }
        if let Some(priority) = input.priority {
            event.priority = priority;
        }
        if let Some(list) = &input.preparation_list {
            event.preparation_list = list.clone();
        }
        if let Some(resources) = &input.resources {
            event.resources = resources.clone();
        }
        if input.notes.is_some() {
            event.notes = input.notes.clone();
        }
        if input.assigned_to.is_some() {
            event.assigned_to = input.assigned_to;
        }
        if input.backup_assignee.is_some() {
            event.backup_assignee = input.backup_assignee;
        }
        if let Some(status) = input.assignment_status {
            event.assignment_status = status;
        }
        event.updated_at = Utc::now();

        self.save(&event).await?;
        Ok(Some(event))
    }

    async fn set_assignment(
        &self,
        id: i64,
        assigned_to: Option<i64>,
        status: AssignmentStatus,
    ) -> Result<Option<Event>> {
        let Some(mut event) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        if assigned_to.is_some() {
            event.assigned_to = assigned_to;
        }
        event.assignment_status = status;
        event.updated_at = Utc::now();

        self.save(&event).await?;
        Ok(Some(event))
    }

    async fn record_handoff(&self, id: i64, record: &HandoffRecord) -> Result<Option<Event>> {
        let Some(mut event) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        event.handoff_history.push(record.clone());
        event.assigned_to = Some(record.to);
        event.updated_at = Utc::now();

        self.save(&event).await?;
        Ok(Some(event))
    }

    async fn set_google_event_id(&self, id: i64, google_event_id: &str) -> Result<()> {
        sqlx::query("UPDATE events SET google_event_id = ?, updated_at = ? WHERE id = ?")
            .bind(google_event_id)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to store Google event id")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete event")?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_recurring(
        &self,
        input: &CreateRecurringEventInput,
        created_by: Option<i64>,
    ) -> Result<Event> {
        let parent = self.create(&input.event, created_by).await?;
        sqlx::query(
            r#"
            UPDATE events
            SET is_recurring = 1, recurrence_type = ?, recurrence_days = ?, recurrence_end_date = ?
            WHERE id = ?
            "#,
        )
        .bind(input.recurrence_type.unwrap_or_default().as_str())
        .bind(serde_json::to_string(&input.recurrence_days)?)
        .bind(input.recurrence_end_date)
        .bind(parent.id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to mark event as recurring")?;

        self.get_by_id(parent.id)
            .await?
            .context("Recurring event vanished after insert")
    }

    async fn create_instance(
        &self,
        parent: &Event,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        instance_date: NaiveDate,
    ) -> Result<Event> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO events (title, description, start_time, end_time, location, calendar_id,
                                event_type, category, priority, preparation_list, resources, notes,
                                created_by, assigned_to, backup_assignee, parent_recurring_id,
                                recurrence_instance_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&parent.title)
        .bind(&parent.description)
        .bind(start)
        .bind(end)
        .bind(&parent.location)
        .bind(&parent.calendar_id)
        .bind(&parent.event_type)
        .bind(&parent.category)
        .bind(parent.priority)
        .bind(serde_json::to_string(&parent.preparation_list)?)
        .bind(serde_json::to_string(&parent.resources)?)
        .bind(&parent.notes)
        .bind(parent.created_by)
        .bind(parent.assigned_to)
        .bind(parent.backup_assignee)
        .bind(parent.id)
        .bind(instance_date)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create recurring instance")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Instance vanished after insert")
    }

    async fn instance_exists(&self, parent_id: i64, instance_date: NaiveDate) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE parent_recurring_id = ? AND recurrence_instance_date = ?",
        )
        .bind(parent_id)
        .bind(instance_date)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to look up recurring instance")?;

        Ok(count > 0)
    }

    async fn list_recurring(&self) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT * FROM events WHERE is_recurring = 1 ORDER BY title")
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list recurring events")?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn list_instances_from(&self, parent_id: i64, from: NaiveDate) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE parent_recurring_id = ? AND recurrence_instance_date >= ?
            ORDER BY start_time
            "#,
        )
        .bind(parent_id)
        .bind(from)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list recurring instances")?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn delete_instances_from(&self, parent_id: i64, from: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM events WHERE parent_recurring_id = ? AND recurrence_instance_date >= ?",
        )
        .bind(parent_id)
        .bind(from)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to delete recurring instances")?;

        Ok(result.rows_affected())
    }

    async fn set_recurrence(
        &self,
        id: i64,
        recurrence_type: RecurrenceType,
        days: &[u32],
        end_date: Option<NaiveDate>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET recurrence_type = ?, recurrence_days = ?, recurrence_end_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(recurrence_type.as_str())
        .bind(serde_json::to_string(days)?)
        .bind(end_date)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update recurrence")?;
        Ok(())
    }
}

fn row_to_event(row: &SqliteRow) -> Event {
    let status: String = row.get("assignment_status");
    let prep: String = row.get("preparation_list");
    let resources: String = row.get("resources");
    let history: String = row.get("handoff_history");
    let recurrence_type: Option<String> = row.get("recurrence_type");
    let recurrence_days: String = row.get("recurrence_days");

    Event {
        id: row.get("id"),
        google_event_id: row.get("google_event_id"),
        title: row.get("title"),
        description: row.get("description"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        location: row.get("location"),
        calendar_id: row.get("calendar_id"),
        event_type: row.get("event_type"),
        category: row.get("category"),
        priority: row.get("priority"),
        preparation_list: parse_json_column(&prep),
        resources: json_object(&resources),
        notes: row.get("notes"),
        created_by: row.get("created_by"),
        assigned_to: row.get("assigned_to"),
        backup_assignee: row.get("backup_assignee"),
        assignment_status: status.parse().unwrap_or_default(),
        handoff_history: parse_json_column(&history),
        is_recurring: row.get("is_recurring"),
        recurrence_type: recurrence_type.and_then(|t| t.parse().ok()),
        recurrence_days: parse_json_column(&recurrence_days),
        recurrence_end_date: row.get("recurrence_end_date"),
        parent_recurring_id: row.get("parent_recurring_id"),
        recurrence_instance_date: row.get("recurrence_instance_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    pub(crate) fn event_input(title: &str, start: DateTime<Utc>, hours: i64) -> CreateEventInput {
        CreateEventInput {
            title: title.to_string(),
            start_time: start,
            end_time: start + Duration::hours(hours),
            ..Default::default()
        }
    }

    async fn setup_test_repo() -> (SqlxEventRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users.create(&new_user("alice")).await.unwrap().id;
        let bob = users.create(&new_user("bob")).await.unwrap().id;
        (SqlxEventRepository::new(pool), alice, bob)
    }

    #[tokio::test]
    async fn test_create_event_defaults() {
        let (repo, alice, _) = setup_test_repo().await;
        let event = repo
            .create(&event_input("Soccer", Utc::now(), 1), Some(alice))
            .await
            .unwrap();
        assert_eq!(event.category, "personal");
        assert_eq!(event.priority, 3);
        assert_eq!(event.assignment_status, AssignmentStatus::Pending);
        assert!(event.preparation_list.is_empty());
        assert_eq!(event.created_by, Some(alice));
    }

    #[tokio::test]
    async fn test_list_respects_range() {
        let (repo, alice, _) = setup_test_repo().await;
        let base = Utc::now();
        repo.create(&event_input("early", base, 1), Some(alice)).await.unwrap();
        repo.create(&event_input("late", base + Duration::days(3), 1), Some(alice))
            .await
            .unwrap();

        let all = repo.list(&EventRange::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "early");

        let range = EventRange {
            start: Some(base + Duration::days(1)),
            end: None,
        };
        let later = repo.list(&range).await.unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].title, "late");
    }

    #[tokio::test]
    async fn test_list_for_user_between() {
        let (repo, alice, bob) = setup_test_repo().await;
        let base = Utc::now();
        let mut input = event_input("assigned", base, 1);
        input.assigned_to = Some(alice);
        repo.create(&input, Some(bob)).await.unwrap();
        repo.create(&event_input("bob only", base, 1), Some(bob)).await.unwrap();

        let events = repo
            .list_for_user_between(alice, base - Duration::hours(1), base + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "assigned");
    }

    #[tokio::test]
    async fn test_claim_and_handoff() {
        let (repo, alice, bob) = setup_test_repo().await;
        let event = repo
            .create(&event_input("Pickup", Utc::now(), 1), Some(alice))
            .await
            .unwrap();

        let claimed = repo
            .set_assignment(event.id, Some(alice), AssignmentStatus::Claimed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.assigned_to, Some(alice));
        assert_eq!(claimed.assignment_status, AssignmentStatus::Claimed);

        let record = HandoffRecord::new(alice, bob);
        let handed = repo.record_handoff(event.id, &record).await.unwrap().unwrap();
        assert_eq!(handed.assigned_to, Some(bob));
        assert_eq!(handed.handoff_history.len(), 1);

        let reloaded = repo.get_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(reloaded.handoff_history[0].to, bob);
    }

    #[tokio::test]
    async fn test_update_and_google_id() {
        let (repo, alice, _) = setup_test_repo().await;
        let event = repo
            .create(&event_input("Dentist", Utc::now(), 1), Some(alice))
            .await
            .unwrap();

        let update = UpdateEventInput {
            preparation_list: Some(vec!["Insurance card".to_string()]),
            ..Default::default()
        };
        let updated = repo.update(event.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.preparation_list, vec!["Insurance card"]);
        assert_eq!(updated.title, "Dentist");

        repo.set_google_event_id(event.id, "g-1").await.unwrap();
        let found = repo.get_by_google_id("g-1").await.unwrap().unwrap();
        assert_eq!(found.id, event.id);

        assert!(repo.delete(event.id).await.unwrap());
        assert!(repo.get_by_id(event.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recurring_parent_and_instances() {
        let (repo, alice, _) = setup_test_repo().await;
        let start = Utc::now();
        let input = CreateRecurringEventInput {
            event: event_input("Swim", start, 1),
            recurrence_type: Some(RecurrenceType::Custom),
            recurrence_days: vec![1, 3],
            recurrence_end_date: None,
        };
        let parent = repo.create_recurring(&input, Some(alice)).await.unwrap();
        assert!(parent.is_recurring);
        assert_eq!(parent.recurrence_type, Some(RecurrenceType::Custom));
        assert_eq!(parent.recurrence_days, vec![1, 3]);

        let day = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let later = NaiveDate::from_ymd_opt(2030, 1, 9).unwrap();
        let instance = repo
            .create_instance(&parent, start, start + Duration::hours(1), day)
            .await
            .unwrap();
        assert!(!instance.is_recurring);
        assert_eq!(instance.parent_recurring_id, Some(parent.id));
        assert_eq!(instance.recurrence_instance_date, Some(day));
        repo.create_instance(&parent, start, start, later).await.unwrap();

        assert!(repo.instance_exists(parent.id, day).await.unwrap());
        assert!(repo.create_instance(&parent, start, start, day).await.is_err());
        assert_eq!(repo.list_recurring().await.unwrap().len(), 1);
        assert_eq!(repo.list_instances_from(parent.id, later).await.unwrap().len(), 1);

        repo.set_recurrence(parent.id, RecurrenceType::Weekly, &[], Some(later))
            .await
            .unwrap();
        let reloaded = repo.get_by_id(parent.id).await.unwrap().unwrap();
        assert_eq!(reloaded.recurrence_type, Some(RecurrenceType::Weekly));
        assert_eq!(reloaded.recurrence_end_date, Some(later));

        assert_eq!(repo.delete_instances_from(parent.id, later).await.unwrap(), 1);
        assert!(repo.instance_exists(parent.id, day).await.unwrap());
    }
}
