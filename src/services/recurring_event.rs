//! Recurring event service
//!
//! A recurring parent is stored once as a template row. Instances are generated
//! day by day over the local calendar and stored as plain events, so every
//! other module (reminders, conflicts, handoffs) sees them like any event.

use crate::db::repositories::EventRepository;
use crate::models::{
    local_to_utc, CreateRecurringEventInput, Event, RecurrenceType, UpdateEventInput,
    UpdateRecurringEventInput,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::event::check_priority;
use anyhow::Context;
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use serde::Serialize;
use std::sync::Arc;

/// Days generated when a recurring event is created
pub const INITIAL_DAYS_AHEAD: i64 = 30;
/// Days kept generated by the periodic top-up
pub const TOP_UP_DAYS_AHEAD: i64 = 7;

#[derive(Debug, Serialize)]
pub struct RecurringEventCreated {
    pub parent: Event,
    pub instances: Vec<Event>,
}

#[derive(Debug, Serialize)]
pub struct GenerationResult {
    pub parent_id: i64,
    pub instances_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineStep {
    pub id: &'static str,
    pub text: &'static str,
    pub category: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub conditional: bool,
}

/// Starting point for common family routines
#[derive(Debug, Clone, Serialize)]
pub struct RoutineTemplate {
    pub name: &'static str,
    pub category: &'static str,
    pub event_type: &'static str,
    /// Minutes
    pub duration: u32,
    pub structured_checklist: Vec<RoutineStep>,
    pub suggested_times: Vec<&'static str>,
    pub recurrence_suggestions: Vec<RecurrenceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_days: Option<Vec<u32>>,
}

fn step(id: &'static str, text: &'static str, category: &'static str) -> RoutineStep {
    RoutineStep {
        id,
        text,
        category,
        conditional: false,
    }
}

pub fn routine_templates() -> Vec<RoutineTemplate> {
    vec![
        RoutineTemplate {
            name: "Bedtime Routine",
            category: "routine",
            event_type: "bedtime",
            duration: 60,
            structured_checklist: vec![
                step("brush_teeth", "Brush teeth", "hygiene"),
                step("pajamas", "Put on pajamas", "preparation"),
                step("story_time", "Read bedtime story", "activity"),
                step("lights_out", "Turn off lights", "environment"),
            ],
            suggested_times: vec!["19:30", "20:00", "20:30"],
            recurrence_suggestions: vec![RecurrenceType::Daily, RecurrenceType::Weekdays],
            default_days: None,
        },
        RoutineTemplate {
            name: "Morning Routine",
            category: "routine",
            event_type: "morning",
            duration: 45,
            structured_checklist: vec![
                step("wake_up", "Wake up", "start"),
                step("brush_teeth", "Brush teeth", "hygiene"),
                step("get_dressed", "Get dressed", "preparation"),
                step("breakfast", "Eat breakfast", "meal"),
                step("pack_bag", "Pack school/work bag", "preparation"),
            ],
            suggested_times: vec!["07:00", "07:30", "08:00"],
            recurrence_suggestions: vec![RecurrenceType::Daily, RecurrenceType::Weekdays],
            default_days: None,
        },
        RoutineTemplate {
            name: "Shower Night",
            category: "routine",
            event_type: "hygiene",
            duration: 30,
            structured_checklist: vec![
                step("prepare_towel", "Get clean towel", "preparation"),
                step("shower", "Take shower", "hygiene"),
                RoutineStep {
                    conditional: true,
                    ..step("dry_hair", "Dry hair if needed", "hygiene")
                },
            ],
            suggested_times: vec!["18:00", "19:00", "20:00"],
            recurrence_suggestions: vec![RecurrenceType::Custom],
            default_days: Some(vec![1, 3, 5]),
        },
    ]
}

/// Whether a parent with this recurrence has an instance on `date`
pub fn occurs_on(
    recurrence: RecurrenceType,
    days: &[u32],
    parent_weekday: Weekday,
    date: NaiveDate,
) -> bool {
    match recurrence {
        RecurrenceType::Daily => true,
        RecurrenceType::Weekly => date.weekday() == parent_weekday,
        RecurrenceType::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        RecurrenceType::Custom => days.contains(&date.weekday().num_days_from_sunday()),
    }
}

fn check_days(recurrence: RecurrenceType, days: &[u32]) -> ServiceResult<()> {
    if days.iter().any(|d| *d > 6) {
        return Err(ServiceError::validation(
            "Recurrence days must be between 0 (Sunday) and 6 (Saturday)",
        ));
    }
    if recurrence == RecurrenceType::Custom && days.is_empty() {
        return Err(ServiceError::validation(
            "Custom recurrence needs at least one day",
        ));
    }
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct RecurringEventService {
    repo: Arc<dyn EventRepository>,
}

impl RecurringEventService {
    pub fn new(repo: Arc<dyn EventRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        input: CreateRecurringEventInput,
        user_id: i64,
    ) -> ServiceResult<RecurringEventCreated> {
        let recurrence = input.recurrence_type.ok_or_else(|| {
            ServiceError::validation("Recurrence type is required for recurring events")
        })?;
        if input.event.title.trim().is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        if input.event.end_time < input.event.start_time {
            return Err(ServiceError::validation("End time must be after start time"));
        }
        if let Some(priority) = input.event.priority {
            check_priority(priority)?;
        }
        check_days(recurrence, &input.recurrence_days)?;

        let parent = self
            .repo
            .create_recurring(&input, Some(user_id))
            .await
            .context("Failed to create recurring event")?;
        let instances = self.generate(&parent, today(), INITIAL_DAYS_AHEAD).await?;
        tracing::info!(
            event_id = parent.id,
            user_id,
            recurrence = %recurrence,
            instances = instances.len(),
            "Recurring event created"
        );
        Ok(RecurringEventCreated { parent, instances })
    }

    /// Create the missing instances of `parent` from `from` through
    /// `from + days_ahead`, never before the parent's own start date
    pub async fn generate(
        &self,
        parent: &Event,
        from: NaiveDate,
        days_ahead: i64,
    ) -> ServiceResult<Vec<Event>> {
        let recurrence = match (parent.is_recurring, parent.recurrence_type) {
            (true, Some(recurrence)) => recurrence,
            _ => return Err(ServiceError::not_found("Recurring event")),
        };

        let local_start = parent.start_time.with_timezone(&Local);
        let time_of_day = local_start.time();
        let duration = parent.end_time - parent.start_time;
        let last = from + Duration::days(days_ahead);

        let mut instances = Vec::new();
        let mut date = from.max(local_start.date_naive());
        while date <= last {
            if parent.recurrence_end_date.is_some_and(|end| date > end) {
                break;
            }
            if occurs_on(recurrence, &parent.recurrence_days, local_start.weekday(), date)
                && !self
                    .repo
                    .instance_exists(parent.id, date)
                    .await
                    .context("Failed to check recurring instance")?
            {
                let start = local_to_utc(date.and_time(time_of_day));
                let instance = self
                    .repo
                    .create_instance(parent, start, start + duration, date)
                    .await
                    .context("Failed to create recurring instance")?;
                instances.push(instance);
            }
            date = date + Duration::days(1);
        }
        Ok(instances)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Event> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get event")?
            .filter(|e| e.is_recurring)
            .ok_or_else(|| ServiceError::not_found("Recurring event"))
    }

    pub async fn list(&self) -> ServiceResult<Vec<Event>> {
        Ok(self
            .repo
            .list_recurring()
            .await
            .context("Failed to list recurring events")?)
    }

    /// Instances dated today or later
    pub async fn instances(&self, id: i64) -> ServiceResult<Vec<Event>> {
        self.get(id).await?;
        Ok(self
            .repo
            .list_instances_from(id, today())
            .await
            .context("Failed to list recurring instances")?)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateRecurringEventInput,
        update_future: bool,
    ) -> ServiceResult<Event> {
        let current = self.get(id).await?;

        if input.event.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::validation("Title is required"));
        }
        let start = input.event.start_time.unwrap_or(current.start_time);
        let end = input.event.end_time.unwrap_or(current.end_time);
        if end < start {
            return Err(ServiceError::validation("End time must be after start time"));
        }
        if let Some(priority) = input.event.priority {
            check_priority(priority)?;
        }

        let recurrence_changed = input.recurrence_type.is_some()
            || input.recurrence_days.is_some()
            || input.recurrence_end_date.is_some();
        if recurrence_changed {
            let recurrence = input
                .recurrence_type
                .or(current.recurrence_type)
                .unwrap_or_default();
            let days = input
                .recurrence_days
                .clone()
                .unwrap_or_else(|| current.recurrence_days.clone());
            check_days(recurrence, &days)?;
            self.repo
                .set_recurrence(
                    id,
                    recurrence,
                    &days,
                    input.recurrence_end_date.or(current.recurrence_end_date),
                )
                .await
                .context("Failed to update recurrence")?;
        }

        self.repo
            .update(id, &input.event)
            .await
            .context("Failed to update recurring event")?;

        if update_future {
            let copied = UpdateEventInput {
                title: input.event.title.clone(),
                description: input.event.description.clone(),
                location: input.event.location.clone(),
                category: input.event.category.clone(),
                event_type: input.event.event_type.clone(),
                notes: input.event.notes.clone(),
                resources: input.event.resources.clone(),
                assigned_to: input.event.assigned_to,
                ..Default::default()
            };
            let instances = self
                .repo
                .list_instances_from(id, today())
                .await
                .context("Failed to list recurring instances")?;
            for instance in &instances {
                self.repo
                    .update(instance.id, &copied)
                    .await
                    .context("Failed to update recurring instance")?;
            }
            tracing::debug!(event_id = id, instances = instances.len(), "Updated future instances");
        }

        self.get(id).await
    }

    /// Delete a parent; past instances stay as standalone events
    pub async fn delete(&self, id: i64, delete_future: bool) -> ServiceResult<()> {
        self.get(id).await?;
        if delete_future {
            let removed = self
                .repo
                .delete_instances_from(id, today())
                .await
                .context("Failed to delete recurring instances")?;
            tracing::debug!(event_id = id, removed, "Deleted future instances");
        }
        self.repo
            .delete(id)
            .await
            .context("Failed to delete recurring event")?;
        Ok(())
    }

    /// Top up every parent; one failing parent does not stop the others
    pub async fn generate_missing(&self, days_ahead: i64) -> ServiceResult<Vec<GenerationResult>> {
        let mut results = Vec::new();
        for parent in self.list().await? {
            let result = match self.generate(&parent, today(), days_ahead).await {
                Ok(created) => GenerationResult {
                    parent_id: parent.id,
                    instances_created: created.len(),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(event_id = parent.id, error = %e, "Failed to generate instances");
                    GenerationResult {
                        parent_id: parent.id,
                        instances_created: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Scheduler entry point; returns the number of instances created
    pub async fn top_up(&self) -> ServiceResult<usize> {
        Ok(self
            .generate_missing(TOP_UP_DAYS_AHEAD)
            .await?
            .iter()
            .map(|r| r.instances_created)
            .sum())
    }
}
