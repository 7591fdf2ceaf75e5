//! Handoff service
//!
//! Who covers what today, and moving events and tasks between family
//! members. Every move is logged as a notification row for the recipient.

use crate::db::repositories::{
    EventRepository, NewNotification, NotificationRepository, TaskRepository, UserRepository,
};
use crate::models::{
    local_day_bounds, AssignmentStatus, Event, HandoffRecord, Task, UpdateTaskInput, User,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_REASON: &str = "Manual reassignment";

#[derive(Debug, Default, Serialize)]
pub struct Responsibilities {
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TodayHandoffs {
    pub my_responsibilities: Responsibilities,
    pub partner_responsibilities: Responsibilities,
    pub unassigned: Responsibilities,
    pub backup_responsibilities: Responsibilities,
}

#[derive(Debug, Deserialize)]
pub struct ReassignInput {
    pub to_user_id: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwapInput {
    pub with_user_id: i64,
    pub their_event_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ReassignOutcome {
    pub message: &'static str,
    pub id: i64,
    pub new_assignee: String,
}

#[derive(Debug, Serialize)]
pub struct SwapOutcome {
    pub message: &'static str,
    pub you_now_have: String,
    pub they_now_have: String,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct TodayCounts {
    pub my_events: usize,
    pub partner_events: usize,
    pub unassigned_events: usize,
    pub my_tasks: usize,
    pub partner_tasks: usize,
    pub unassigned_tasks: usize,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct WeekCounts {
    pub handoffs_given: i64,
    pub handoffs_received: i64,
}

#[derive(Debug, Serialize)]
pub struct HandoffStats {
    pub today: TodayCounts,
    pub week: WeekCounts,
}

#[derive(Debug, Serialize)]
pub struct HandoffUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
}

/// Which side of the caller an assignee falls on
fn side(assigned_to: Option<i64>, me: i64) -> usize {
    match assigned_to {
        Some(id) if id == me => 0,
        Some(_) => 1,
        None => 2,
    }
}

pub struct HandoffService {
    events: Arc<dyn EventRepository>,
    tasks: Arc<dyn TaskRepository>,
    users: Arc<dyn UserRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl HandoffService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        tasks: Arc<dyn TaskRepository>,
        users: Arc<dyn UserRepository>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            events,
            tasks,
            users,
            notifications,
        }
    }

    async fn todays_work(&self) -> ServiceResult<(Vec<Event>, Vec<Task>)> {
        let (start, end) = local_day_bounds(Local::now().date_naive());
        let mut events = self
            .events
            .list_starting_between(start, end)
            .await
            .context("Failed to list today's events")?;
        events.retain(|e| !e.is_recurring);
        let tasks = self
            .tasks
            .list_due_between(None, start, end)
            .await
            .context("Failed to list today's tasks")?;
        Ok((events, tasks))
    }

    async fn user(&self, id: i64, missing: &str) -> ServiceResult<User> {
        self.users
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ServiceError::not_found(missing))
    }

    async fn log(
        &self,
        user_id: i64,
        notification_type: &str,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> ServiceResult<()> {
        self.notifications
            .insert(&NewNotification {
                user_id,
                notification_type,
                title,
                message: message.trim_end(),
                data: &data,
                sent_via: None,
            })
            .await
            .context("Failed to log handoff notification")?;
        Ok(())
    }

    pub async fn today(&self, user_id: i64) -> ServiceResult<TodayHandoffs> {
        let (events, tasks) = self.todays_work().await?;

        let mut buckets: [Responsibilities; 3] = Default::default();
        let backup = Responsibilities {
            events: events
                .iter()
                .filter(|e| e.backup_assignee == Some(user_id))
                .cloned()
                .collect(),
            tasks: Vec::new(),
        };
        for event in events {
            buckets[side(event.assigned_to, user_id)].events.push(event);
        }
        for task in tasks {
            buckets[side(task.assigned_to, user_id)].tasks.push(task);
        }

        let [mine, partner, unassigned] = buckets;
        Ok(TodayHandoffs {
            my_responsibilities: mine,
            partner_responsibilities: partner,
            unassigned,
            backup_responsibilities: backup,
        })
    }

    pub async fn reassign_event(
        &self,
        event_id: i64,
        input: ReassignInput,
        caller: &User,
    ) -> ServiceResult<ReassignOutcome> {
        let event = self
            .events
            .get_by_id(event_id)
            .await
            .context("Failed to get event")?
            .ok_or_else(|| ServiceError::not_found("Event"))?;
        let assignee = self.user(input.to_user_id, "New assignee").await?;
        let reason = input.reason.unwrap_or_else(|| DEFAULT_REASON.to_string());

        let record = HandoffRecord {
            reason: Some(reason.clone()),
            handoff_by: Some(caller.id),
            ..HandoffRecord::new(event.assigned_to.unwrap_or(caller.id), assignee.id)
        };
        self.events
            .record_handoff(event_id, &record)
            .await
            .context("Failed to record handoff")?
            .ok_or_else(|| ServiceError::not_found("Event"))?;
        self.events
            .set_assignment(event_id, Some(assignee.id), AssignmentStatus::Claimed)
            .await
            .context("Failed to update assignment")?;

        self.log(
            assignee.id,
            "event_handoff",
            "Event Assigned to You",
            &format!(
                "{} assigned \"{}\" to you. {}",
                caller.display_name(),
                event.title,
                reason
            ),
            json!({
                "event_id": event_id,
                "event_title": event.title,
                "from_user": caller.username,
                "from_user_id": caller.id,
                "reason": reason,
            }),
        )
        .await?;

        tracing::info!(event_id, from = caller.id, to = assignee.id, "Event reassigned");
        Ok(ReassignOutcome {
            message: "Event reassigned successfully",
            id: event_id,
            new_assignee: assignee.display_name().to_string(),
        })
    }

    pub async fn reassign_task(
        &self,
        task_id: i64,
        input: ReassignInput,
        caller: &User,
    ) -> ServiceResult<ReassignOutcome> {
        let task = self
            .tasks
            .get_by_id(task_id)
            .await
            .context("Failed to get task")?
            .ok_or_else(|| ServiceError::not_found("Task"))?;
        let assignee = self.user(input.to_user_id, "New assignee").await?;
        let reason = input.reason.unwrap_or_else(|| DEFAULT_REASON.to_string());

        self.tasks
            .update(
                task_id,
                &UpdateTaskInput {
                    assigned_to: Some(assignee.id),
                    ..Default::default()
                },
            )
            .await
            .context("Failed to reassign task")?;

        self.log(
            assignee.id,
            "task_handoff",
            "Task Assigned to You",
            &format!(
                "{} assigned task \"{}\" to you. {}",
                caller.display_name(),
                task.title,
                reason
            ),
            json!({
                "task_id": task_id,
                "task_title": task.title,
                "from_user": caller.username,
                "from_user_id": caller.id,
                "reason": reason,
            }),
        )
        .await?;

        tracing::info!(task_id, from = caller.id, to = assignee.id, "Task reassigned");
        Ok(ReassignOutcome {
            message: "Task reassigned successfully",
            id: task_id,
            new_assignee: assignee.display_name().to_string(),
        })
    }

    /// Trade the caller's event for one assigned to another user
    pub async fn swap(
        &self,
        my_event_id: i64,
        input: SwapInput,
        caller: &User,
    ) -> ServiceResult<SwapOutcome> {
        let assigned = |event: Option<Event>, user_id: i64| {
            event.filter(|e| e.assigned_to == Some(user_id))
        };
        let mine = assigned(
            self.events
                .get_by_id(my_event_id)
                .await
                .context("Failed to get event")?,
            caller.id,
        );
        let theirs = assigned(
            self.events
                .get_by_id(input.their_event_id)
                .await
                .context("Failed to get event")?,
            input.with_user_id,
        );
        let (Some(mine), Some(theirs)) = (mine, theirs) else {
            return Err(ServiceError::NotFound(
                "One or both events not found or not properly assigned".to_string(),
            ));
        };

        self.events
            .set_assignment(mine.id, Some(input.with_user_id), mine.assignment_status)
            .await
            .context("Failed to swap assignment")?;
        self.events
            .set_assignment(theirs.id, Some(caller.id), theirs.assignment_status)
            .await
            .context("Failed to swap assignment")?;

        self.log(
            input.with_user_id,
            "event_swap",
            "Event Swap Completed",
            &format!(
                "You now have \"{}\" and {} has \"{}\"",
                mine.title,
                caller.display_name(),
                theirs.title
            ),
            json!({
                "swapped_event_id": mine.id,
                "received_event_id": theirs.id,
                "with_user": caller.username,
            }),
        )
        .await?;

        tracing::info!(mine = mine.id, theirs = theirs.id, with = input.with_user_id, "Events swapped");
        Ok(SwapOutcome {
            message: "Event swap completed successfully",
            you_now_have: theirs.title,
            they_now_have: mine.title,
        })
    }

    pub async fn stats(&self, user_id: i64) -> ServiceResult<HandoffStats> {
        let (events, tasks) = self.todays_work().await?;
        let mut today = TodayCounts::default();
        for event in &events {
            match side(event.assigned_to, user_id) {
                0 => today.my_events += 1,
                1 => today.partner_events += 1,
                _ => today.unassigned_events += 1,
            }
        }
        for task in &tasks {
            match side(task.assigned_to, user_id) {
                0 => today.my_tasks += 1,
                1 => today.partner_tasks += 1,
                _ => today.unassigned_tasks += 1,
            }
        }

        let since = Utc::now() - Duration::days(7);
        let handoffs_given = self
            .notifications
            .count_of_type("event_handoff", None, Some(("from_user_id", user_id)), since)
            .await
            .context("Failed to count handoffs")?;
        let handoffs_received = self
            .notifications
            .count_of_type("event_handoff", Some(user_id), None, since)
            .await
            .context("Failed to count handoffs")?;

        Ok(HandoffStats {
            today,
            week: WeekCounts {
                handoffs_given,
                handoffs_received,
            },
        })
    }

    /// Everyone except the caller, by full name
    pub async fn users(&self, user_id: i64) -> ServiceResult<Vec<HandoffUser>> {
        let mut users: Vec<HandoffUser> = self
            .users
            .list()
            .await
            .context("Failed to list users")?
            .into_iter()
            .filter(|u| u.id != user_id)
            .map(|u| HandoffUser {
                id: u.id,
                username: u.username,
                full_name: u.full_name,
            })
            .collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }
}
