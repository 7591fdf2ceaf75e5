//! Calendar event model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Who has taken responsibility for an event
    pub enum AssignmentStatus ("assignment status") {
        #[default]
        Pending => "pending",
        Claimed => "claimed",
        Completed => "completed",
    }
}

string_enum! {
    /// Which days a recurring event repeats on
    pub enum RecurrenceType ("recurrence type") {
        #[default]
        Daily => "daily",
        Weekly => "weekly",
        Weekdays => "weekdays",
        Custom => "custom",
    }
}

/// One transfer of responsibility between family members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub from: i64,
    pub to: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Who performed the handoff, when it was not `from`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_by: Option<i64>,
}

impl HandoffRecord {
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
            reason: None,
            handoff_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub google_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub calendar_id: Option<String>,
    pub event_type: Option<String>,
    pub category: String,
    pub priority: i64,
    pub preparation_list: Vec<String>,
    pub resources: serde_json::Value,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub assigned_to: Option<i64>,
    pub backup_assignee: Option<i64>,
    pub assignment_status: AssignmentStatus,
    pub handoff_history: Vec<HandoffRecord>,
    /// Set on recurring parents only; instances are plain events
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    /// Weekdays for `custom` recurrence, 0 = Sunday
    pub recurrence_days: Vec<u32>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_recurring_id: Option<i64>,
    pub recurrence_instance_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateEventInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub preparation_list: Option<Vec<String>>,
    #[serde(default)]
    pub resources: Option<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    #[serde(default)]
    pub backup_assignee: Option<i64>,
    /// Set by calendar sync, never by API clients
    #[serde(skip)]
    pub google_event_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEventInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub calendar_id: Option<String>,
    pub event_type: Option<String>,
    pub category: Option<String>,
    pub priority: Option<i64>,
    pub preparation_list: Option<Vec<String>>,
    pub resources: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub assigned_to: Option<i64>,
    pub backup_assignee: Option<i64>,
    pub assignment_status: Option<AssignmentStatus>,
}

/// Query window for listing events; either bound may be open.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRecurringEventInput {
    #[serde(flatten)]
    pub event: CreateEventInput,
    #[serde(default)]
    pub recurrence_type: Option<RecurrenceType>,
    #[serde(default)]
    pub recurrence_days: Vec<u32>,
    #[serde(default)]
    pub recurrence_end_date: Option<NaiveDate>,
}

/// Changes to a recurring parent; the event fields may be copied to future instances
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecurringEventInput {
    #[serde(flatten)]
    pub event: UpdateEventInput,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_days: Option<Vec<u32>>,
    pub recurrence_end_date: Option<NaiveDate>,
}
