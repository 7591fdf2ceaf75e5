//! Task model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum TaskStatus ("task status") {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<i64>,
    pub family_member_id: Option<i64>,
    pub category: Option<String>,
    /// 1 (highest) to 5
    pub priority: i64,
    pub status: TaskStatus,
    pub checklist: Vec<serde_json::Value>,
    pub parent_event_id: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Full name of the assigned user, filled by joined queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_member_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    #[serde(default)]
    pub family_member_id: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub checklist: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub parent_event_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<i64>,
    pub family_member_id: Option<i64>,
    pub category: Option<String>,
    pub priority: Option<i64>,
    pub status: Option<TaskStatus>,
    pub checklist: Option<Vec<serde_json::Value>>,
    pub parent_event_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<i64>,
}
