//! Family note board model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum NotePriority ("note priority") {
        Low => "low",
        #[default]
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

string_enum! {
    pub enum NoteStatus ("note status") {
        #[default]
        Active => "active",
        Archived => "archived",
        Deleted => "deleted",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyNote {
    pub id: i64,
    pub content: String,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub priority: NotePriority,
    pub category: String,
    pub tags: Vec<String>,
    pub visible_to: Vec<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: NoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFamilyNoteInput {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visible_to: Vec<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFamilyNoteInput {
    pub content: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visible_to: Option<Vec<i64>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteStats {
    pub total: i64,
    pub active: i64,
    pub high_priority: i64,
    pub user_notes: i64,
    pub recent: i64,
}
