//! Preparation timeline models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The preparation steps attached to one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationTimeline {
    pub id: i64,
    pub event_id: i64,
    pub timeline_data: Vec<Value>,
    pub event_pattern: Option<String>,
    pub confidence: i64,
    pub completed_tasks: Vec<Value>,
    pub template_id: Option<i64>,
    pub is_custom: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_start_time: Option<DateTime<Utc>>,
}

/// A past event whose timeline came from a template
#[derive(Debug, Clone, Serialize)]
pub struct SimilarEventTimeline {
    pub event_id: i64,
    pub title: String,
    pub event_type: Option<String>,
    pub location: Option<String>,
    pub template_id: i64,
    pub template_name: Option<String>,
    pub template_description: Option<String>,
    pub timeline_data: Vec<Value>,
    pub template_items: Vec<Value>,
}
