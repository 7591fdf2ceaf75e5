//! Checklist template and instance models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum ChecklistStatus ("checklist status") {
        #[default]
        Active => "active",
        Completed => "completed",
        Archived => "archived",
    }
}

/// A reusable list of preparation items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub items: Vec<serde_json::Value>,
    pub tags: Vec<String>,
    pub usage_count: i64,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A checkable item inside an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub checked: bool,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub custom: bool,
}

/// The materialized, checkable copy of a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistInstance {
    pub id: i64,
    pub template_id: Option<i64>,
    pub event_id: Option<i64>,
    pub title: String,
    pub items: Vec<ChecklistItem>,
    pub completion_percentage: f64,
    pub status: ChecklistStatus,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
}

impl ChecklistInstance {
    /// Percentage of checked items, rounded to two decimals.
    pub fn compute_completion(items: &[ChecklistItem]) -> f64 {
        if items.is_empty() {
            return 0.0;
        }
        let checked = items.iter().filter(|i| i.checked).count() as f64;
        (checked / items.len() as f64 * 10_000.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChecklistTemplateInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChecklistInstanceInput {
    #[serde(default)]
    pub template_id: Option<i64>,
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub custom_items: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, checked: bool) -> ChecklistItem {
        ChecklistItem {
            id: id.to_string(),
            text: id.to_string(),
            checked,
            added_at: Utc::now(),
            custom: false,
        }
    }

    #[test]
    fn test_compute_completion() {
        assert_eq!(ChecklistInstance::compute_completion(&[]), 0.0);
        let items = vec![item("a", true), item("b", false), item("c", false)];
        assert_eq!(ChecklistInstance::compute_completion(&items), 33.33);
        let items = vec![item("a", true), item("b", true)];
        assert_eq!(ChecklistInstance::compute_completion(&items), 100.0);
    }
}
