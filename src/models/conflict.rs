//! Schedule conflict models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

string_enum! {
    pub enum ConflictType ("conflict type") {
        #[default]
        TimeOverlap => "time_overlap",
        LocationTravel => "location_travel",
        ResourceConflict => "resource_conflict",
        UnassignedCritical => "unassigned_critical",
    }
}

string_enum! {
    pub enum ConflictSeverity ("conflict severity") {
        Low => "low",
        #[default]
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl ConflictSeverity {
    /// Sort rank, critical first
    pub fn rank(&self) -> u8 {
        match self {
            ConflictSeverity::Critical => 1,
            ConflictSeverity::High => 2,
            ConflictSeverity::Medium => 3,
            ConflictSeverity::Low => 4,
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, ConflictSeverity::Critical | ConflictSeverity::High)
    }
}

string_enum! {
    pub enum ConflictStatus ("conflict status") {
        #[default]
        Active => "active",
        Resolved => "resolved",
        Ignored => "ignored",
        Acknowledged => "acknowledged",
    }
}

/// A conflict found by a detector, before it is stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedConflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub title: String,
    pub description: String,
    pub affected_events: Vec<i64>,
    pub affected_users: Vec<i64>,
    pub affected_resources: Vec<String>,
    pub resolution_suggestions: Vec<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: i64,
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub title: String,
    pub description: String,
    pub affected_events: Vec<i64>,
    pub affected_users: Vec<i64>,
    pub affected_resources: Vec<String>,
    pub status: ConflictStatus,
    pub resolution_suggestions: Vec<String>,
    pub resolution_actions: Vec<Value>,
    pub resolution_data: Value,
    pub auto_generated: bool,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<i64>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConflictResolution {
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityBreakdown {
    pub fn count<'a>(severities: impl IntoIterator<Item = &'a ConflictSeverity>) -> Self {
        let mut breakdown = Self::default();
        for severity in severities {
            match severity {
                ConflictSeverity::Critical => breakdown.critical += 1,
                ConflictSeverity::High => breakdown.high += 1,
                ConflictSeverity::Medium => breakdown.medium += 1,
                ConflictSeverity::Low => breakdown.low += 1,
            }
        }
        breakdown
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictStats {
    pub total_conflicts: i64,
    pub by_type: std::collections::BTreeMap<String, i64>,
    pub by_severity: std::collections::BTreeMap<String, i64>,
    pub by_status: std::collections::BTreeMap<String, i64>,
    /// Percent resolved, one decimal
    pub resolution_rate: f64,
    pub timeframe: String,
}

/// Deterministic resolution advice derived from a conflict's suggestions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionAdvice {
    pub primary_suggestions: Vec<String>,
    pub alternative_suggestions: Vec<String>,
    pub estimated_effort: &'static str,
    pub recommended_action: Option<String>,
}
