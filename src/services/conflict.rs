//! Conflict service
//!
//! Detects schedule conflicts over family events and tracks their resolution.
//! The detectors are plain functions over a slice of events so they can run
//! without a database.

use crate::db::repositories::{ConflictRepository, EventRepository, UserRepository};
use crate::models::{
    Conflict, ConflictResolution, ConflictSeverity, ConflictStats, ConflictStatus, ConflictType,
    DetectedConflict, Event, EventRange, ResolutionAdvice, SeverityBreakdown,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const AREA_KEYWORDS: &[&str] = &["downtown", "mall", "school", "park", "center", "library"];

const CRITICAL_KEYWORDS: &[&str] = &[
    "doctor",
    "appointment",
    "medical",
    "dentist",
    "hospital",
    "school",
    "meeting",
    "interview",
    "presentation",
    "pickup",
    "drop-off",
    "daycare",
    "babysitter",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Minutes needed to get from one location to another
pub fn estimate_travel_minutes(from: Option<&str>, to: Option<&str>) -> i64 {
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from.to_lowercase(), to.to_lowercase()),
        _ => return 15,
    };
    if from == to {
        return 0;
    }
    if from.contains(&to) || to.contains(&from) {
        return 5;
    }
    let in_area = |loc: &str| AREA_KEYWORDS.iter().any(|k| loc.contains(k));
    if in_area(&from) && in_area(&to) {
        return 20;
    }
    15
}

fn is_critical_kind(event: &Event) -> bool {
    let text = format!(
        "{} {}",
        event.title,
        event.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    CRITICAL_KEYWORDS.iter().any(|k| text.contains(k))
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{}", n, unit, if n > 1 { "s" } else { "" })
}

/// Human-readable time until an event starts
pub fn format_time_remaining(remaining: Duration) -> String {
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    if hours > 24 {
        plural(hours / 24, "day")
    } else if hours > 0 {
        let mut text = plural(hours, "hour");
        if minutes > 0 {
            text.push_str(&format!(" {} min", minutes));
        }
        text
    } else {
        plural(minutes, "minute")
    }
}

fn overlaps(a: &Event, b: &Event) -> bool {
    a.start_time < b.end_time && b.start_time < a.end_time
}

fn user_name(names: &HashMap<i64, String>, user_id: i64) -> String {
    names
        .get(&user_id)
        .cloned()
        .unwrap_or_else(|| format!("User {}", user_id))
}

pub fn detect_time_overlaps(events: &[Event], names: &HashMap<i64, String>) -> Vec<DetectedConflict> {
    let mut found = Vec::new();
    for (i, first) in events.iter().enumerate() {
        for second in &events[i + 1..] {
            let assignee = match (first.assigned_to, second.assigned_to) {
                (Some(a), Some(b)) if a == b => a,
                _ => continue,
            };
            if !overlaps(first, second) {
                continue;
            }
            let overlap_start = first.start_time.max(second.start_time);
            let overlap_end = first.end_time.min(second.end_time);
            found.push(DetectedConflict {
                conflict_type: ConflictType::TimeOverlap,
                severity: ConflictSeverity::High,
                title: "Double-booked Person".to_string(),
                description: format!(
                    "{} is assigned to overlapping events: \"{}\" and \"{}\"",
                    user_name(names, assignee),
                    first.title,
                    second.title
                ),
                affected_events: vec![first.id, second.id],
                affected_users: vec![assignee],
                affected_resources: vec![],
                resolution_suggestions: strings(&[
                    "Reassign one event to another person",
                    "Move one event to a different time",
                    "Set up backup person for one event",
                    "Consider if events can be combined or one skipped",
                ]),
                metadata: json!({
                    "overlap_start": overlap_start,
                    "overlap_end": overlap_end,
                    "overlap_duration_minutes": (overlap_end - overlap_start).num_minutes(),
                }),
            });
        }
    }
    found
}

pub fn detect_travel_gaps(events: &[Event], names: &HashMap<i64, String>) -> Vec<DetectedConflict> {
    let mut by_person: BTreeMap<i64, Vec<&Event>> = BTreeMap::new();
    for event in events {
        if let (Some(user), Some(_)) = (event.assigned_to, event.location.as_deref()) {
            by_person.entry(user).or_default().push(event);
        }
    }

    let mut found = Vec::new();
    for (user, mut list) in by_person {
        list.sort_by_key(|e| e.start_time);
        for pair in list.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let available = (next.start_time - current.end_time).num_seconds() as f64 / 60.0;
            let needed = estimate_travel_minutes(current.location.as_deref(), next.location.as_deref());
            if available >= needed as f64 {
                continue;
            }
            let deficit = needed as f64 - available;
            let from = current.location.as_deref().unwrap_or_default();
            let to = next.location.as_deref().unwrap_or_default();
            found.push(DetectedConflict {
                conflict_type: ConflictType::LocationTravel,
                severity: if deficit > 30.0 {
                    ConflictSeverity::High
                } else {
                    ConflictSeverity::Medium
                },
                title: "Insufficient Travel Time".to_string(),
                description: format!(
                    "{} has only {} minutes to travel from \"{}\" to \"{}\" (estimated {} minutes needed)",
                    user_name(names, user),
                    available.floor() as i64,
                    from,
                    to,
                    needed
                ),
                affected_events: vec![current.id, next.id],
                affected_users: vec![user],
                affected_resources: vec![],
                resolution_suggestions: strings(&[
                    "Add buffer time between events",
                    "Arrange carpool or faster transport",
                    "Move one event to reduce travel distance",
                    "Consider virtual attendance for one event",
                    "Delegate one event to backup person",
                ]),
                metadata: json!({
                    "available_travel_time": available,
                    "estimated_travel_time": needed,
                    "travel_deficit": deficit,
                    "from_location": from,
                    "to_location": to,
                }),
            });
        }
    }
    found
}

fn equipment(event: &Event) -> Vec<String> {
    event
        .resources
        .get("equipment")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn detect_resource_clashes(events: &[Event]) -> Vec<DetectedConflict> {
    let mut usage: BTreeMap<String, Vec<&Event>> = BTreeMap::new();
    for event in events {
        for item in equipment(event) {
            usage.entry(item).or_default().push(event);
        }
    }

    let mut found = Vec::new();
    for (resource, users) in usage {
        for (i, first) in users.iter().enumerate() {
            for second in &users[i + 1..] {
                if !overlaps(first, second) {
                    continue;
                }
                found.push(DetectedConflict {
                    conflict_type: ConflictType::ResourceConflict,
                    severity: ConflictSeverity::Medium,
                    title: "Resource Double-booked".to_string(),
                    description: format!(
                        "\"{}\" is needed for both \"{}\" and \"{}\" at overlapping times",
                        resource, first.title, second.title
                    ),
                    affected_events: vec![first.id, second.id],
                    affected_users: [first.assigned_to, second.assigned_to]
                        .into_iter()
                        .flatten()
                        .collect(),
                    affected_resources: vec![resource.clone()],
                    resolution_suggestions: strings(&[
                        "Obtain duplicate resource",
                        "Reschedule one event to avoid overlap",
                        "Find alternative resource",
                        "Share resource if timing allows",
                        "Remove resource requirement from one event",
                    ]),
                    metadata: json!({
                        "resource": resource,
                        "conflict_start": first.start_time.max(second.start_time),
                        "conflict_end": first.end_time.min(second.end_time),
                    }),
                });
            }
        }
    }
    found
}

pub fn detect_unassigned(events: &[Event], now: DateTime<Utc>) -> Vec<DetectedConflict> {
    let mut found = Vec::new();
    for event in events {
        let remaining = event.start_time - now;
        if event.assigned_to.is_some() || remaining <= Duration::zero() {
            continue;
        }
        let critical_kind = is_critical_kind(event);
        let (severity, suggestions) = if remaining < Duration::hours(4) {
            (
                ConflictSeverity::Critical,
                [
                    "URGENT: Assign immediately",
                    "Activate emergency contact",
                    "Consider canceling if no one available",
                    "Send immediate notifications to all family members",
                ],
            )
        } else if remaining < Duration::hours(24) {
            (
                ConflictSeverity::High,
                [
                    "Assign within next few hours",
                    "Send reminders to family members",
                    "Check if backup person available",
                    "Consider rescheduling if needed",
                ],
            )
        } else if event.priority <= 2 || critical_kind {
            (
                ConflictSeverity::Medium,
                [
                    "Schedule assignment discussion",
                    "Review event importance",
                    "Check family availability",
                    "Set reminder to assign closer to date",
                ],
            )
        } else {
            continue;
        };

        found.push(DetectedConflict {
            conflict_type: ConflictType::UnassignedCritical,
            severity,
            title: "Critical Event Unassigned".to_string(),
            description: format!(
                "\"{}\" starts in {} and has no one assigned",
                event.title,
                format_time_remaining(remaining)
            ),
            affected_events: vec![event.id],
            affected_users: vec![],
            affected_resources: vec![],
            resolution_suggestions: strings(&suggestions),
            metadata: json!({
                "time_to_event_hours": remaining.num_minutes() as f64 / 60.0,
                "event_priority": event.priority,
                "is_critical_type": critical_kind,
            }),
        });
    }
    found
}

/// Run every detector over events ordered by start time
pub fn detect_all(
    events: &[Event],
    names: &HashMap<i64, String>,
    now: DateTime<Utc>,
) -> Vec<DetectedConflict> {
    let mut found = detect_time_overlaps(events, names);
    found.extend(detect_travel_gaps(events, names));
    found.extend(detect_resource_clashes(events));
    found.extend(detect_unassigned(events, now));
    found
}

/// First two suggestions are primary, the rest alternatives
pub fn advise(severity: ConflictSeverity, suggestions: &[String]) -> ResolutionAdvice {
    let split = suggestions.len().min(2);
    ResolutionAdvice {
        primary_suggestions: suggestions[..split].to_vec(),
        alternative_suggestions: suggestions[split..].to_vec(),
        estimated_effort: if severity == ConflictSeverity::Critical {
            "high"
        } else {
            "medium"
        },
        recommended_action: suggestions.first().cloned(),
    }
}

/// A detected conflict together with the id of its stored row
#[derive(Debug, Clone, Serialize)]
pub struct StoredDetection {
    pub id: i64,
    #[serde(flatten)]
    pub conflict: DetectedConflict,
}

#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub conflicts: Vec<StoredDetection>,
    pub date_range: DateRange,
    pub total_conflicts: usize,
    pub severity_breakdown: SeverityBreakdown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BulkResolveOutcome {
    pub total_conflicts: usize,
    pub successful_resolutions: usize,
    pub failed_resolutions: usize,
}

pub struct ConflictService {
    conflicts: Arc<dyn ConflictRepository>,
    events: Arc<dyn EventRepository>,
    users: Arc<dyn UserRepository>,
}

impl ConflictService {
    pub fn new(
        conflicts: Arc<dyn ConflictRepository>,
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            conflicts,
            events,
            users,
        }
    }

    /// Detect and store conflicts among events inside `range`
    pub async fn detect(&self, range: DateRange) -> ServiceResult<DetectionReport> {
        if range.end < range.start {
            return Err(ServiceError::validation("End must be after start"));
        }
        let mut events = self
            .events
            .list(&EventRange {
                start: Some(range.start),
                end: Some(range.end),
            })
            .await
            .context("Failed to list events")?;
        // Recurring parents are templates; their instances are checked instead
        events.retain(|e| !e.is_recurring);
        let names: HashMap<i64, String> = self
            .users
            .list()
            .await
            .context("Failed to list users")?
            .into_iter()
            .map(|u| (u.id, u.display_name().to_string()))
            .collect();

        let mut conflicts = Vec::new();
        for conflict in detect_all(&events, &names, Utc::now()) {
            let id = self
                .conflicts
                .store(&conflict)
                .await
                .context("Failed to store conflict")?;
            conflicts.push(StoredDetection { id, conflict });
        }

        let severity_breakdown = SeverityBreakdown::count(conflicts.iter().map(|c| &c.conflict.severity));
        tracing::debug!(
            events = events.len(),
            conflicts = conflicts.len(),
            "Conflict detection finished"
        );
        Ok(DetectionReport {
            total_conflicts: conflicts.len(),
            conflicts,
            date_range: range,
            severity_breakdown,
        })
    }

    /// Detection over the next 48 hours
    pub async fn upcoming(&self) -> ServiceResult<DetectionReport> {
        let now = Utc::now();
        self.detect(DateRange {
            start: now,
            end: now + Duration::hours(48),
        })
        .await
    }

    /// Scheduler entry point; returns the number of conflicts seen
    pub async fn scan(&self) -> ServiceResult<usize> {
        Ok(self.upcoming().await?.total_conflicts)
    }

    pub async fn active(&self, limit: Option<i64>) -> ServiceResult<Vec<Conflict>> {
        Ok(self
            .conflicts
            .list_active(limit)
            .await
            .context("Failed to list active conflicts")?)
    }

    pub async fn count_active(&self) -> ServiceResult<i64> {
        Ok(self
            .conflicts
            .count_active()
            .await
            .context("Failed to count active conflicts")?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Conflict> {
        self.conflicts
            .get_by_id(id)
            .await
            .context("Failed to get conflict")?
            .ok_or_else(|| ServiceError::not_found("Conflict"))
    }

    pub async fn resolve(
        &self,
        id: i64,
        resolution: Option<ConflictResolution>,
        user_id: i64,
    ) -> ServiceResult<Conflict> {
        let resolution =
            resolution.ok_or_else(|| ServiceError::validation("Resolution data is required"))?;
        let data = resolution.data.unwrap_or_else(|| json!({}));
        let updated = self
            .conflicts
            .resolve(id, user_id, &resolution.actions, &data)
            .await
            .context("Failed to resolve conflict")?;
        if !updated {
            return Err(ServiceError::not_found("Conflict"));
        }
        tracing::info!(conflict_id = id, user_id, "Conflict resolved");
        self.get(id).await
    }

    async fn close(&self, id: i64, user_id: i64, status: ConflictStatus) -> ServiceResult<Conflict> {
        self.get(id).await?;
        let moved = self
            .conflicts
            .close(id, user_id, status)
            .await
            .context("Failed to update conflict")?;
        if !moved {
            return Err(ServiceError::validation("Conflict is not active"));
        }
        tracing::info!(conflict_id = id, user_id, status = %status, "Conflict closed");
        self.get(id).await
    }

    pub async fn acknowledge(&self, id: i64, user_id: i64) -> ServiceResult<Conflict> {
        self.close(id, user_id, ConflictStatus::Acknowledged).await
    }

    pub async fn ignore(&self, id: i64, user_id: i64) -> ServiceResult<Conflict> {
        self.close(id, user_id, ConflictStatus::Ignored).await
    }

    pub async fn bulk_resolve(
        &self,
        ids: &[i64],
        resolution: Option<ConflictResolution>,
        user_id: i64,
    ) -> ServiceResult<BulkResolveOutcome> {
        if ids.is_empty() {
            return Err(ServiceError::validation("Array of conflict IDs is required"));
        }
        let resolution =
            resolution.ok_or_else(|| ServiceError::validation("Resolution data is required"))?;
        let data = resolution.data.clone().unwrap_or_else(|| json!({}));

        let mut successful = 0;
        for id in ids {
            if self
                .conflicts
                .resolve(*id, user_id, &resolution.actions, &data)
                .await
                .context("Failed to resolve conflict")?
            {
                successful += 1;
            }
        }
        tracing::info!(user_id, successful, total = ids.len(), "Bulk conflict resolution");
        Ok(BulkResolveOutcome {
            total_conflicts: ids.len(),
            successful_resolutions: successful,
            failed_resolutions: ids.len() - successful,
        })
    }

    pub async fn stats(&self, timeframe: &str) -> ServiceResult<ConflictStats> {
        let days = match timeframe {
            "week" => 7,
            "month" => 30,
            "year" => 365,
            other => {
                return Err(ServiceError::validation(format!(
                    "Invalid timeframe: {}",
                    other
                )))
            }
        };
        let counts = self
            .conflicts
            .counts_since(Utc::now() - Duration::days(days))
            .await
            .context("Failed to compute conflict statistics")?;
        let resolution_rate = if counts.total > 0 {
            (counts.resolved as f64 / counts.total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Ok(ConflictStats {
            total_conflicts: counts.total,
            by_type: counts.by_type,
            by_severity: counts.by_severity,
            by_status: counts.by_status,
            resolution_rate,
            timeframe: timeframe.to_string(),
        })
    }
}
