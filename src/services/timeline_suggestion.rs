//! Timeline suggestion engine
//!
//! Records how families actually use their preparation timelines, detects
//! recurring patterns in those observations and turns strong patterns into
//! advisory suggestions. Nothing here edits a template; accepted suggestions
//! only hand back instructions for the client to apply.

use crate::db::repositories::timeline::{NewInsight, NewSuggestion};
use crate::db::repositories::TimelineRepository;
use crate::models::{
    InsightType, PatternInsight, PatternStrength, SuggestionPreferences, SuggestionPriority,
    SuggestionStatus, SuggestionType, TimelineStats, TimelineSuggestion,
    UpdateSuggestionPreferencesInput, UsageRecordInput,
};
use crate::services::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Datelike, Duration, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const MIN_OBSERVATIONS: i64 = 3;
const HIGH_CONFIDENCE: f64 = 0.8;
const MEDIUM_CONFIDENCE: f64 = 0.6;
const COOLDOWN_HOURS: i64 = 24;
const SUGGESTION_TTL_DAYS: i64 = 30;

const ANALYSIS_WINDOW_DAYS: i64 = 90;
const SEASONAL_WINDOW_DAYS: i64 = 365;
const STRONG_INSIGHT_WINDOW_DAYS: i64 = 30;
const USAGE_RETENTION_DAYS: i64 = 180;

const MIN_SKIP_RATE: f64 = 0.7;
const MIN_TIMING_ADJUSTMENT: f64 = 5.0;

const DAY_NAMES: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];

/// Bucket for the local hour a usage row was recorded in
pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        0..=5 => "night",
        6..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

fn strength(confidence: f64) -> PatternStrength {
    if confidence >= HIGH_CONFIDENCE {
        PatternStrength::Strong
    } else {
        PatternStrength::Medium
    }
}

fn pattern_label(pattern: &Option<String>) -> &str {
    pattern.as_deref().unwrap_or("all")
}

fn frequently_added_confidence(frequency: i64, usefulness: Option<f64>) -> f64 {
    let frequency_score = (frequency as f64 / 10.0).min(1.0);
    let usefulness_score = usefulness.unwrap_or(3.0) / 5.0;
    frequency_score * 0.7 + usefulness_score * 0.3
}

fn skipped_confidence(skip_rate: f64, occurrences: i64) -> f64 {
    (skip_rate * occurrences as f64 / 10.0).min(1.0)
}

fn timing_confidence(adjustment: f64, frequency: i64) -> f64 {
    (adjustment.abs() / 30.0).min(1.0) * 0.6 + (frequency as f64 / 10.0).min(1.0) * 0.4
}

fn seasonal_confidence(trend_count: usize, average_frequency: f64) -> f64 {
    ((trend_count as f64 / 5.0) * 0.5 + (average_frequency / 5.0).min(1.0) * 0.5).min(1.0)
}

fn day_of_week_confidence(adjustment: f64, frequency: i64) -> f64 {
    (adjustment.abs() / 20.0).min(1.0) * 0.7 + (frequency as f64 / 8.0).min(1.0) * 0.3
}

/// One item of a finished timeline
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub time_offset: i64,
    #[serde(default)]
    pub actual_time_offset: Option<i64>,
    #[serde(default)]
    pub was_added_custom: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFeedback {
    pub task_id: String,
    #[serde(default)]
    pub difficulty: Option<i64>,
    #[serde(default)]
    pub usefulness: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionInput {
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_pattern: Option<String>,
    #[serde(default)]
    pub recurring_event_id: Option<String>,
    #[serde(default)]
    pub timeline_data: Option<Vec<TimelineItem>>,
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    #[serde(default)]
    pub feedback: Vec<TaskFeedback>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionSummary {
    pub message: String,
    pub records_created: usize,
}

/// What the client should change when it applies a suggestion
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionApplication {
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub data: Value,
    pub instructions: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupSummary {
    pub message: String,
    pub suggestions_removed: u64,
    pub patterns_removed: u64,
}

/// Instructions for carrying out a suggestion by hand
pub fn application_instructions(suggestion_type: SuggestionType, data: &Value) -> Value {
    match suggestion_type {
        SuggestionType::AddFrequentTask => json!({
            "action": "Add task to template",
            "taskText": data["taskText"],
            "timeOffset": data["recommendedTimeOffset"],
            "category": data["taskCategory"],
            "targetPattern": data["eventPattern"],
        }),
        SuggestionType::RemoveUnusedTask => json!({
            "action": "Remove task from template",
            "taskText": data["taskText"],
            "targetPattern": data["eventPattern"],
        }),
        SuggestionType::AdjustTiming => json!({
            "action": "Adjust timing",
            "taskCategory": data["taskCategory"],
            "adjustment": data["adjustmentMinutes"],
            "targetPattern": data["eventPattern"],
        }),
        _ => json!({ "action": "Manual review required" }),
    }
}

/// Build the suggestion an insight calls for
fn suggestion_for(insight: &PatternInsight, now: DateTime<Utc>) -> NewSuggestion {
    let data = &insight.pattern_data;
    let pattern = pattern_label(&insight.event_pattern);
    let task_text = data["taskText"].as_str().unwrap_or_default();
    let high_when = |high: bool| {
        if high {
            SuggestionPriority::High
        } else {
            SuggestionPriority::Medium
        }
    };

    let (title, description, mut suggestion_data, priority) = match insight.pattern_type {
        InsightType::FrequentlyAddedTask => (
            format!("Add \"{}\" to template?", task_text),
            format!(
                "You've added \"{}\" to {} recent {} events. Would you like to add it to the default template?",
                task_text, data["frequency"], pattern
            ),
            json!({
                "taskText": task_text,
                "taskCategory": data["taskCategory"],
                "recommendedTimeOffset": data["averageTimeOffset"],
                "eventPattern": insight.event_pattern,
                "frequency": data["frequency"],
                "confidence": insight.confidence_score,
            }),
            high_when(insight.confidence_score >= HIGH_CONFIDENCE),
        ),
        InsightType::FrequentlySkippedTask => {
            let skip_rate = data["skipRate"].as_f64().unwrap_or_default();
            (
                format!("Remove \"{}\" from template?", task_text),
                format!(
                    "You skip \"{}\" {}% of the time in {} events. Consider removing it from the template.",
                    task_text,
                    (skip_rate * 100.0).round(),
                    pattern
                ),
                json!({
                    "taskText": task_text,
                    "taskCategory": data["taskCategory"],
                    "skipRate": skip_rate,
                    "eventPattern": insight.event_pattern,
                    "totalOccurrences": data["totalOccurrences"],
                }),
                high_when(skip_rate >= 0.9),
            )
        }
        InsightType::TimingPreference => {
            let category = data["taskCategory"].as_str().unwrap_or_default();
            let adjustment = data["averageAdjustment"].as_f64().unwrap_or_default();
            let action = if adjustment > 0.0 { "increase" } else { "decrease" };
            (
                format!("Adjust {} timing?", category),
                format!(
                    "You typically {} {} time by {} minutes for {} events. Update the default timing?",
                    action, category, data["adjustmentAmount"], pattern
                ),
                json!({
                    "taskCategory": category,
                    "adjustmentMinutes": adjustment.round() as i64,
                    "frequency": data["frequency"],
                    "eventPattern": insight.event_pattern,
                    "newRecommendedTime": data["averageActualTime"].as_f64().map(|t| t.round() as i64),
                }),
                high_when(adjustment.abs() >= 15.0),
            )
        }
        InsightType::SeasonalPattern => {
            let season = data["season"].as_str().unwrap_or_default();
            (
                format!("{} adjustments detected", season),
                format!(
                    "Your preparation patterns change during {}. Consider creating seasonal variations.",
                    season
                ),
                data.clone(),
                SuggestionPriority::Medium,
            )
        }
        InsightType::DayOfWeekPattern => {
            let day = data["dayName"].as_str().unwrap_or_default();
            let adjustment = data["averageAdjustment"].as_f64().unwrap_or_default();
            (
                format!("{} pattern detected", day),
                format!(
                    "{} events on {}s seem to need different preparation. Consider adjusting the timing.",
                    pattern, day
                ),
                data.clone(),
                high_when(adjustment.abs() >= 20.0),
            )
        }
    };

    // Cooldown lookups match on the insight name inside the stored data
    suggestion_data["patternName"] = json!(insight.pattern_name);

    NewSuggestion {
        suggestion_type: insight.pattern_type.suggestion_type(),
        pattern_name: insight.pattern_name.clone(),
        title,
        description,
        data: suggestion_data,
        confidence: insight.confidence_score,
        priority,
        event_pattern: insight.event_pattern.clone(),
        expires_at: now + Duration::days(SUGGESTION_TTL_DAYS),
    }
}

pub struct TimelineSuggestionService {
    repo: Arc<dyn TimelineRepository>,
}

impl TimelineSuggestionService {
    pub fn new(repo: Arc<dyn TimelineRepository>) -> Self {
        Self { repo }
    }

    /// Store one observation, then re-run the analysis for the user
    pub async fn record_usage(&self, user_id: i64, usage: &UsageRecordInput) -> ServiceResult<()> {
        if usage.task_text.trim().is_empty() {
            return Err(ServiceError::validation("task_text is required"));
        }
        self.insert(user_id, usage, Utc::now()).await?;
        tracing::debug!(user_id, task = %usage.task_text, "Recorded timeline usage");
        self.analyze(user_id).await?;
        Ok(())
    }

    /// Store one observation per item of a finished timeline
    pub async fn record_completion(
        &self,
        user_id: i64,
        input: &CompletionInput,
    ) -> ServiceResult<CompletionSummary> {
        let items = input
            .timeline_data
            .as_ref()
            .ok_or_else(|| ServiceError::validation("Timeline data is required"))?;

        let now = Utc::now();
        let mut records_created = 0;
        for item in items {
            let completed = input.completed_tasks.contains(&item.id);
            let feedback = input.feedback.iter().find(|f| f.task_id == item.id);
            let actual = item.actual_time_offset.unwrap_or(item.time_offset);
            let usage = UsageRecordInput {
                event_id: input.event_id,
                event_type: input.event_type.clone(),
                event_pattern: input.event_pattern.clone(),
                recurring_event_id: input.recurring_event_id.clone(),
                task_id: item.id.clone(),
                task_text: item.text.clone(),
                task_category: Some(
                    item.category
                        .clone()
                        .unwrap_or_else(|| "preparation".to_string()),
                ),
                original_time_offset: item.time_offset,
                actual_time_offset: Some(actual),
                was_completed: completed,
                completion_time: completed.then_some(now),
                was_skipped: !completed,
                was_added_custom: item.id.starts_with("custom-") || item.was_added_custom,
                time_adjustment_minutes: actual - item.time_offset,
                difficulty_rating: feedback.and_then(|f| f.difficulty),
                usefulness_rating: feedback.and_then(|f| f.usefulness),
                notes: feedback.and_then(|f| f.notes.clone()),
            };

            match self.insert(user_id, &usage, now).await {
                Ok(_) => records_created += 1,
                Err(e) => tracing::warn!(user_id, task_id = %item.id, error = %e, "Failed to record timeline item"),
            }
        }

        if records_created > 0 {
            self.analyze(user_id).await?;
        }

        Ok(CompletionSummary {
            message: format!("Recorded {} usage patterns", records_created),
            records_created,
        })
    }

    async fn insert(
        &self,
        user_id: i64,
        usage: &UsageRecordInput,
        now: DateTime<Utc>,
    ) -> ServiceResult<i64> {
        let local = now.with_timezone(&Local);
        let day_of_week = local.weekday().num_days_from_sunday() as i64;
        let id = self
            .repo
            .insert_usage(user_id, usage, day_of_week, time_of_day(local.hour()), now)
            .await?;
        Ok(id)
    }

    /// Run every detector, then turn strong insights into suggestions.
    /// Returns the number of insights found in this run.
    pub async fn analyze(&self, user_id: i64) -> ServiceResult<usize> {
        let now = Utc::now();
        let mut insights = Vec::new();
        insights.extend(self.detect_added_tasks(user_id, now).await?);
        insights.extend(self.detect_skipped_tasks(user_id, now).await?);
        insights.extend(self.detect_timing(user_id, now).await?);
        insights.extend(self.detect_seasonal(user_id, now).await?);
        insights.extend(self.detect_day_of_week(user_id, now).await?);

        for insight in &insights {
            self.repo.upsert_insight(user_id, insight).await?;
        }
        let created = self.generate_suggestions(user_id, now).await?;

        tracing::debug!(user_id, insights = insights.len(), suggestions = created, "Timeline analysis finished");
        Ok(insights.len())
    }

    async fn detect_added_tasks(&self, user_id: i64, now: DateTime<Utc>) -> ServiceResult<Vec<NewInsight>> {
        let since = now - Duration::days(ANALYSIS_WINDOW_DAYS);
        let groups = self
            .repo
            .added_task_aggregates(user_id, since, MIN_OBSERVATIONS)
            .await?;

        Ok(groups
            .into_iter()
            .filter_map(|g| {
                let confidence = frequently_added_confidence(g.frequency, g.avg_usefulness);
                (confidence >= MEDIUM_CONFIDENCE).then(|| NewInsight {
                    pattern_type: InsightType::FrequentlyAddedTask,
                    pattern_name: format!("Custom task: {}", g.task_text),
                    description: format!(
                        "You frequently add \"{}\" to {} events",
                        g.task_text,
                        pattern_label(&g.event_pattern)
                    ),
                    data: json!({
                        "taskText": g.task_text,
                        "taskCategory": g.task_category,
                        "averageTimeOffset": g.avg_time_offset.round() as i64,
                        "frequency": g.frequency,
                        "averageUsefulness": g.avg_usefulness,
                        "averageDifficulty": g.avg_difficulty,
                    }),
                    confidence,
                    observation_count: g.frequency,
                    event_pattern: g.event_pattern,
                    strength: strength(confidence),
                })
            })
            .collect())
    }

    async fn detect_skipped_tasks(&self, user_id: i64, now: DateTime<Utc>) -> ServiceResult<Vec<NewInsight>> {
        let since = now - Duration::days(ANALYSIS_WINDOW_DAYS);
        let groups = self
            .repo
            .skipped_task_aggregates(user_id, since, MIN_OBSERVATIONS, MIN_SKIP_RATE)
            .await?;

        Ok(groups
            .into_iter()
            .filter_map(|g| {
                let skip_rate = g.skipped_count as f64 / g.total_occurrences.max(1) as f64;
                let confidence = skipped_confidence(skip_rate, g.total_occurrences);
                (confidence >= MEDIUM_CONFIDENCE).then(|| NewInsight {
                    pattern_type: InsightType::FrequentlySkippedTask,
                    pattern_name: format!("Often skipped: {}", g.task_text),
                    description: format!(
                        "You skip \"{}\" {}% of the time in {} events",
                        g.task_text,
                        (skip_rate * 100.0).round(),
                        pattern_label(&g.event_pattern)
                    ),
                    data: json!({
                        "taskText": g.task_text,
                        "taskCategory": g.task_category,
                        "skipRate": skip_rate,
                        "totalOccurrences": g.total_occurrences,
                        "skippedCount": g.skipped_count,
                        "averageUsefulness": g.avg_usefulness,
                        "averageDifficulty": g.avg_difficulty,
                    }),
                    confidence,
                    observation_count: g.total_occurrences,
                    event_pattern: g.event_pattern,
                    strength: strength(confidence),
                })
            })
            .collect())
    }

    async fn detect_timing(&self, user_id: i64, now: DateTime<Utc>) -> ServiceResult<Vec<NewInsight>> {
        let since = now - Duration::days(ANALYSIS_WINDOW_DAYS);
        let groups = self
            .repo
            .timing_aggregates(user_id, since, MIN_OBSERVATIONS, MIN_TIMING_ADJUSTMENT)
            .await?;

        Ok(groups
            .into_iter()
            .filter_map(|g| {
                let confidence = timing_confidence(g.avg_adjustment, g.frequency);
                let direction = if g.avg_adjustment > 0.0 { "more" } else { "less" };
                let amount = g.avg_adjustment.abs().round() as i64;
                (confidence >= MEDIUM_CONFIDENCE).then(|| NewInsight {
                    pattern_type: InsightType::TimingPreference,
                    pattern_name: format!("{} timing preference", g.task_category),
                    description: format!(
                        "You typically need {} minutes {} time for {} tasks in {} events",
                        amount,
                        direction,
                        g.task_category,
                        pattern_label(&g.event_pattern)
                    ),
                    data: json!({
                        "taskCategory": g.task_category,
                        "averageAdjustment": g.avg_adjustment,
                        "frequency": g.frequency,
                        "averageOriginalTime": g.avg_original_time,
                        "averageActualTime": g.avg_actual_time,
                        "adjustmentDirection": direction,
                        "adjustmentAmount": amount,
                    }),
                    confidence,
                    observation_count: g.frequency,
                    event_pattern: g.event_pattern,
                    strength: strength(confidence),
                })
            })
            .collect())
    }

    async fn detect_seasonal(&self, user_id: i64, now: DateTime<Utc>) -> ServiceResult<Vec<NewInsight>> {
        let since = now - Duration::days(SEASONAL_WINDOW_DAYS);
        let groups = self
            .repo
            .seasonal_aggregates(user_id, since, MIN_OBSERVATIONS)
            .await?;

        let mut by_season: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for group in groups {
            by_season.entry(group.season.clone()).or_default().push(group);
        }

        Ok(by_season
            .into_iter()
            .filter(|(_, trends)| trends.len() >= 2)
            .filter_map(|(season, trends)| {
                let total: i64 = trends.iter().map(|t| t.frequency).sum();
                let average = total as f64 / trends.len() as f64;
                let confidence = seasonal_confidence(trends.len(), average);
                (confidence >= MEDIUM_CONFIDENCE).then(|| NewInsight {
                    pattern_type: InsightType::SeasonalPattern,
                    pattern_name: format!("{} patterns", season),
                    description: format!("Your preparation patterns change during {}", season),
                    data: json!({
                        "season": season,
                        "trends": trends
                            .iter()
                            .map(|t| json!({
                                "eventPattern": t.event_pattern,
                                "taskCategory": t.task_category,
                                "frequency": t.frequency,
                                "averageAdjustment": t.avg_adjustment,
                            }))
                            .collect::<Vec<_>>(),
                    }),
                    confidence,
                    observation_count: total,
                    event_pattern: None,
                    strength: strength(confidence),
                })
            })
            .collect())
    }

    async fn detect_day_of_week(&self, user_id: i64, now: DateTime<Utc>) -> ServiceResult<Vec<NewInsight>> {
        let since = now - Duration::days(ANALYSIS_WINDOW_DAYS);
        let groups = self
            .repo
            .day_of_week_aggregates(user_id, since, MIN_OBSERVATIONS)
            .await?;

        Ok(groups
            .into_iter()
            .filter(|g| g.avg_adjustment.abs() >= 10.0 || g.avg_difficulty.unwrap_or_default() >= 4.0)
            .filter_map(|g| {
                let day_name = DAY_NAMES.get(g.day_of_week as usize).copied()?;
                let confidence = day_of_week_confidence(g.avg_adjustment, g.frequency);
                (confidence >= MEDIUM_CONFIDENCE).then(|| NewInsight {
                    pattern_type: InsightType::DayOfWeekPattern,
                    pattern_name: format!("{} pattern", day_name),
                    description: format!(
                        "{} events are different on {}s",
                        pattern_label(&g.event_pattern),
                        day_name
                    ),
                    data: json!({
                        "dayOfWeek": g.day_of_week,
                        "dayName": day_name,
                        "averageAdjustment": g.avg_adjustment,
                        "frequency": g.frequency,
                        "averageDifficulty": g.avg_difficulty,
                    }),
                    confidence,
                    observation_count: g.frequency,
                    event_pattern: g.event_pattern,
                    strength: strength(confidence),
                })
            })
            .collect())
    }

    async fn generate_suggestions(&self, user_id: i64, now: DateTime<Utc>) -> ServiceResult<usize> {
        let prefs = self.repo.get_preferences(user_id).await?;
        if !prefs.learning_mode {
            return Ok(0);
        }

        let strong = self
            .repo
            .strong_insights(user_id, now - Duration::days(STRONG_INSIGHT_WINDOW_DAYS))
            .await?;
        let cooldown_start = now - Duration::hours(COOLDOWN_HOURS);

        let mut created = 0;
        for insight in strong {
            if !prefs.allows(insight.pattern_type) {
                continue;
            }
            let suggestion_type = insight.pattern_type.suggestion_type();
            if self
                .repo
                .suggestion_created_since(user_id, suggestion_type, &insight.pattern_name, cooldown_start)
                .await?
            {
                continue;
            }

            let suggestion = suggestion_for(&insight, now);
            let id = self.repo.insert_suggestion(user_id, &suggestion).await?;
            tracing::info!(user_id, suggestion_id = id, kind = %suggestion_type, "Created timeline suggestion");
            created += 1;
        }
        Ok(created)
    }

    pub async fn list(&self, user_id: i64, limit: Option<i64>) -> ServiceResult<Vec<TimelineSuggestion>> {
        let limit = limit.unwrap_or(10).clamp(1, 100);
        Ok(self
            .repo
            .list_active_suggestions(user_id, Utc::now(), limit)
            .await?)
    }

    pub async fn for_event(
        &self,
        user_id: i64,
        event_pattern: Option<&str>,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<TimelineSuggestion>> {
        let pattern = event_pattern
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ServiceError::validation("Event pattern is required"))?;
        let limit = limit.unwrap_or(5).clamp(1, 100);
        Ok(self
            .repo
            .list_suggestions_for_pattern(user_id, pattern, Utc::now(), limit)
            .await?)
    }

    /// Record the user's answer to a suggestion
    pub async fn respond(&self, user_id: i64, id: i64, response: &str) -> ServiceResult<()> {
        let suggestion = self
            .repo
            .get_suggestion(user_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Suggestion"))?;

        let status: SuggestionStatus = response
            .parse()
            .map_err(|_| ServiceError::validation("Invalid response type"))?;
        if !matches!(
            status,
            SuggestionStatus::Accepted | SuggestionStatus::Dismissed | SuggestionStatus::PermanentlyDismissed
        ) {
            return Err(ServiceError::validation("Invalid response type"));
        }

        self.repo.set_suggestion_status(id, status).await?;

        if status == SuggestionStatus::PermanentlyDismissed {
            let mut prefs = self.repo.get_preferences(user_id).await?;
            if !prefs
                .dismissed_suggestion_types
                .contains(&suggestion.suggestion_type)
            {
                prefs.dismissed_suggestion_types.push(suggestion.suggestion_type);
                self.repo.save_preferences(&prefs).await?;
            }
        }

        tracing::info!(user_id, suggestion_id = id, response = %status, "Suggestion answered");
        Ok(())
    }

    pub async fn apply(&self, user_id: i64, id: i64) -> ServiceResult<SuggestionApplication> {
        let suggestion = self
            .repo
            .get_suggestion(user_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Suggestion"))?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(ServiceError::Conflict("Suggestion already processed".to_string()));
        }

        Ok(SuggestionApplication {
            suggestion_type: suggestion.suggestion_type,
            instructions: application_instructions(suggestion.suggestion_type, &suggestion.suggestion_data),
            data: suggestion.suggestion_data,
        })
    }

    pub async fn preferences(&self, user_id: i64) -> ServiceResult<SuggestionPreferences> {
        Ok(self.repo.get_preferences(user_id).await?)
    }

    pub async fn update_preferences(
        &self,
        user_id: i64,
        input: &UpdateSuggestionPreferencesInput,
    ) -> ServiceResult<SuggestionPreferences> {
        let mut prefs = self.repo.get_preferences(user_id).await?;
        if let Some(frequency) = input.suggestion_frequency {
            prefs.suggestion_frequency = frequency;
        }
        if let Some(value) = input.auto_apply_low_risk {
            prefs.auto_apply_low_risk = value;
        }
        if let Some(value) = input.show_timing_suggestions {
            prefs.show_timing_suggestions = value;
        }
        if let Some(value) = input.show_task_suggestions {
            prefs.show_task_suggestions = value;
        }
        if let Some(value) = input.show_template_suggestions {
            prefs.show_template_suggestions = value;
        }
        if let Some(types) = &input.dismissed_suggestion_types {
            prefs.dismissed_suggestion_types = types.clone();
        }
        if let Some(value) = input.learning_mode {
            prefs.learning_mode = value;
        }

        self.repo.save_preferences(&prefs).await?;
        Ok(prefs)
    }

    pub async fn insights(
        &self,
        user_id: i64,
        pattern_type: Option<&str>,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<PatternInsight>> {
        let pattern_type = pattern_type
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<InsightType>()
                    .map_err(|e| ServiceError::validation(e.to_string()))
            })
            .transpose()?;
        let limit = limit.unwrap_or(20).clamp(1, 100);
        let since = Utc::now() - Duration::days(ANALYSIS_WINDOW_DAYS);
        Ok(self
            .repo
            .list_insights(user_id, pattern_type, since, limit)
            .await?)
    }

    pub async fn stats(&self, user_id: i64) -> ServiceResult<TimelineStats> {
        let since = Utc::now() - Duration::days(ANALYSIS_WINDOW_DAYS);
        Ok(self.repo.stats(user_id, since).await?)
    }

    /// Drop answered suggestions older than `days_old` and stale usage rows
    pub async fn cleanup(&self, user_id: i64, days_old: Option<i64>) -> ServiceResult<CleanupSummary> {
        let days_old = days_old.unwrap_or(90);
        if days_old < 0 {
            return Err(ServiceError::validation("days_old must not be negative"));
        }
        let now = Utc::now();
        let (suggestions_removed, patterns_removed) = self
            .repo
            .cleanup(
                user_id,
                now - Duration::days(days_old),
                now - Duration::days(USAGE_RETENTION_DAYS),
            )
            .await?;

        tracing::info!(user_id, suggestions_removed, patterns_removed, "Timeline cleanup finished");
        Ok(CleanupSummary {
            message: "Cleanup completed".to_string(),
            suggestions_removed,
            patterns_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::timeline::tests::usage;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxTimelineRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (TimelineSuggestionService, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&new_user("planner"))
            .await
            .unwrap();
        (
            TimelineSuggestionService::new(SqlxTimelineRepository::boxed(pool)),
            user.id,
        )
    }

    fn custom_snacks() -> UsageRecordInput {
        let mut row = usage("Pack snacks", "soccer");
        row.was_added_custom = true;
        row.usefulness_rating = Some(5);
        row.task_category = Some("preparation".to_string());
        row
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(time_of_day(3), "night");
        assert_eq!(time_of_day(6), "morning");
        assert_eq!(time_of_day(12), "afternoon");
        assert_eq!(time_of_day(20), "evening");
        assert_eq!(time_of_day(21), "night");
    }

    #[test]
    fn test_confidence_formulas() {
        assert!((frequently_added_confidence(10, Some(5.0)) - 1.0).abs() < 1e-9);
        assert!((frequently_added_confidence(5, None) - 0.53).abs() < 1e-9);
        assert!((skipped_confidence(0.8, 10) - 0.8).abs() < 1e-9);
        assert!((timing_confidence(-30.0, 10) - 1.0).abs() < 1e-9);
        assert!((seasonal_confidence(2, 3.0) - 0.5).abs() < 1e-9);
        assert!((day_of_week_confidence(10.0, 4) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_application_instructions() {
        let data = json!({
            "taskText": "Pack snacks",
            "recommendedTimeOffset": -30,
            "taskCategory": "preparation",
            "eventPattern": "soccer",
        });
        let add = application_instructions(SuggestionType::AddFrequentTask, &data);
        assert_eq!(add["action"], "Add task to template");
        assert_eq!(add["timeOffset"], -30);
        assert_eq!(add["targetPattern"], "soccer");

        let other = application_instructions(SuggestionType::SeasonalAdjustment, &data);
        assert_eq!(other, json!({"action": "Manual review required"}));
    }

    #[tokio::test]
    async fn test_repeated_custom_task_becomes_one_suggestion() {
        let (service, user) = setup().await;
        for _ in 0..10 {
            service.record_usage(user, &custom_snacks()).await.unwrap();
        }

        let suggestions = service.list(user, None).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        let suggestion = &suggestions[0];
        assert_eq!(suggestion.suggestion_type, SuggestionType::AddFrequentTask);
        assert_eq!(suggestion.title, "Add \"Pack snacks\" to template?");
        assert_eq!(suggestion.priority, SuggestionPriority::High);
        assert_eq!(suggestion.event_pattern.as_deref(), Some("soccer"));

        let insights = service.insights(user, Some("frequently_added_task"), None).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].pattern_name, "Custom task: Pack snacks");

        let applied = service.apply(user, suggestion.id).await.unwrap();
        assert_eq!(applied.instructions["taskText"], "Pack snacks");
        assert_eq!(applied.instructions["targetPattern"], "soccer");
    }

    fn custom_task(text: &str) -> UsageRecordInput {
        let mut row = custom_snacks();
        row.task_id = format!("task-{}", text);
        row.task_text = text.to_string();
        row
    }

    #[tokio::test]
    async fn test_quoted_task_name_respects_cooldown() {
        let (service, user) = setup().await;
        for _ in 0..10 {
            service.record_usage(user, &custom_task("Pack \"big\" bag")).await.unwrap();
        }

        let suggestions = service.list(user, Some(50)).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Add \"Pack \"big\" bag\" to template?");
    }

    #[tokio::test]
    async fn test_prefix_task_name_gets_its_own_suggestion() {
        let (service, user) = setup().await;
        for _ in 0..10 {
            service.record_usage(user, &custom_task("Pack snacks")).await.unwrap();
        }
        for _ in 0..10 {
            service.record_usage(user, &custom_task("Pack")).await.unwrap();
        }

        let mut titles: Vec<String> = service
            .list(user, Some(50))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        titles.sort();
        assert_eq!(
            titles,
            vec![
                "Add \"Pack snacks\" to template?".to_string(),
                "Add \"Pack\" to template?".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_learning_mode_off_keeps_insights_only() {
        let (service, user) = setup().await;
        service
            .update_preferences(
                user,
                &UpdateSuggestionPreferencesInput {
                    learning_mode: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        for _ in 0..10 {
            service.record_usage(user, &custom_snacks()).await.unwrap();
        }
        assert!(service.list(user, None).await.unwrap().is_empty());
        assert_eq!(service.insights(user, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_dismissal_blocks_the_type() {
        let (service, user) = setup().await;
        for _ in 0..10 {
            service.record_usage(user, &custom_snacks()).await.unwrap();
        }
        let id = service.list(user, None).await.unwrap()[0].id;

        let err = service.respond(user, id, "maybe").await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        let err = service.respond(user + 1, id, "accepted").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        service.respond(user, id, "permanently_dismissed").await.unwrap();
        let prefs = service.preferences(user).await.unwrap();
        assert_eq!(prefs.dismissed_suggestion_types, vec![SuggestionType::AddFrequentTask]);

        let err = service.apply(user, id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(service.list(user, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_completion_derives_flags() {
        let (service, user) = setup().await;
        let input: CompletionInput = serde_json::from_value(json!({
            "event_id": 7,
            "event_pattern": "swim",
            "timeline_data": [
                {"id": "pack-bag", "text": "Pack bag", "time_offset": -60, "actual_time_offset": -75},
                {"id": "custom-1", "text": "Fill bottle", "time_offset": -15},
            ],
            "completed_tasks": ["pack-bag"],
            "feedback": [{"task_id": "pack-bag", "difficulty": 2, "usefulness": 5}],
        }))
        .unwrap();

        let summary = service.record_completion(user, &input).await.unwrap();
        assert_eq!(summary.records_created, 2);
        assert_eq!(summary.message, "Recorded 2 usage patterns");

        let usage = service.stats(user).await.unwrap().usage;
        assert_eq!(usage.total_records, 2);
        assert_eq!(usage.completed_tasks, 1);
        assert_eq!(usage.skipped_tasks, 1);
        assert_eq!(usage.custom_tasks_added, 1);

        let err = service
            .record_completion(user, &CompletionInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_for_event_requires_pattern() {
        let (service, user) = setup().await;
        let err = service.for_event(user, Some(" "), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        assert!(service.for_event(user, Some("soccer"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_rejects_negative_age() {
        let (service, user) = setup().await;
        assert!(service.cleanup(user, Some(-1)).await.is_err());
        let summary = service.cleanup(user, None).await.unwrap();
        assert_eq!((summary.suggestions_removed, summary.patterns_removed), (0, 0));
    }
}
