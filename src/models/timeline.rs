//! Timeline learning models: usage observations, pattern insights and suggestions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum SuggestionType ("suggestion type") {
        AddFrequentTask => "add_frequent_task",
        AdjustTiming => "adjust_timing",
        RemoveUnusedTask => "remove_unused_task",
        #[default]
        TemplateImprovement => "template_improvement",
        SeasonalAdjustment => "seasonal_adjustment",
        RecurringPattern => "recurring_pattern",
    }
}

string_enum! {
    pub enum SuggestionPriority ("suggestion priority") {
        Low => "low",
        #[default]
        Medium => "medium",
        High => "high",
    }
}

string_enum! {
    pub enum SuggestionStatus ("suggestion status") {
        #[default]
        Pending => "pending",
        Shown => "shown",
        Accepted => "accepted",
        Dismissed => "dismissed",
        PermanentlyDismissed => "permanently_dismissed",
    }
}

string_enum! {
    pub enum SuggestionFrequency ("suggestion frequency") {
        Minimal => "minimal",
        #[default]
        Normal => "normal",
        Frequent => "frequent",
    }
}

string_enum! {
    pub enum PatternStrength ("pattern strength") {
        Weak => "weak",
        #[default]
        Medium => "medium",
        Strong => "strong",
    }
}

string_enum! {
    /// What a detector observed
    pub enum InsightType ("insight type") {
        #[default]
        FrequentlyAddedTask => "frequently_added_task",
        FrequentlySkippedTask => "frequently_skipped_task",
        TimingPreference => "timing_preference",
        SeasonalPattern => "seasonal_pattern",
        DayOfWeekPattern => "day_of_week_pattern",
    }
}

impl InsightType {
    /// The suggestion an insight of this type turns into
    pub fn suggestion_type(&self) -> SuggestionType {
        match self {
            InsightType::FrequentlyAddedTask => SuggestionType::AddFrequentTask,
            InsightType::FrequentlySkippedTask => SuggestionType::RemoveUnusedTask,
            InsightType::TimingPreference => SuggestionType::AdjustTiming,
            InsightType::SeasonalPattern => SuggestionType::SeasonalAdjustment,
            InsightType::DayOfWeekPattern => SuggestionType::RecurringPattern,
        }
    }
}

/// One observed timeline task, as reported by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageRecordInput {
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_pattern: Option<String>,
    #[serde(default)]
    pub recurring_event_id: Option<String>,
    pub task_id: String,
    pub task_text: String,
    #[serde(default)]
    pub task_category: Option<String>,
    #[serde(default)]
    pub original_time_offset: i64,
    #[serde(default)]
    pub actual_time_offset: Option<i64>,
    #[serde(default)]
    pub was_completed: bool,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub was_skipped: bool,
    #[serde(default)]
    pub was_added_custom: bool,
    #[serde(default)]
    pub time_adjustment_minutes: i64,
    #[serde(default)]
    pub difficulty_rating: Option<i64>,
    #[serde(default)]
    pub usefulness_rating: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternInsight {
    pub id: i64,
    pub user_id: i64,
    pub pattern_type: InsightType,
    pub pattern_name: String,
    pub pattern_description: String,
    pub pattern_data: serde_json::Value,
    pub confidence_score: f64,
    pub observation_count: i64,
    pub event_pattern: Option<String>,
    pub pattern_strength: PatternStrength,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
}

/// An advisory suggestion; never applied without the user's response
#[derive(Debug, Clone, Serialize)]
pub struct TimelineSuggestion {
    pub id: i64,
    pub user_id: i64,
    pub suggestion_type: SuggestionType,
    pub title: String,
    pub description: String,
    pub suggestion_data: serde_json::Value,
    pub confidence_score: f64,
    pub priority: SuggestionPriority,
    pub status: SuggestionStatus,
    pub event_pattern: Option<String>,
    pub shown_count: i64,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionPreferences {
    pub user_id: i64,
    pub suggestion_frequency: SuggestionFrequency,
    pub auto_apply_low_risk: bool,
    pub show_timing_suggestions: bool,
    pub show_task_suggestions: bool,
    pub show_template_suggestions: bool,
    pub dismissed_suggestion_types: Vec<SuggestionType>,
    pub learning_mode: bool,
}

impl SuggestionPreferences {
    pub fn defaults(user_id: i64) -> Self {
        Self {
            user_id,
            suggestion_frequency: SuggestionFrequency::Normal,
            auto_apply_low_risk: false,
            show_timing_suggestions: true,
            show_task_suggestions: true,
            show_template_suggestions: true,
            dismissed_suggestion_types: Vec::new(),
            learning_mode: true,
        }
    }

    /// Whether the user wants suggestions derived from this insight type.
    pub fn allows(&self, insight: InsightType) -> bool {
        if self
            .dismissed_suggestion_types
            .contains(&insight.suggestion_type())
        {
            return false;
        }
        match insight {
            InsightType::FrequentlyAddedTask | InsightType::FrequentlySkippedTask => {
                self.show_task_suggestions
            }
            InsightType::TimingPreference | InsightType::DayOfWeekPattern => {
                self.show_timing_suggestions
            }
            InsightType::SeasonalPattern => self.show_template_suggestions,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSuggestionPreferencesInput {
    pub suggestion_frequency: Option<SuggestionFrequency>,
    pub auto_apply_low_risk: Option<bool>,
    pub show_timing_suggestions: Option<bool>,
    pub show_task_suggestions: Option<bool>,
    pub show_template_suggestions: Option<bool>,
    pub dismissed_suggestion_types: Option<Vec<SuggestionType>>,
    pub learning_mode: Option<bool>,
}

/// Suggestion counts by outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuggestionCounts {
    pub total_suggestions: i64,
    pub accepted_count: i64,
    pub dismissed_count: i64,
    pub permanently_dismissed_count: i64,
    pub active_count: i64,
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternTypeStat {
    pub pattern_type: String,
    pub count: i64,
    pub avg_confidence: f64,
    pub max_observations: i64,
}

/// Usage observations over the last 90 days
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_records: i64,
    pub completed_tasks: i64,
    pub skipped_tasks: i64,
    pub custom_tasks_added: i64,
    pub avg_usefulness: Option<f64>,
    pub avg_difficulty: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineStats {
    pub suggestions: SuggestionCounts,
    pub patterns: Vec<PatternTypeStat>,
    pub usage: UsageStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_gate_insights() {
        let mut prefs = SuggestionPreferences::defaults(1);
        assert!(prefs.allows(InsightType::FrequentlyAddedTask));
        assert!(prefs.allows(InsightType::SeasonalPattern));

        prefs.show_timing_suggestions = false;
        assert!(!prefs.allows(InsightType::TimingPreference));
        assert!(!prefs.allows(InsightType::DayOfWeekPattern));
        assert!(prefs.allows(InsightType::FrequentlySkippedTask));

        prefs
            .dismissed_suggestion_types
            .push(SuggestionType::RemoveUnusedTask);
        assert!(!prefs.allows(InsightType::FrequentlySkippedTask));
        assert!(prefs.allows(InsightType::FrequentlyAddedTask));
    }
}
