//! Timeline learning repository
//!
//! Usage observations, the aggregate queries the pattern detectors run over
//! them, and the insight, suggestion and preference rows they produce.

use crate::db::DynDatabasePool;
use crate::models::{
    parse_json_column, InsightType, PatternInsight, PatternStrength, PatternTypeStat,
    SuggestionCounts, SuggestionPreferences, SuggestionPriority, SuggestionStatus,
    SuggestionType, TimelineStats, TimelineSuggestion, UsageRecordInput, UsageStats,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

use super::family_member::json_object;

const PRIORITY_RANK: &str =
    "CASE priority WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END DESC";

/// Custom tasks grouped by text and event pattern
#[derive(Debug, Clone)]
pub struct AddedTaskAggregate {
    pub task_text: String,
    pub task_category: String,
    pub event_pattern: Option<String>,
    pub avg_time_offset: f64,
    pub frequency: i64,
    pub avg_usefulness: Option<f64>,
    pub avg_difficulty: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SkippedTaskAggregate {
    pub task_text: String,
    pub task_category: String,
    pub event_pattern: Option<String>,
    pub total_occurrences: i64,
    pub skipped_count: i64,
    pub avg_usefulness: Option<f64>,
    pub avg_difficulty: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TimingAggregate {
    pub task_category: String,
    pub event_pattern: Option<String>,
    pub avg_adjustment: f64,
    pub frequency: i64,
    pub avg_original_time: f64,
    pub avg_actual_time: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SeasonalAggregate {
    pub season: String,
    pub event_pattern: Option<String>,
    pub task_category: String,
    pub frequency: i64,
    pub avg_adjustment: f64,
}

#[derive(Debug, Clone)]
pub struct DayOfWeekAggregate {
    pub day_of_week: i64,
    pub event_pattern: Option<String>,
    pub avg_adjustment: f64,
    pub frequency: i64,
    pub avg_difficulty: Option<f64>,
}

/// An insight produced by one detector run
#[derive(Debug, Clone)]
pub struct NewInsight {
    pub pattern_type: InsightType,
    pub pattern_name: String,
    pub description: String,
    pub data: Value,
    pub confidence: f64,
    pub observation_count: i64,
    pub event_pattern: Option<String>,
    pub strength: PatternStrength,
}

#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub suggestion_type: SuggestionType,
    /// Insight this suggestion was derived from; cooldowns match on it exactly
    pub pattern_name: String,
    pub title: String,
    pub description: String,
    pub data: Value,
    pub confidence: f64,
    pub priority: SuggestionPriority,
    pub event_pattern: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait TimelineRepository: Send + Sync {
    async fn insert_usage(
        &self,
        user_id: i64,
        usage: &UsageRecordInput,
        day_of_week: i64,
        time_of_day: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<i64>;

    async fn added_task_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
    ) -> Result<Vec<AddedTaskAggregate>>;

    /// Groups whose skip rate is at least `min_skip_rate`
    async fn skipped_task_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
        min_skip_rate: f64,
    ) -> Result<Vec<SkippedTaskAggregate>>;

    /// Groups of adjusted rows whose mean adjustment is at least `min_adjustment` minutes
    async fn timing_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
        min_adjustment: f64,
    ) -> Result<Vec<TimingAggregate>>;

    async fn seasonal_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
    ) -> Result<Vec<SeasonalAggregate>>;

    async fn day_of_week_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
    ) -> Result<Vec<DayOfWeekAggregate>>;

    /// Insert by `(user, pattern_name)`, or refresh the row and add to its observation count
    async fn upsert_insight(&self, user_id: i64, insight: &NewInsight) -> Result<()>;

    async fn list_insights(
        &self,
        user_id: i64,
        pattern_type: Option<InsightType>,
        observed_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PatternInsight>>;

    /// Strong insights, best first
    async fn strong_insights(
        &self,
        user_id: i64,
        observed_since: DateTime<Utc>,
    ) -> Result<Vec<PatternInsight>>;

    async fn insert_suggestion(&self, user_id: i64, suggestion: &NewSuggestion) -> Result<i64>;

    /// Whether a suggestion of this type was created for exactly `pattern_name` since `since`
    async fn suggestion_created_since(
        &self,
        user_id: i64,
        suggestion_type: SuggestionType,
        pattern_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool>;

    /// Pending or shown, unexpired suggestions, by priority, confidence and age
    async fn list_active_suggestions(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimelineSuggestion>>;

    /// Like `list_active_suggestions`, restricted to `event_pattern` or pattern-less rows,
    /// exact matches first
    async fn list_suggestions_for_pattern(
        &self,
        user_id: i64,
        event_pattern: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimelineSuggestion>>;

    async fn get_suggestion(&self, user_id: i64, id: i64) -> Result<Option<TimelineSuggestion>>;

    async fn set_suggestion_status(&self, id: i64, status: SuggestionStatus) -> Result<()>;

    /// Stored preferences, creating the default row on first read
    async fn get_preferences(&self, user_id: i64) -> Result<SuggestionPreferences>;

    async fn save_preferences(&self, prefs: &SuggestionPreferences) -> Result<()>;

    async fn stats(&self, user_id: i64, usage_since: DateTime<Utc>) -> Result<TimelineStats>;

    /// Delete dismissed suggestions answered before `responded_before` and usage
    /// rows older than `usage_before`. Returns both counts.
    async fn cleanup(
        &self,
        user_id: i64,
        responded_before: DateTime<Utc>,
        usage_before: DateTime<Utc>,
    ) -> Result<(u64, u64)>;
}

pub struct SqlxTimelineRepository {
    pool: DynDatabasePool,
}

impl SqlxTimelineRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TimelineRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TimelineRepository for SqlxTimelineRepository {
    async fn insert_usage(
        &self,
        user_id: i64,
        usage: &UsageRecordInput,
        day_of_week: i64,
        time_of_day: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO timeline_usage_patterns (
                user_id, event_id, event_type, event_pattern, recurring_event_id,
                task_id, task_text, task_category, original_time_offset, actual_time_offset,
                was_completed, completion_time, was_skipped, was_added_custom,
                time_adjustment_minutes, difficulty_rating, usefulness_rating, notes,
                day_of_week, time_of_day, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(usage.event_id)
        .bind(&usage.event_type)
        .bind(&usage.event_pattern)
        .bind(&usage.recurring_event_id)
        .bind(&usage.task_id)
        .bind(&usage.task_text)
        .bind(usage.task_category.as_deref().unwrap_or("preparation"))
        .bind(usage.original_time_offset)
        .bind(usage.actual_time_offset)
        .bind(usage.was_completed)
        .bind(usage.completion_time)
        .bind(usage.was_skipped)
        .bind(usage.was_added_custom)
        .bind(usage.time_adjustment_minutes)
        .bind(usage.difficulty_rating)
        .bind(usage.usefulness_rating)
        .bind(&usage.notes)
        .bind(day_of_week)
        .bind(time_of_day)
        .bind(recorded_at)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to record timeline usage")?;

        Ok(result.last_insert_rowid())
    }

    async fn added_task_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
    ) -> Result<Vec<AddedTaskAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT task_text, MAX(task_category) AS task_category, event_pattern,
                   AVG(original_time_offset) AS avg_time_offset,
                   COUNT(*) AS frequency,
                   AVG(usefulness_rating) AS avg_usefulness,
                   AVG(difficulty_rating) AS avg_difficulty
            FROM timeline_usage_patterns
            WHERE user_id = ? AND was_added_custom = 1 AND created_at > ?
            GROUP BY task_text, event_pattern
            HAVING COUNT(*) >= ?
            ORDER BY frequency DESC, avg_usefulness DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(min_observations)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to aggregate added tasks")?;

        Ok(rows
            .iter()
            .map(|row| AddedTaskAggregate {
                task_text: row.get("task_text"),
                task_category: row.get("task_category"),
                event_pattern: row.get("event_pattern"),
                avg_time_offset: row.get("avg_time_offset"),
                frequency: row.get("frequency"),
                avg_usefulness: row.get("avg_usefulness"),
                avg_difficulty: row.get("avg_difficulty"),
            })
            .collect())
    }

    async fn skipped_task_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
        min_skip_rate: f64,
    ) -> Result<Vec<SkippedTaskAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT task_text, MAX(task_category) AS task_category, event_pattern,
                   COUNT(*) AS total_occurrences,
                   SUM(CASE WHEN was_skipped = 1 THEN 1 ELSE 0 END) AS skipped_count,
                   AVG(usefulness_rating) AS avg_usefulness,
                   AVG(difficulty_rating) AS avg_difficulty
            FROM timeline_usage_patterns
            WHERE user_id = ? AND created_at > ?
            GROUP BY task_text, event_pattern
            HAVING COUNT(*) >= ?
               AND SUM(CASE WHEN was_skipped = 1 THEN 1 ELSE 0 END) * 1.0 / COUNT(*) >= ?
            ORDER BY SUM(CASE WHEN was_skipped = 1 THEN 1 ELSE 0 END) * 1.0 / COUNT(*) DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(min_observations)
        .bind(min_skip_rate)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to aggregate skipped tasks")?;

        Ok(rows
            .iter()
            .map(|row| SkippedTaskAggregate {
                task_text: row.get("task_text"),
                task_category: row.get("task_category"),
                event_pattern: row.get("event_pattern"),
                total_occurrences: row.get("total_occurrences"),
                skipped_count: row.get("skipped_count"),
                avg_usefulness: row.get("avg_usefulness"),
                avg_difficulty: row.get("avg_difficulty"),
            })
            .collect())
    }

    async fn timing_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
        min_adjustment: f64,
    ) -> Result<Vec<TimingAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT task_category, event_pattern,
                   AVG(time_adjustment_minutes) AS avg_adjustment,
                   COUNT(*) AS frequency,
                   AVG(original_time_offset) AS avg_original_time,
                   AVG(actual_time_offset) AS avg_actual_time
            FROM timeline_usage_patterns
            WHERE user_id = ? AND time_adjustment_minutes != 0 AND created_at > ?
            GROUP BY task_category, event_pattern
            HAVING COUNT(*) >= ? AND ABS(AVG(time_adjustment_minutes)) >= ?
            ORDER BY ABS(AVG(time_adjustment_minutes)) DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(min_observations)
        .bind(min_adjustment)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to aggregate timing adjustments")?;

        Ok(rows
            .iter()
            .map(|row| TimingAggregate {
                task_category: row.get("task_category"),
                event_pattern: row.get("event_pattern"),
                avg_adjustment: row.get("avg_adjustment"),
                frequency: row.get("frequency"),
                avg_original_time: row.get("avg_original_time"),
                avg_actual_time: row.get("avg_actual_time"),
            })
            .collect())
    }

    async fn seasonal_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
    ) -> Result<Vec<SeasonalAggregate>> {
        // created_at is stored as ISO-8601 text, so the month sits at offset 6.
        let rows = sqlx::query(
            r#"
            SELECT CASE
                       WHEN CAST(substr(created_at, 6, 2) AS INTEGER) IN (12, 1, 2) THEN 'winter'
                       WHEN CAST(substr(created_at, 6, 2) AS INTEGER) IN (3, 4, 5) THEN 'spring'
                       WHEN CAST(substr(created_at, 6, 2) AS INTEGER) IN (6, 7, 8) THEN 'summer'
                       ELSE 'fall'
                   END AS season,
                   event_pattern, task_category,
                   COUNT(*) AS frequency,
                   AVG(time_adjustment_minutes) AS avg_adjustment
            FROM timeline_usage_patterns
            WHERE user_id = ? AND created_at > ?
            GROUP BY season, event_pattern, task_category
            HAVING COUNT(*) >= ?
            ORDER BY frequency DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(min_observations)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to aggregate seasonal usage")?;

        Ok(rows
            .iter()
            .map(|row| SeasonalAggregate {
                season: row.get("season"),
                event_pattern: row.get("event_pattern"),
                task_category: row.get("task_category"),
                frequency: row.get("frequency"),
                avg_adjustment: row.get("avg_adjustment"),
            })
            .collect())
    }

    async fn day_of_week_aggregates(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        min_observations: i64,
    ) -> Result<Vec<DayOfWeekAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT day_of_week, event_pattern,
                   AVG(time_adjustment_minutes) AS avg_adjustment,
                   COUNT(*) AS frequency,
                   AVG(difficulty_rating) AS avg_difficulty
            FROM timeline_usage_patterns
            WHERE user_id = ? AND created_at > ?
            GROUP BY day_of_week, event_pattern
            HAVING COUNT(*) >= ?
            ORDER BY day_of_week, frequency DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(min_observations)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to aggregate usage by weekday")?;

        Ok(rows
            .iter()
            .map(|row| DayOfWeekAggregate {
                day_of_week: row.get("day_of_week"),
                event_pattern: row.get("event_pattern"),
                avg_adjustment: row.get("avg_adjustment"),
                frequency: row.get("frequency"),
                avg_difficulty: row.get("avg_difficulty"),
            })
            .collect())
    }

    async fn upsert_insight(&self, user_id: i64, insight: &NewInsight) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO timeline_pattern_insights (
                user_id, pattern_type, pattern_name, pattern_description, pattern_data,
                confidence_score, observation_count, event_pattern, pattern_strength,
                first_observed, last_observed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, pattern_name) DO UPDATE SET
                pattern_description = excluded.pattern_description,
                pattern_data = excluded.pattern_data,
                confidence_score = excluded.confidence_score,
                observation_count = observation_count + excluded.observation_count,
                pattern_strength = excluded.pattern_strength,
                last_observed = excluded.last_observed
            "#,
        )
        .bind(user_id)
        .bind(insight.pattern_type.as_str())
        .bind(&insight.pattern_name)
        .bind(&insight.description)
        .bind(insight.data.to_string())
        .bind(insight.confidence)
        .bind(insight.observation_count)
        .bind(&insight.event_pattern)
        .bind(insight.strength.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save pattern insight")?;
        Ok(())
    }

    async fn list_insights(
        &self,
        user_id: i64,
        pattern_type: Option<InsightType>,
        observed_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PatternInsight>> {
        let mut sql = String::from(
            "SELECT * FROM timeline_pattern_insights WHERE user_id = ? AND last_observed > ?",
        );
        if pattern_type.is_some() {
            sql.push_str(" AND pattern_type = ?");
        }
        sql.push_str(" ORDER BY confidence_score DESC, observation_count DESC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(user_id).bind(observed_since);
        if let Some(pattern_type) = pattern_type {
            query = query.bind(pattern_type.as_str());
        }
        let rows = query
            .bind(limit)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list pattern insights")?;

        Ok(rows.iter().map(row_to_insight).collect())
    }

    async fn strong_insights(
        &self,
        user_id: i64,
        observed_since: DateTime<Utc>,
    ) -> Result<Vec<PatternInsight>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM timeline_pattern_insights
            WHERE user_id = ? AND pattern_strength = 'strong' AND last_observed > ?
            ORDER BY confidence_score DESC, observation_count DESC
            "#,
        )
        .bind(user_id)
        .bind(observed_since)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list strong insights")?;

        Ok(rows.iter().map(row_to_insight).collect())
    }

    async fn insert_suggestion(&self, user_id: i64, s: &NewSuggestion) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO timeline_suggestions (
                user_id, suggestion_type, pattern_name, title, description, suggestion_data,
                confidence_score, priority, status, event_pattern, expires_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(s.suggestion_type.as_str())
        .bind(&s.pattern_name)
        .bind(&s.title)
        .bind(&s.description)
        .bind(s.data.to_string())
        .bind(s.confidence)
        .bind(s.priority.as_str())
        .bind(&s.event_pattern)
        .bind(s.expires_at)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save suggestion")?;

        Ok(result.last_insert_rowid())
    }

    async fn suggestion_created_since(
        &self,
        user_id: i64,
        suggestion_type: SuggestionType,
        pattern_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM timeline_suggestions
            WHERE user_id = ? AND suggestion_type = ? AND pattern_name = ? AND created_at > ?
            "#,
        )
        .bind(user_id)
        .bind(suggestion_type.as_str())
        .bind(pattern_name)
        .bind(since)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to check suggestion cooldown")?;

        Ok(count > 0)
    }

    async fn list_active_suggestions(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimelineSuggestion>> {
        let sql = format!(
            r#"
            SELECT * FROM timeline_suggestions
            WHERE user_id = ? AND status IN ('pending', 'shown')
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY {}, confidence_score DESC, created_at DESC
            LIMIT ?
            "#,
            PRIORITY_RANK
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(now)
            .bind(limit)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list suggestions")?;

        Ok(rows.iter().map(row_to_suggestion).collect())
    }

    async fn list_suggestions_for_pattern(
        &self,
        user_id: i64,
        event_pattern: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimelineSuggestion>> {
        let sql = format!(
            r#"
            SELECT * FROM timeline_suggestions
            WHERE user_id = ? AND status IN ('pending', 'shown')
              AND (event_pattern = ? OR event_pattern IS NULL)
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY CASE WHEN event_pattern = ? THEN 0 ELSE 1 END,
                     {}, confidence_score DESC, created_at DESC
            LIMIT ?
            "#,
            PRIORITY_RANK
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(event_pattern)
            .bind(now)
            .bind(event_pattern)
            .bind(limit)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list suggestions for event")?;

        Ok(rows.iter().map(row_to_suggestion).collect())
    }

    async fn get_suggestion(&self, user_id: i64, id: i64) -> Result<Option<TimelineSuggestion>> {
        let row = sqlx::query("SELECT * FROM timeline_suggestions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get suggestion")?;

        Ok(row.as_ref().map(row_to_suggestion))
    }

    async fn set_suggestion_status(&self, id: i64, status: SuggestionStatus) -> Result<()> {
        sqlx::query("UPDATE timeline_suggestions SET status = ?, responded_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to record suggestion response")?;
        Ok(())
    }

    async fn get_preferences(&self, user_id: i64) -> Result<SuggestionPreferences> {
        let row = sqlx::query("SELECT * FROM user_suggestion_preferences WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get suggestion preferences")?;

        if let Some(row) = row {
            return Ok(row_to_preferences(&row));
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO user_suggestion_preferences (user_id, created_at, updated_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create default suggestion preferences")?;

        Ok(SuggestionPreferences::defaults(user_id))
    }

    async fn save_preferences(&self, prefs: &SuggestionPreferences) -> Result<()> {
        self.get_preferences(prefs.user_id).await?;

        sqlx::query(
            r#"
            UPDATE user_suggestion_preferences
            SET suggestion_frequency = ?, auto_apply_low_risk = ?, show_timing_suggestions = ?,
                show_task_suggestions = ?, show_template_suggestions = ?,
                dismissed_suggestion_types = ?, learning_mode = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(prefs.suggestion_frequency.as_str())
        .bind(prefs.auto_apply_low_risk)
        .bind(prefs.show_timing_suggestions)
        .bind(prefs.show_task_suggestions)
        .bind(prefs.show_template_suggestions)
        .bind(serde_json::to_string(&prefs.dismissed_suggestion_types)?)
        .bind(prefs.learning_mode)
        .bind(Utc::now())
        .bind(prefs.user_id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update suggestion preferences")?;
        Ok(())
    }

    async fn stats(&self, user_id: i64, usage_since: DateTime<Utc>) -> Result<TimelineStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_suggestions,
                COALESCE(SUM(CASE WHEN status = 'accepted' THEN 1 ELSE 0 END), 0) AS accepted_count,
                COALESCE(SUM(CASE WHEN status = 'dismissed' THEN 1 ELSE 0 END), 0) AS dismissed_count,
                COALESCE(SUM(CASE WHEN status = 'permanently_dismissed' THEN 1 ELSE 0 END), 0)
                    AS permanently_dismissed_count,
                COALESCE(SUM(CASE WHEN status IN ('pending', 'shown') THEN 1 ELSE 0 END), 0)
                    AS active_count,
                AVG(confidence_score) AS avg_confidence
            FROM timeline_suggestions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to compute suggestion stats")?;

        let suggestions = SuggestionCounts {
            total_suggestions: row.get("total_suggestions"),
            accepted_count: row.get("accepted_count"),
            dismissed_count: row.get("dismissed_count"),
            permanently_dismissed_count: row.get("permanently_dismissed_count"),
            active_count: row.get("active_count"),
            avg_confidence: row.get("avg_confidence"),
        };

        let pattern_rows = sqlx::query(
            r#"
            SELECT pattern_type, COUNT(*) AS count,
                   AVG(confidence_score) AS avg_confidence,
                   MAX(observation_count) AS max_observations
            FROM timeline_pattern_insights
            WHERE user_id = ?
            GROUP BY pattern_type
            ORDER BY count DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to compute pattern stats")?;

        let patterns = pattern_rows
            .iter()
            .map(|row| PatternTypeStat {
                pattern_type: row.get("pattern_type"),
                count: row.get("count"),
                avg_confidence: row.get("avg_confidence"),
                max_observations: row.get("max_observations"),
            })
            .collect();

        let usage_row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_records,
                COALESCE(SUM(CASE WHEN was_completed = 1 THEN 1 ELSE 0 END), 0) AS completed_tasks,
                COALESCE(SUM(CASE WHEN was_skipped = 1 THEN 1 ELSE 0 END), 0) AS skipped_tasks,
                COALESCE(SUM(CASE WHEN was_added_custom = 1 THEN 1 ELSE 0 END), 0) AS custom_tasks_added,
                AVG(usefulness_rating) AS avg_usefulness,
                AVG(difficulty_rating) AS avg_difficulty
            FROM timeline_usage_patterns
            WHERE user_id = ? AND created_at > ?
            "#,
        )
        .bind(user_id)
        .bind(usage_since)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to compute usage stats")?;

        let usage = UsageStats {
            total_records: usage_row.get("total_records"),
            completed_tasks: usage_row.get("completed_tasks"),
            skipped_tasks: usage_row.get("skipped_tasks"),
            custom_tasks_added: usage_row.get("custom_tasks_added"),
            avg_usefulness: usage_row.get("avg_usefulness"),
            avg_difficulty: usage_row.get("avg_difficulty"),
        };

        Ok(TimelineStats {
            suggestions,
            patterns,
            usage,
        })
    }

    async fn cleanup(
        &self,
        user_id: i64,
        responded_before: DateTime<Utc>,
        usage_before: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let suggestions = sqlx::query(
            r#"
            DELETE FROM timeline_suggestions
            WHERE user_id = ? AND status IN ('dismissed', 'permanently_dismissed')
              AND responded_at < ?
            "#,
        )
        .bind(user_id)
        .bind(responded_before)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to remove old suggestions")?;

        let usage = sqlx::query("DELETE FROM timeline_usage_patterns WHERE user_id = ? AND created_at < ?")
            .bind(user_id)
            .bind(usage_before)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to remove old usage rows")?;

        Ok((suggestions.rows_affected(), usage.rows_affected()))
    }
}

fn row_to_insight(row: &SqliteRow) -> PatternInsight {
    let pattern_type: String = row.get("pattern_type");
    let strength: String = row.get("pattern_strength");
    let data: String = row.get("pattern_data");

    PatternInsight {
        id: row.get("id"),
        user_id: row.get("user_id"),
        pattern_type: pattern_type.parse().unwrap_or_default(),
        pattern_name: row.get("pattern_name"),
        pattern_description: row.get("pattern_description"),
        pattern_data: json_object(&data),
        confidence_score: row.get("confidence_score"),
        observation_count: row.get("observation_count"),
        event_pattern: row.get("event_pattern"),
        pattern_strength: strength.parse().unwrap_or_default(),
        first_observed: row.get("first_observed"),
        last_observed: row.get("last_observed"),
    }
}

fn row_to_suggestion(row: &SqliteRow) -> TimelineSuggestion {
    let suggestion_type: String = row.get("suggestion_type");
    let priority: String = row.get("priority");
    let status: String = row.get("status");
    let data: String = row.get("suggestion_data");

    TimelineSuggestion {
        id: row.get("id"),
        user_id: row.get("user_id"),
        suggestion_type: suggestion_type.parse().unwrap_or_default(),
        title: row.get("title"),
        description: row.get("description"),
        suggestion_data: json_object(&data),
        confidence_score: row.get("confidence_score"),
        priority: priority.parse().unwrap_or_default(),
        status: status.parse().unwrap_or_default(),
        event_pattern: row.get("event_pattern"),
        shown_count: row.get("shown_count"),
        responded_at: row.get("responded_at"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

fn row_to_preferences(row: &SqliteRow) -> SuggestionPreferences {
    let frequency: String = row.get("suggestion_frequency");
    let dismissed: String = row.get("dismissed_suggestion_types");

    SuggestionPreferences {
        user_id: row.get("user_id"),
        suggestion_frequency: frequency.parse().unwrap_or_default(),
        auto_apply_low_risk: row.get("auto_apply_low_risk"),
        show_timing_suggestions: row.get("show_timing_suggestions"),
        show_task_suggestions: row.get("show_task_suggestions"),
        show_template_suggestions: row.get("show_template_suggestions"),
        dismissed_suggestion_types: parse_json_column(&dismissed),
        learning_mode: row.get("learning_mode"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    async fn setup_test_repo() -> (SqlxTimelineRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&new_user("alice"))
            .await
            .unwrap();
        (SqlxTimelineRepository::new(pool), user.id)
    }

    pub(crate) fn usage(task: &str, pattern: &str) -> UsageRecordInput {
        UsageRecordInput {
            event_pattern: Some(pattern.to_string()),
            task_id: format!("task-{}", task),
            task_text: task.to_string(),
            ..Default::default()
        }
    }

    fn suggestion(priority: SuggestionPriority, confidence: f64, pattern: Option<&str>) -> NewSuggestion {
        NewSuggestion {
            suggestion_type: SuggestionType::AddFrequentTask,
            pattern_name: "Custom task: Pack snacks".to_string(),
            title: "Add task?".to_string(),
            description: "desc".to_string(),
            data: json!({"patternName": "Custom task: Pack snacks"}),
            confidence,
            priority,
            event_pattern: pattern.map(str::to_string),
            expires_at: Utc::now() + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn test_added_and_skipped_aggregates() {
        let (repo, user) = setup_test_repo().await;
        let since = Utc::now() - Duration::days(90);
        for _ in 0..4 {
            let mut added = usage("Pack snacks", "soccer");
            added.was_added_custom = true;
            added.usefulness_rating = Some(5);
            repo.insert_usage(user, &added, 1, "morning", Utc::now()).await.unwrap();

            let mut skipped = usage("Iron shirt", "soccer");
            skipped.was_skipped = true;
            repo.insert_usage(user, &skipped, 1, "morning", Utc::now()).await.unwrap();
        }
        repo.insert_usage(user, &usage("Iron shirt", "soccer"), 1, "morning", Utc::now())
            .await
            .unwrap();

        let added = repo.added_task_aggregates(user, since, 3).await.unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].frequency, 4);
        assert_eq!(added[0].avg_usefulness, Some(5.0));

        let skipped = repo.skipped_task_aggregates(user, since, 3, 0.7).await.unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].task_text, "Iron shirt");
        assert_eq!((skipped[0].skipped_count, skipped[0].total_occurrences), (4, 5));
    }

    #[tokio::test]
    async fn test_timing_seasonal_and_weekday_aggregates() {
        let (repo, user) = setup_test_repo().await;
        let july = Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap();
        let since = july - Duration::days(30);
        for adjustment in [10, 20, 30] {
            let mut row = usage("Warm up", "soccer");
            row.task_category = Some("travel".to_string());
            row.time_adjustment_minutes = adjustment;
            repo.insert_usage(user, &row, 6, "morning", july).await.unwrap();
        }

        let timing = repo.timing_aggregates(user, since, 3, 5.0).await.unwrap();
        assert_eq!(timing.len(), 1);
        assert_eq!(timing[0].avg_adjustment, 20.0);

        let seasonal = repo.seasonal_aggregates(user, since, 3).await.unwrap();
        assert_eq!(seasonal[0].season, "summer");

        let days = repo.day_of_week_aggregates(user, since, 3).await.unwrap();
        assert_eq!(days[0].day_of_week, 6);
        assert!(repo.day_of_week_aggregates(user, since, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insight_upsert_accumulates_observations() {
        let (repo, user) = setup_test_repo().await;
        let insight = NewInsight {
            pattern_type: InsightType::FrequentlyAddedTask,
            pattern_name: "Custom task: Pack snacks".to_string(),
            description: "You frequently add it".to_string(),
            data: json!({"frequency": 4}),
            confidence: 0.9,
            observation_count: 4,
            event_pattern: Some("soccer".to_string()),
            strength: PatternStrength::Strong,
        };
        repo.upsert_insight(user, &insight).await.unwrap();
        repo.upsert_insight(user, &insight).await.unwrap();

        let since = Utc::now() - Duration::days(30);
        let strong = repo.strong_insights(user, since).await.unwrap();
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].observation_count, 8);

        let timing = repo
            .list_insights(user, Some(InsightType::TimingPreference), since, 20)
            .await
            .unwrap();
        assert!(timing.is_empty());
    }

    #[tokio::test]
    async fn test_suggestion_ordering_and_cooldown() {
        let (repo, user) = setup_test_repo().await;
        let now = Utc::now();
        let low = repo.insert_suggestion(user, &suggestion(SuggestionPriority::Low, 0.9, None)).await.unwrap();
        let high = repo
            .insert_suggestion(user, &suggestion(SuggestionPriority::High, 0.7, Some("soccer")))
            .await
            .unwrap();
        let medium = repo
            .insert_suggestion(user, &suggestion(SuggestionPriority::Medium, 0.8, Some("piano")))
            .await
            .unwrap();

        let ids: Vec<i64> = repo
            .list_active_suggestions(user, now, 10)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![high, medium, low]);

        let ids: Vec<i64> = repo
            .list_suggestions_for_pattern(user, "piano", now, 5)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![medium, low]);

        let since = now - Duration::hours(24);
        assert!(repo
            .suggestion_created_since(user, SuggestionType::AddFrequentTask, "Custom task: Pack snacks", since)
            .await
            .unwrap());
        assert!(!repo
            .suggestion_created_since(user, SuggestionType::AdjustTiming, "Custom task: Pack snacks", since)
            .await
            .unwrap());
        assert!(!repo
            .suggestion_created_since(user, SuggestionType::AddFrequentTask, "Custom task: Pack", since)
            .await
            .unwrap());

        repo.set_suggestion_status(high, SuggestionStatus::Dismissed).await.unwrap();
        assert_eq!(repo.list_active_suggestions(user, now, 10).await.unwrap().len(), 2);
        assert!(repo.get_suggestion(user + 1, high).await.unwrap().is_none());

        let (removed, _) = repo
            .cleanup(user, Utc::now() + Duration::minutes(1), now - Duration::days(180))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_preferences_and_stats() {
        let (repo, user) = setup_test_repo().await;
        let mut prefs = repo.get_preferences(user).await.unwrap();
        assert_eq!(prefs, SuggestionPreferences::defaults(user));

        prefs.dismissed_suggestion_types.push(SuggestionType::RemoveUnusedTask);
        prefs.learning_mode = false;
        repo.save_preferences(&prefs).await.unwrap();
        assert_eq!(repo.get_preferences(user).await.unwrap(), prefs);

        let mut done = usage("Pack snacks", "soccer");
        done.was_completed = true;
        repo.insert_usage(user, &done, 2, "evening", Utc::now()).await.unwrap();
        repo.insert_suggestion(user, &suggestion(SuggestionPriority::High, 0.8, None))
            .await
            .unwrap();

        let stats = repo.stats(user, Utc::now() - Duration::days(90)).await.unwrap();
        assert_eq!(stats.suggestions.total_suggestions, 1);
        assert_eq!(stats.suggestions.active_count, 1);
        assert_eq!(stats.usage.total_records, 1);
        assert_eq!(stats.usage.completed_tasks, 1);
        assert!(stats.patterns.is_empty());
    }
}
