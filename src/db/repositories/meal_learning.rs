//! Meal learning repository
//!
//! Meal history, per-member feedback, learned ingredient preferences and
//! discovered meal patterns.

use crate::db::DynDatabasePool;
use crate::models::{
    parse_json_column, IngredientPreference, IngredientSummary, MealCompletionInput,
    MealFeedbackInput, MealHistoryEntry, MealHistoryFilter, MealPattern, MealPatternType,
    MealTypeStat,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

use super::family_member::json_object;

const HISTORY_SELECT: &str = r#"
    SELECT mh.*, mp.title AS meal_title, mp.meal_type, mp.ingredients AS meal_ingredients,
           mf.rating AS feedback_rating, mf.liked_ingredients, mf.disliked_ingredients,
           mf.comments AS feedback_comments, fm.name AS member_name
    FROM meal_history mh
    JOIN meal_plans mp ON mh.meal_plan_id = mp.id
    LEFT JOIN meal_feedback mf ON mh.meal_plan_id = mf.meal_plan_id
    LEFT JOIN family_members fm ON mf.family_member_id = fm.id
"#;

#[async_trait]
pub trait MealLearningRepository: Send + Sync {
    /// Record a served meal, returning the history row id
    async fn insert_history(
        &self,
        meal_plan_id: i64,
        date_served: NaiveDate,
        input: &MealCompletionInput,
    ) -> Result<i64>;

    /// A history row joined with its plan, without member feedback
    async fn get_history(&self, id: i64) -> Result<Option<MealHistoryEntry>>;

    /// History joined with plan and member feedback, newest first
    async fn list_history(&self, filter: &MealHistoryFilter) -> Result<Vec<MealHistoryEntry>>;

    async fn insert_feedback(&self, meal_plan_id: i64, input: &MealFeedbackInput) -> Result<i64>;

    async fn get_preference(
        &self,
        member_id: i64,
        ingredient: &str,
    ) -> Result<Option<IngredientPreference>>;

    /// Insert a new preference row with an occurrence count of one
    async fn insert_preference(&self, member_id: i64, ingredient: &str, score: i64)
        -> Result<()>;

    /// Overwrite the score and bump the occurrence count
    async fn update_preference(&self, member_id: i64, ingredient: &str, score: i64)
        -> Result<()>;

    /// A member's preferences seen at least `min_occurrences` times, best first
    async fn list_preferences(
        &self,
        member_id: i64,
        min_occurrences: i64,
    ) -> Result<Vec<IngredientPreference>>;

    async fn meal_type_stats(&self, member_id: i64) -> Result<Vec<MealTypeStat>>;

    /// Average member rating and count for plans of `meal_type` whose
    /// ingredients contain `ingredient`
    async fn similar_meal_ratings(
        &self,
        meal_type: &str,
        ingredient: &str,
    ) -> Result<(Option<f64>, i64)>;

    /// Ingredients rated by more than one member or seen more than 3 times
    async fn ingredient_summary(&self) -> Result<Vec<IngredientSummary>>;

    /// Create the pattern at `increment` confidence, or raise an existing
    /// identical pattern by `increment` (capped at 1.0)
    async fn upsert_pattern(
        &self,
        pattern_type: MealPatternType,
        data: &serde_json::Value,
        increment: f64,
    ) -> Result<()>;

    async fn list_patterns(
        &self,
        pattern_type: Option<MealPatternType>,
        min_confidence: f64,
        limit: i64,
    ) -> Result<Vec<MealPattern>>;

    /// Weekly and timing patterns plus ingredient combos for the meal types
    /// the member rated 4 or higher. Empty when the member rated nothing that high.
    async fn patterns_for_member(&self, member_id: i64) -> Result<Vec<MealPattern>>;
}

pub struct SqlxMealLearningRepository {
    pool: DynDatabasePool,
}

impl SqlxMealLearningRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MealLearningRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MealLearningRepository for SqlxMealLearningRepository {
    async fn insert_history(
        &self,
        meal_plan_id: i64,
        date_served: NaiveDate,
        input: &MealCompletionInput,
    ) -> Result<i64> {
        let attendance = input
            .attendance
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let result = sqlx::query(
            r#"
            INSERT INTO meal_history (meal_plan_id, date_served, actually_eaten, attendance,
                                      rating, prep_time_actual, leftovers, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(meal_plan_id)
        .bind(date_served)
        .bind(input.actually_eaten)
        .bind(serde_json::to_string(&attendance)?)
        .bind(input.rating)
        .bind(input.prep_time_actual)
        .bind(input.leftovers)
        .bind(&input.notes)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to record meal completion")?;

        Ok(result.last_insert_rowid())
    }

    async fn get_history(&self, id: i64) -> Result<Option<MealHistoryEntry>> {
        let row = sqlx::query(
            r#"
            SELECT mh.*, mp.title AS meal_title, mp.meal_type, mp.ingredients AS meal_ingredients,
                   NULL AS feedback_rating, NULL AS liked_ingredients,
                   NULL AS disliked_ingredients, NULL AS feedback_comments, NULL AS member_name
            FROM meal_history mh
            JOIN meal_plans mp ON mh.meal_plan_id = mp.id
            WHERE mh.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get meal history")?;

        Ok(row.as_ref().map(row_to_history))
    }

    async fn list_history(&self, filter: &MealHistoryFilter) -> Result<Vec<MealHistoryEntry>> {
        let mut sql = format!("{} WHERE 1 = 1", HISTORY_SELECT);
        if filter.start.is_some() {
            sql.push_str(" AND mh.date_served >= ?");
        }
        if filter.end.is_some() {
            sql.push_str(" AND mh.date_served <= ?");
        }
        if filter.meal_type.is_some() {
            sql.push_str(" AND mp.meal_type = ?");
        }
        if filter.family_member_id.is_some() {
            sql.push_str(" AND mf.family_member_id = ?");
        }
        if filter.rated_only {
            sql.push_str(" AND (mh.rating IS NOT NULL OR mf.rating IS NOT NULL)");
        }
        sql.push_str(" ORDER BY mh.date_served DESC, mh.created_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(start) = filter.start {
            query = query.bind(start);
        }
        if let Some(end) = filter.end {
            query = query.bind(end);
        }
        if let Some(meal_type) = filter.meal_type {
            query = query.bind(meal_type.as_str());
        }
        if let Some(member_id) = filter.family_member_id {
            query = query.bind(member_id);
        }
        query = query.bind(filter.limit.unwrap_or(100));

        let rows = query
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list meal history")?;

        Ok(rows.iter().map(row_to_history).collect())
    }

    async fn insert_feedback(&self, meal_plan_id: i64, input: &MealFeedbackInput) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO meal_feedback (meal_plan_id, family_member_id, rating, liked_ingredients,
                                       disliked_ingredients, comments, would_repeat, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(meal_plan_id)
        .bind(input.family_member_id)
        .bind(input.rating)
        .bind(serde_json::to_string(&input.liked_ingredients)?)
        .bind(serde_json::to_string(&input.disliked_ingredients)?)
        .bind(&input.comments)
        .bind(input.would_repeat)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to record meal feedback")?;

        Ok(result.last_insert_rowid())
    }

    async fn get_preference(
        &self,
        member_id: i64,
        ingredient: &str,
    ) -> Result<Option<IngredientPreference>> {
        let row = sqlx::query(
            r#"
            SELECT ingredient, preference_score, occurrence_count, last_updated
            FROM family_meal_preferences
            WHERE family_member_id = ? AND ingredient = ?
            "#,
        )
        .bind(member_id)
        .bind(ingredient)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get ingredient preference")?;

        Ok(row.as_ref().map(row_to_preference))
    }

    async fn insert_preference(
        &self,
        member_id: i64,
        ingredient: &str,
        score: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO family_meal_preferences (family_member_id, ingredient, preference_score,
                                                 occurrence_count, last_updated)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(member_id)
        .bind(ingredient)
        .bind(score)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to insert ingredient preference")?;
        Ok(())
    }

    async fn update_preference(
        &self,
        member_id: i64,
        ingredient: &str,
        score: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE family_meal_preferences
            SET preference_score = ?, occurrence_count = occurrence_count + 1, last_updated = ?
            WHERE family_member_id = ? AND ingredient = ?
            "#,
        )
        .bind(score)
        .bind(Utc::now())
        .bind(member_id)
        .bind(ingredient)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update ingredient preference")?;
        Ok(())
    }

    async fn list_preferences(
        &self,
        member_id: i64,
        min_occurrences: i64,
    ) -> Result<Vec<IngredientPreference>> {
        let rows = sqlx::query(
            r#"
            SELECT ingredient, preference_score, occurrence_count, last_updated
            FROM family_meal_preferences
            WHERE family_member_id = ? AND occurrence_count >= ?
            ORDER BY preference_score DESC
            "#,
        )
        .bind(member_id)
        .bind(min_occurrences)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list ingredient preferences")?;

        Ok(rows.iter().map(row_to_preference).collect())
    }

    async fn meal_type_stats(&self, member_id: i64) -> Result<Vec<MealTypeStat>> {
        let rows = sqlx::query(
            r#"
            SELECT mp.meal_type,
                   AVG(mf.rating) AS avg_rating,
                   COUNT(*) AS meal_count,
                   SUM(CASE WHEN mf.would_repeat = 1 THEN 1 ELSE 0 END) AS would_repeat_count
            FROM meal_feedback mf
            JOIN meal_plans mp ON mf.meal_plan_id = mp.id
            WHERE mf.family_member_id = ?
            GROUP BY mp.meal_type
            ORDER BY avg_rating DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to aggregate meal type feedback")?;

        Ok(rows
            .iter()
            .map(|row| {
                let meal_type: String = row.get("meal_type");
                let meal_count: i64 = row.get("meal_count");
                let would_repeat_count: i64 = row.get("would_repeat_count");
                let repeat_percentage = if meal_count > 0 {
                    (would_repeat_count as f64 / meal_count as f64 * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                MealTypeStat {
                    meal_type: meal_type.parse().unwrap_or_default(),
                    avg_rating: row.get("avg_rating"),
                    meal_count,
                    would_repeat_count,
                    repeat_percentage,
                }
            })
            .collect())
    }

    async fn similar_meal_ratings(
        &self,
        meal_type: &str,
        ingredient: &str,
    ) -> Result<(Option<f64>, i64)> {
        let row = sqlx::query(
            r#"
            SELECT AVG(mf.rating) AS avg_rating, COUNT(*) AS count
            FROM meal_feedback mf
            JOIN meal_plans mp ON mf.meal_plan_id = mp.id
            WHERE mp.meal_type = ? AND mp.ingredients LIKE ?
            "#,
        )
        .bind(meal_type)
        .bind(format!("%{}%", ingredient))
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to aggregate similar meal ratings")?;

        Ok((row.get("avg_rating"), row.get("count")))
    }

    async fn ingredient_summary(&self) -> Result<Vec<IngredientSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT ingredient,
                   AVG(preference_score) AS avg_score,
                   COUNT(*) AS member_count,
                   SUM(occurrence_count) AS total_occurrences,
                   MIN(preference_score) AS min_score,
                   MAX(preference_score) AS max_score
            FROM family_meal_preferences
            GROUP BY ingredient
            HAVING member_count > 1 OR total_occurrences > 3
            ORDER BY avg_score DESC
            "#,
        )
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to summarize ingredient preferences")?;

        Ok(rows
            .iter()
            .map(|row| IngredientSummary {
                ingredient: row.get("ingredient"),
                avg_score: row.get("avg_score"),
                member_count: row.get("member_count"),
                total_occurrences: row.get("total_occurrences"),
                min_score: row.get("min_score"),
                max_score: row.get("max_score"),
            })
            .collect())
    }

    async fn upsert_pattern(
        &self,
        pattern_type: MealPatternType,
        data: &serde_json::Value,
        increment: f64,
    ) -> Result<()> {
        // serde_json objects keep sorted keys, so equal patterns serialize identically.
        let key = serde_json::to_string(data)?;
        let now = Utc::now();

        let existing = sqlx::query(
            "SELECT id, confidence_score FROM meal_patterns WHERE pattern_type = ? AND pattern_data = ?",
        )
        .bind(pattern_type.as_str())
        .bind(&key)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to look up meal pattern")?;

        match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                let confidence: f64 = row.get("confidence_score");
                sqlx::query(
                    r#"
                    UPDATE meal_patterns
                    SET confidence_score = ?, observation_count = observation_count + 1,
                        last_observed = ?
                    WHERE id = ?
                    "#,
                )
                .bind((confidence + increment).min(1.0))
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite())
                .await
                .context("Failed to update meal pattern")?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO meal_patterns (pattern_type, pattern_data, confidence_score,
                                               observation_count, last_observed)
                    VALUES (?, ?, ?, 1, ?)
                    "#,
                )
                .bind(pattern_type.as_str())
                .bind(&key)
                .bind(increment.min(1.0))
                .bind(now)
                .execute(self.pool.sqlite())
                .await
                .context("Failed to insert meal pattern")?;
            }
        }
        Ok(())
    }

    async fn list_patterns(
        &self,
        pattern_type: Option<MealPatternType>,
        min_confidence: f64,
        limit: i64,
    ) -> Result<Vec<MealPattern>> {
        let mut sql = String::from("SELECT * FROM meal_patterns WHERE confidence_score >= ?");
        if pattern_type.is_some() {
            sql.push_str(" AND pattern_type = ?");
        }
        sql.push_str(" ORDER BY confidence_score DESC, observation_count DESC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(min_confidence);
        if let Some(pattern_type) = pattern_type {
            query = query.bind(pattern_type.as_str());
        }
        let rows = query
            .bind(limit)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list meal patterns")?;

        Ok(rows.iter().map(row_to_pattern).collect())
    }

    async fn patterns_for_member(&self, member_id: i64) -> Result<Vec<MealPattern>> {
        let meal_types: Vec<String> = sqlx::query(
            r#"
            SELECT DISTINCT mp.meal_type
            FROM meal_feedback mf
            JOIN meal_plans mp ON mf.meal_plan_id = mp.id
            WHERE mf.family_member_id = ? AND mf.rating >= 4
            "#,
        )
        .bind(member_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list member meal types")?
        .iter()
        .map(|row| row.get("meal_type"))
        .collect();

        if meal_types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; meal_types.len()].join(", ");
        let sql = format!(
            r#"
            SELECT * FROM meal_patterns
            WHERE confidence_score >= 0.3
              AND (pattern_type = 'weekly'
                   OR pattern_type = 'meal-timing'
                   OR (pattern_type = 'ingredient-combo'
                       AND json_extract(pattern_data, '$.mealType') IN ({})))
            ORDER BY confidence_score DESC
            "#,
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for meal_type in &meal_types {
            query = query.bind(meal_type);
        }
        let rows = query
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list member meal patterns")?;

        Ok(rows.iter().map(row_to_pattern).collect())
    }
}

fn row_to_history(row: &SqliteRow) -> MealHistoryEntry {
    let meal_type: String = row.get("meal_type");
    let attendance: String = row.get("attendance");
    let ingredients: String = row.get("meal_ingredients");
    let liked: Option<String> = row.get("liked_ingredients");
    let disliked: Option<String> = row.get("disliked_ingredients");

    MealHistoryEntry {
        id: row.get("id"),
        meal_plan_id: row.get("meal_plan_id"),
        date_served: row.get("date_served"),
        actually_eaten: row.get("actually_eaten"),
        attendance: json_object(&attendance),
        rating: row.get("rating"),
        prep_time_actual: row.get("prep_time_actual"),
        leftovers: row.get("leftovers"),
        notes: row.get("notes"),
        meal_title: row.get("meal_title"),
        meal_type: meal_type.parse().unwrap_or_default(),
        ingredients: parse_json_column(&ingredients),
        feedback_rating: row.get("feedback_rating"),
        liked_ingredients: liked.as_deref().map(parse_json_column).unwrap_or_default(),
        disliked_ingredients: disliked.as_deref().map(parse_json_column).unwrap_or_default(),
        feedback_comments: row.get("feedback_comments"),
        member_name: row.get("member_name"),
        created_at: row.get("created_at"),
    }
}

fn row_to_preference(row: &SqliteRow) -> IngredientPreference {
    IngredientPreference {
        ingredient: row.get("ingredient"),
        preference_score: row.get("preference_score"),
        occurrence_count: row.get("occurrence_count"),
        last_updated: row.get("last_updated"),
    }
}

fn row_to_pattern(row: &SqliteRow) -> MealPattern {
    let pattern_type: String = row.get("pattern_type");
    let data: String = row.get("pattern_data");

    MealPattern {
        id: row.get("id"),
        pattern_type: pattern_type.parse().unwrap_or_default(),
        pattern_data: json_object(&data),
        confidence_score: row.get("confidence_score"),
        observation_count: row.get("observation_count"),
        last_observed: row.get("last_observed"),
    }
}
