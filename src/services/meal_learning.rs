//! Meal learning service
//!
//! Turns served meals and family feedback into ingredient preferences and
//! meal patterns, and scores proposed meals against what was learned.

use crate::db::repositories::{FamilyMemberRepository, MealLearningRepository, MealPlanRepository};
use crate::models::{
    IngredientPreference, IngredientSummary, MealCompletionInput, MealFeedbackInput,
    MealHistoryEntry, MealHistoryFilter, MealPattern, MealPatternType, MealPlan, MealType,
    MealTypeStat,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const PREFERENCE_MIN: i64 = -100;
const PREFERENCE_MAX: i64 = 100;

const WEEKLY_INCREMENT: f64 = 0.1;
const TIMING_INCREMENT: f64 = 0.05;
const COMBO_INCREMENT: f64 = 0.15;

/// Name fragments that suit each season, indexed by `month0 / 3`
const SEASONAL_KEYWORDS: [&[&str]; 4] = [
    &["soup", "stew", "roast", "hot"],
    &["fresh", "salad", "light"],
    &["grill", "cold", "fresh", "salad"],
    &["harvest", "warm", "spice"],
];

/// A member's ingredient preferences split by strength
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngredientBuckets {
    pub loved: Vec<IngredientPreference>,
    pub liked: Vec<IngredientPreference>,
    pub neutral: Vec<IngredientPreference>,
    pub disliked: Vec<IngredientPreference>,
    pub hated: Vec<IngredientPreference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberPreferences {
    pub family_member_id: i64,
    pub ingredients: IngredientBuckets,
    pub meal_types: Vec<MealTypeStat>,
    pub patterns: Vec<MealPattern>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FamilyIngredientSummary {
    pub universal_loves: Vec<IngredientSummary>,
    pub family_favorites: Vec<IngredientSummary>,
    pub neutral: Vec<IngredientSummary>,
    pub problematic: Vec<IngredientSummary>,
    pub divisive: Vec<IngredientSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessScoreRequest {
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub meal_type: MealType,
    #[serde(default)]
    pub family_members: Vec<i64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreFactors {
    pub ingredient_preferences: f64,
    pub historical_ratings: f64,
    pub seasonal_fit: f64,
    pub family_consensus: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessScore {
    pub score: i64,
    pub confidence: f64,
    pub factors: ScoreFactors,
    pub recommendation: &'static str,
}

pub struct MealLearningService {
    repo: Arc<dyn MealLearningRepository>,
    plans: Arc<dyn MealPlanRepository>,
    family: Arc<dyn FamilyMemberRepository>,
}

impl MealLearningService {
    pub fn new(
        repo: Arc<dyn MealLearningRepository>,
        plans: Arc<dyn MealPlanRepository>,
        family: Arc<dyn FamilyMemberRepository>,
    ) -> Self {
        Self {
            repo,
            plans,
            family,
        }
    }

    /// Record that a planned meal was served
    ///
    /// A rating of 4 or 5 also reinforces the weekly, timing and ingredient
    /// combination patterns of the meal.
    pub async fn record_completion(
        &self,
        meal_plan_id: i64,
        input: MealCompletionInput,
    ) -> ServiceResult<MealHistoryEntry> {
        if let Some(rating) = input.rating {
            check_rating(rating)?;
        }
        let plan = self.plan(meal_plan_id).await?;

        let now = Local::now();
        let date_served = input.date_served.unwrap_or_else(|| now.date_naive());
        let history_id = self
            .repo
            .insert_history(meal_plan_id, date_served, &input)
            .await
            .context("Failed to record meal completion")?;

        if input.rating.is_some_and(|r| r >= 4) {
            self.reinforce_patterns(&plan, date_served, now.hour(), input.rating.unwrap_or(4))
                .await?;
        }

        self.repo
            .get_history(history_id)
            .await
            .context("Failed to load meal history")?
            .ok_or_else(|| ServiceError::not_found("Meal history"))
    }

    async fn reinforce_patterns(
        &self,
        plan: &MealPlan,
        date_served: NaiveDate,
        hour: u32,
        rating: i64,
    ) -> ServiceResult<()> {
        let weekly = json!({
            "dayOfWeek": date_served.weekday().num_days_from_sunday(),
            "mealType": plan.meal_type,
            "success": true,
        });
        self.repo
            .upsert_pattern(MealPatternType::Weekly, &weekly, WEEKLY_INCREMENT)
            .await
            .context("Failed to update weekly pattern")?;

        let timing = json!({
            "mealType": plan.meal_type,
            "preferredHour": hour,
            "success": true,
        });
        self.repo
            .upsert_pattern(MealPatternType::MealTiming, &timing, TIMING_INCREMENT)
            .await
            .context("Failed to update timing pattern")?;

        if plan.ingredients.len() >= 2 {
            let mut names: Vec<String> = plan.ingredients.iter().map(|i| i.name.clone()).collect();
            names.sort();
            let combo = json!({
                "ingredients": names,
                "mealType": plan.meal_type,
                "rating": rating,
            });
            self.repo
                .upsert_pattern(MealPatternType::IngredientCombo, &combo, COMBO_INCREMENT)
                .await
                .context("Failed to update ingredient combination pattern")?;
        }

        tracing::debug!(meal_plan_id = plan.id, rating, "Meal patterns reinforced");
        Ok(())
    }

    /// Record one member's feedback and shift their ingredient preferences
    pub async fn record_feedback(
        &self,
        meal_plan_id: i64,
        input: MealFeedbackInput,
    ) -> ServiceResult<i64> {
        check_rating(input.rating)?;
        self.plan(meal_plan_id).await?;
        self.family
            .get_by_id(input.family_member_id)
            .await
            .context("Failed to get family member")?
            .ok_or_else(|| ServiceError::not_found("Family member"))?;

        let feedback_id = self
            .repo
            .insert_feedback(meal_plan_id, &input)
            .await
            .context("Failed to record meal feedback")?;

        let (liked, disliked) = preference_adjustments(input.rating);
        for ingredient in &input.liked_ingredients {
            self.adjust_preference(input.family_member_id, ingredient, liked)
                .await?;
        }
        for ingredient in &input.disliked_ingredients {
            self.adjust_preference(input.family_member_id, ingredient, disliked)
                .await?;
        }

        Ok(feedback_id)
    }

    async fn adjust_preference(
        &self,
        member_id: i64,
        ingredient: &str,
        adjustment: i64,
    ) -> ServiceResult<()> {
        let ingredient = ingredient.trim();
        if ingredient.is_empty() {
            return Ok(());
        }

        match self
            .repo
            .get_preference(member_id, ingredient)
            .await
            .context("Failed to get ingredient preference")?
        {
            Some(existing) => {
                let score = clamp_preference(existing.preference_score + adjustment);
                self.repo
                    .update_preference(member_id, ingredient, score)
                    .await
                    .context("Failed to update ingredient preference")?;
            }
            None => {
                self.repo
                    .insert_preference(member_id, ingredient, clamp_preference(adjustment))
                    .await
                    .context("Failed to insert ingredient preference")?;
            }
        }
        Ok(())
    }

    pub async fn history(&self, filter: &MealHistoryFilter) -> ServiceResult<Vec<MealHistoryEntry>> {
        let mut filter = filter.clone();
        filter.limit = Some(filter.limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
        Ok(self
            .repo
            .list_history(&filter)
            .await
            .context("Failed to list meal history")?)
    }

    pub async fn member_preferences(
        &self,
        member_id: i64,
        min_occurrences: i64,
    ) -> ServiceResult<MemberPreferences> {
        let preferences = self
            .repo
            .list_preferences(member_id, min_occurrences)
            .await
            .context("Failed to list ingredient preferences")?;
        let meal_types = self
            .repo
            .meal_type_stats(member_id)
            .await
            .context("Failed to load meal type stats")?;
        let patterns = self
            .repo
            .patterns_for_member(member_id)
            .await
            .context("Failed to load member patterns")?;

        Ok(MemberPreferences {
            family_member_id: member_id,
            ingredients: bucket_preferences(preferences),
            meal_types,
            patterns,
        })
    }

    /// Predict how well a meal would be received
    pub async fn success_score(&self, request: &SuccessScoreRequest) -> ServiceResult<SuccessScore> {
        let mut factors = ScoreFactors::default();
        let mut confidence = 0.1;

        if !request.family_members.is_empty() && !request.ingredients.is_empty() {
            let count = request.ingredients.len() as f64;
            let mut score_sum = 0.0;
            let mut confidence_sum = 0.0;

            for member_id in &request.family_members {
                let mut member_score = 0.0;
                let mut member_confidence = 0.0;
                for ingredient in &request.ingredients {
                    if let Some(pref) = self
                        .repo
                        .get_preference(*member_id, ingredient)
                        .await
                        .context("Failed to get ingredient preference")?
                    {
                        member_score += pref.preference_score as f64;
                        member_confidence += pref.occurrence_count.min(10) as f64 / 10.0;
                    }
                }
                score_sum += member_score / count;
                confidence_sum += member_confidence / count;
            }

            let members = request.family_members.len() as f64;
            factors.ingredient_preferences = score_sum / members;
            confidence += confidence_sum / members * 0.4;
        }

        let first = request.ingredients.first().map(String::as_str).unwrap_or("");
        let (avg_rating, count) = self
            .repo
            .similar_meal_ratings(request.meal_type.as_str(), first)
            .await
            .context("Failed to load similar meal ratings")?;
        if let (Some(avg), true) = (avg_rating, count > 0) {
            factors.historical_ratings = (avg - 3.0) * 15.0;
            confidence += count.min(10) as f64 / 10.0 * 0.3;
        }

        if let Some(date) = request.date {
            factors.seasonal_fit = if fits_season(&request.ingredients, date) {
                10.0
            } else {
                -5.0
            };
            confidence += 0.1;
        }

        let score = (50.0
            + factors.ingredient_preferences
            + factors.historical_ratings
            + factors.seasonal_fit)
            .clamp(0.0, 100.0);
        let confidence = confidence.clamp(0.1, 1.0);

        Ok(SuccessScore {
            score: score.round() as i64,
            confidence: (confidence * 100.0).round() / 100.0,
            factors,
            recommendation: recommendation(score, confidence),
        })
    }

    pub async fn patterns(
        &self,
        pattern_type: Option<MealPatternType>,
        min_confidence: f64,
        limit: i64,
    ) -> ServiceResult<Vec<MealPattern>> {
        Ok(self
            .repo
            .list_patterns(pattern_type, min_confidence, limit)
            .await
            .context("Failed to list meal patterns")?)
    }

    pub async fn ingredient_summary(&self) -> ServiceResult<FamilyIngredientSummary> {
        let rows = self
            .repo
            .ingredient_summary()
            .await
            .context("Failed to summarize ingredients")?;
        Ok(summarize_ingredients(rows))
    }

    async fn plan(&self, id: i64) -> ServiceResult<MealPlan> {
        self.plans
            .get_by_id(id)
            .await
            .context("Failed to get meal plan")?
            .ok_or_else(|| ServiceError::not_found("Meal"))
    }
}

fn check_rating(rating: i64) -> ServiceResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(ServiceError::validation("Rating must be between 1 and 5"));
    }
    Ok(())
}

fn clamp_preference(score: i64) -> i64 {
    score.clamp(PREFERENCE_MIN, PREFERENCE_MAX)
}

/// Score changes for liked and disliked ingredients at a given meal rating
fn preference_adjustments(rating: i64) -> (i64, i64) {
    let base = (rating - 3) * 10;
    let liked = if base > 0 { base + 15 } else { 10 };
    let disliked = if base < 0 { base - 15 } else { -10 };
    (liked, disliked)
}

fn bucket_preferences(preferences: Vec<IngredientPreference>) -> IngredientBuckets {
    let mut buckets = IngredientBuckets::default();
    for pref in preferences {
        let score = pref.preference_score;
        let bucket = if score >= 50 {
            &mut buckets.loved
        } else if score >= 20 {
            &mut buckets.liked
        } else if score > -20 {
            &mut buckets.neutral
        } else if score > -50 {
            &mut buckets.disliked
        } else {
            &mut buckets.hated
        };
        bucket.push(pref);
    }
    buckets
}

/// Buckets overlap: an ingredient can be both problematic and divisive.
fn summarize_ingredients(rows: Vec<IngredientSummary>) -> FamilyIngredientSummary {
    let pick = |keep: &dyn Fn(&IngredientSummary) -> bool| {
        rows.iter().filter(|s| keep(s)).cloned().collect::<Vec<_>>()
    };

    FamilyIngredientSummary {
        universal_loves: pick(&|s| s.avg_score >= 50.0 && s.min_score >= 20),
        family_favorites: pick(&|s| s.avg_score >= 30.0 && s.avg_score < 50.0),
        neutral: pick(&|s| s.avg_score > -20.0 && s.avg_score < 30.0),
        problematic: pick(&|s| s.avg_score <= -20.0 || s.min_score <= -50),
        divisive: pick(&|s| s.max_score - s.min_score >= 60),
    }
}

fn fits_season(ingredients: &[String], date: NaiveDate) -> bool {
    let keywords = SEASONAL_KEYWORDS[(date.month0() / 3) as usize];
    ingredients.iter().any(|ingredient| {
        let lower = ingredient.to_lowercase();
        keywords.iter().any(|k| lower.contains(k))
    })
}

fn recommendation(score: f64, confidence: f64) -> &'static str {
    if confidence < 0.3 {
        "Limited data available - consider this an experimental choice"
    } else if score >= 80.0 {
        "Highly recommended - family likely to love this meal"
    } else if score >= 65.0 {
        "Good choice - most family members should enjoy this"
    } else if score >= 50.0 {
        "Moderate choice - mixed reactions expected"
    } else if score >= 35.0 {
        "Risky choice - consider alternatives based on family preferences"
    } else {
        "Not recommended - likely poor reception based on family history"
    }
}
