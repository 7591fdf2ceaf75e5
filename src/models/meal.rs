//! Meal planning and meal learning models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum MealType ("meal type") {
        Breakfast => "breakfast",
        Lunch => "lunch",
        #[default]
        Dinner => "dinner",
        Snack => "snack",
    }
}

impl MealType {
    /// Position within a day, used to order a week's plan.
    pub fn day_order(&self) -> u8 {
        match self {
            MealType::Breakfast => 1,
            MealType::Lunch => 2,
            MealType::Dinner => 3,
            MealType::Snack => 4,
        }
    }
}

string_enum! {
    /// Kinds of learned meal patterns
    pub enum MealPatternType ("meal pattern type") {
        #[default]
        Weekly => "weekly",
        Seasonal => "seasonal",
        EventBased => "event-based",
        IngredientCombo => "ingredient-combo",
        MealTiming => "meal-timing",
    }
}

/// One ingredient line of a meal plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Meal the ingredient was added for, shown as a shopping list source
    #[serde(default, alias = "mealTitle", skip_serializing_if = "Option::is_none")]
    pub meal_title: Option<String>,
}

impl Ingredient {
    pub fn new(name: &str, quantity: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
            category: None,
            meal_title: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: i64,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub title: String,
    pub recipe_url: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub nutrition_info: serde_json::Value,
    pub portions: serde_json::Value,
    pub prep_time: Option<i64>,
    pub assigned_cook: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMealPlanInput {
    pub date: NaiveDate,
    pub meal_type: String,
    pub title: String,
    #[serde(default)]
    pub recipe_url: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub nutrition_info: Option<serde_json::Value>,
    #[serde(default)]
    pub portions: Option<serde_json::Value>,
    #[serde(default)]
    pub prep_time: Option<i64>,
    #[serde(default)]
    pub assigned_cook: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMealPlanInput {
    pub date: Option<NaiveDate>,
    pub meal_type: Option<String>,
    pub title: Option<String>,
    pub recipe_url: Option<String>,
    pub ingredients: Option<Vec<Ingredient>>,
    pub nutrition_info: Option<serde_json::Value>,
    pub portions: Option<serde_json::Value>,
    pub prep_time: Option<i64>,
    pub assigned_cook: Option<i64>,
}

/// Record of a planned meal being served
#[derive(Debug, Clone, Deserialize)]
pub struct MealCompletionInput {
    #[serde(default)]
    pub date_served: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub actually_eaten: bool,
    #[serde(default)]
    pub attendance: Option<serde_json::Value>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub prep_time_actual: Option<i64>,
    #[serde(default)]
    pub leftovers: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One family member's reaction to a meal
#[derive(Debug, Clone, Deserialize)]
pub struct MealFeedbackInput {
    pub family_member_id: i64,
    pub rating: i64,
    #[serde(default)]
    pub liked_ingredients: Vec<String>,
    #[serde(default)]
    pub disliked_ingredients: Vec<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default = "default_true")]
    pub would_repeat: bool,
}

fn default_true() -> bool {
    true
}

/// Filter for the meal history listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MealHistoryFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub meal_type: Option<MealType>,
    pub family_member_id: Option<i64>,
    #[serde(default)]
    pub rated_only: bool,
    pub limit: Option<i64>,
}

/// A history row joined with its plan and (optionally) one member's feedback
#[derive(Debug, Clone, Serialize)]
pub struct MealHistoryEntry {
    pub id: i64,
    pub meal_plan_id: i64,
    pub date_served: NaiveDate,
    pub actually_eaten: bool,
    pub attendance: serde_json::Value,
    pub rating: Option<i64>,
    pub prep_time_actual: Option<i64>,
    pub leftovers: bool,
    pub notes: Option<String>,
    pub meal_title: String,
    pub meal_type: MealType,
    pub ingredients: Vec<Ingredient>,
    pub feedback_rating: Option<i64>,
    pub liked_ingredients: Vec<String>,
    pub disliked_ingredients: Vec<String>,
    pub feedback_comments: Option<String>,
    pub member_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealPattern {
    pub id: i64,
    pub pattern_type: MealPatternType,
    pub pattern_data: serde_json::Value,
    pub confidence_score: f64,
    pub observation_count: i64,
    pub last_observed: DateTime<Utc>,
}

/// A learned ingredient preference for one family member
#[derive(Debug, Clone, Serialize)]
pub struct IngredientPreference {
    pub ingredient: String,
    /// -100 (hated) to 100 (loved)
    pub preference_score: i64,
    pub occurrence_count: i64,
    pub last_updated: DateTime<Utc>,
}

/// Feedback aggregated per meal type for one member
#[derive(Debug, Clone, Serialize)]
pub struct MealTypeStat {
    pub meal_type: MealType,
    pub avg_rating: f64,
    pub meal_count: i64,
    pub would_repeat_count: i64,
    pub repeat_percentage: f64,
}

/// Family-wide aggregate of one ingredient's preference scores
#[derive(Debug, Clone, Serialize)]
pub struct IngredientSummary {
    pub ingredient: String,
    pub avg_score: f64,
    pub member_count: i64,
    pub total_occurrences: i64,
    pub min_score: i64,
    pub max_score: i64,
}
