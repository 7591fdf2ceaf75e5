//! Meal planning service
//!
//! Weekly plans, shopping lists, nutrition totals, and suggestions drawn
//! from the built-in meal catalogue (`meal_catalog.yml`).

use crate::db::repositories::{FamilyMemberRepository, MealPlanRepository};
use crate::models::{CreateMealPlanInput, Ingredient, MealPlan, MealType, UpdateMealPlanInput};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const CATALOG_YAML: &str = include_str!("meal_catalog.yml");

/// Titles planned this recently are not suggested again
const RECENT_DAYS: i64 = 14;
const MAX_SUGGESTIONS: usize = 12;
const BASE_SERVINGS: f64 = 4.0;
const SEASONAL_BOOST: f64 = 1.2;

const OTHER_SECTION: &str = "Other";

/// Store sections with the name fragments that place an ingredient in them
const STORE_SECTIONS: &[(&str, &[&str])] = &[
    (
        "Produce",
        &[
            "lettuce", "tomato", "onion", "garlic", "carrot", "celery", "bell pepper", "broccoli",
            "spinach", "cucumber", "apple", "banana", "lemon", "lime", "orange", "potato",
            "sweet potato", "mushroom", "avocado", "herbs", "parsley", "basil", "cilantro",
            "thyme", "rosemary",
        ],
    ),
    (
        "Dairy & Eggs",
        &[
            "milk", "cheese", "butter", "yogurt", "cream", "egg", "sour cream", "cottage cheese",
            "mozzarella", "cheddar", "parmesan",
        ],
    ),
    (
        "Meat & Seafood",
        &[
            "chicken", "beef", "pork", "fish", "salmon", "shrimp", "turkey", "bacon", "ham",
            "ground beef", "ground turkey",
        ],
    ),
    (
        "Pantry",
        &[
            "rice", "pasta", "flour", "sugar", "salt", "pepper", "oil", "vinegar", "soy sauce",
            "olive oil", "canned", "beans", "sauce", "spices", "honey", "maple syrup",
        ],
    ),
    (
        "Frozen",
        &["frozen", "ice cream", "frozen vegetables", "frozen fruit"],
    ),
    (
        "Bakery",
        &["bread", "bagel", "roll", "tortilla", "pita", "croissant"],
    ),
];

#[derive(Debug, Clone, Deserialize)]
struct Catalog {
    seasonal: SeasonalTitles,
    meals: Vec<CatalogMeal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SeasonalTitles {
    spring: Vec<String>,
    summer: Vec<String>,
    fall: Vec<String>,
    winter: Vec<String>,
}

impl SeasonalTitles {
    /// Titles in season for a zero-based month
    fn for_month(&self, month0: u32) -> &[String] {
        match month0 {
            2..=4 => &self.spring,
            5..=7 => &self.summer,
            8..=10 => &self.fall,
            _ => &self.winter,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogMeal {
    title: String,
    meal_type: MealType,
    prep_time: i64,
    servings: i64,
    popularity: f64,
    #[serde(default)]
    vegetarian: bool,
    #[serde(default)]
    gluten_free: bool,
    #[serde(default)]
    dairy_free: bool,
    difficulty: String,
    tags: Vec<String>,
    description: String,
    ingredients: Vec<Ingredient>,
    nutrition_info: serde_json::Value,
}

static CATALOG: Lazy<Catalog> = Lazy::new(|| match serde_yaml::from_str(CATALOG_YAML) {
    Ok(catalog) => catalog,
    Err(e) => {
        tracing::error!("Invalid meal catalogue: {}", e);
        Catalog {
            seasonal: SeasonalTitles::default(),
            meals: Vec::new(),
        }
    }
});

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub sources: Vec<String>,
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub date_range: DateRange,
    pub categories: BTreeMap<String, Vec<ShoppingItem>>,
    pub total_items: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestRequest {
    #[serde(default)]
    pub meal_type: Option<MealType>,
    #[serde(default)]
    pub servings: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealSuggestion {
    pub title: String,
    pub meal_type: MealType,
    pub prep_time: i64,
    pub servings: i64,
    pub ingredients: Vec<Ingredient>,
    pub nutrition_info: serde_json::Value,
    pub tags: Vec<String>,
    pub difficulty: String,
    pub description: String,
}

/// Dietary restrictions that apply to the whole family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FamilyDiet {
    vegetarian: bool,
    gluten_free: bool,
    dairy_free: bool,
}

pub struct MealService {
    plans: Arc<dyn MealPlanRepository>,
    family: Arc<dyn FamilyMemberRepository>,
}

impl MealService {
    pub fn new(plans: Arc<dyn MealPlanRepository>, family: Arc<dyn FamilyMemberRepository>) -> Self {
        Self { plans, family }
    }

    /// Plans for the seven days starting at `start` (`YYYY-MM-DD`)
    pub async fn week(&self, start: &str) -> ServiceResult<Vec<MealPlan>> {
        let start = parse_date(start)?;
        let end = start + Duration::days(6);
        Ok(self
            .plans
            .list_between(start, end)
            .await
            .context("Failed to list week")?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<MealPlan> {
        self.plans
            .get_by_id(id)
            .await
            .context("Failed to get meal plan")?
            .ok_or_else(|| ServiceError::not_found("Meal"))
    }

    pub async fn create(&self, input: CreateMealPlanInput) -> ServiceResult<MealPlan> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        let meal_type = parse_meal_type(&input.meal_type)?;

        let plan = MealPlan {
            id: 0,
            date: input.date,
            meal_type,
            title: input.title.trim().to_string(),
            recipe_url: input.recipe_url,
            ingredients: input.ingredients,
            nutrition_info: input.nutrition_info.unwrap_or_else(|| serde_json::json!({})),
            portions: input.portions.unwrap_or_else(|| serde_json::json!({})),
            prep_time: input.prep_time,
            assigned_cook: input.assigned_cook,
            created_at: Utc::now(),
        };
        Ok(self
            .plans
            .create(&plan)
            .await
            .context("Failed to create meal plan")?)
    }

    pub async fn update(&self, id: i64, input: UpdateMealPlanInput) -> ServiceResult<MealPlan> {
        let mut plan = self.get(id).await?;

        if let Some(title) = input.title {
            if title.trim().is_empty() {
                return Err(ServiceError::validation("Title is required"));
            }
            plan.title = title.trim().to_string();
        }
        if let Some(meal_type) = input.meal_type {
            plan.meal_type = parse_meal_type(&meal_type)?;
        }
        if let Some(date) = input.date {
            plan.date = date;
        }
        if input.recipe_url.is_some() {
            plan.recipe_url = input.recipe_url;
        }
        if let Some(ingredients) = input.ingredients {
            plan.ingredients = ingredients;
        }
        if let Some(nutrition) = input.nutrition_info {
            plan.nutrition_info = nutrition;
        }
        if let Some(portions) = input.portions {
            plan.portions = portions;
        }
        if input.prep_time.is_some() {
            plan.prep_time = input.prep_time;
        }
        if input.assigned_cook.is_some() {
            plan.assigned_cook = input.assigned_cook;
        }

        self.plans
            .update(&plan)
            .await
            .context("Failed to update meal plan")?;
        Ok(plan)
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.plans.delete(id).await.context("Failed to delete meal plan")? {
            return Err(ServiceError::not_found("Meal"));
        }
        Ok(())
    }

    pub async fn shopping_list(&self, start: &str, end: &str) -> ServiceResult<ShoppingList> {
        let (start, end) = (parse_date(start)?, parse_date(end)?);
        let plans = self
            .plans
            .list_between(start, end)
            .await
            .context("Failed to list meals for shopping list")?;
        Ok(build_shopping_list(&plans, start, end))
    }

    pub async fn nutrition(&self, start: &str, end: &str) -> ServiceResult<NutritionTotals> {
        let (start, end) = (parse_date(start)?, parse_date(end)?);
        let plans = self
            .plans
            .list_between(start, end)
            .await
            .context("Failed to list meals for nutrition")?;
        Ok(nutrition_totals(&plans))
    }

    /// Up to twelve catalogue meals that fit the family and were not planned recently
    pub async fn suggest(&self, request: &SuggestRequest) -> ServiceResult<Vec<MealSuggestion>> {
        let today = Local::now().date_naive();
        let recent: Vec<String> = self
            .plans
            .titles_since(today - Duration::days(RECENT_DAYS))
            .await
            .context("Failed to list recent meals")?
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();

        let members = self
            .family
            .list()
            .await
            .context("Failed to list family members")?;
        let diet = FamilyDiet {
            vegetarian: members.iter().any(|m| m.dietary_flag("vegetarian")),
            gluten_free: members.iter().any(|m| m.dietary_flag("glutenFree")),
            dairy_free: members.iter().any(|m| m.dietary_flag("dairyFree")),
        };

        Ok(rank_suggestions(
            &CATALOG,
            request,
            &recent,
            diet,
            today.month0(),
        ))
    }
}

fn parse_date(raw: &str) -> ServiceResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ServiceError::validation(format!("Invalid date '{}'", raw)))
}

fn parse_meal_type(raw: &str) -> ServiceResult<MealType> {
    raw.parse()
        .map_err(|_| ServiceError::validation(format!("Invalid meal type '{}'", raw)))
}

/// Store section for an ingredient. A specific category on the ingredient wins.
pub fn categorize_ingredient(name: &str, category: Option<&str>) -> &'static str {
    if let Some(category) = category.filter(|c| !c.is_empty() && *c != OTHER_SECTION) {
        return STORE_SECTIONS
            .iter()
            .find(|(s, _)| *s == category)
            .map(|(section, _)| *section)
            .unwrap_or(OTHER_SECTION);
    }

    let lower = name.to_lowercase();
    STORE_SECTIONS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(section, _)| *section)
        .unwrap_or(OTHER_SECTION)
}

fn build_shopping_list(plans: &[MealPlan], start: NaiveDate, end: NaiveDate) -> ShoppingList {
    struct Line {
        item: ShoppingItem,
        section: &'static str,
    }

    let mut lines: HashMap<String, Line> = HashMap::new();
    for plan in plans {
        for ingredient in &plan.ingredients {
            let key = ingredient.name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let source = ingredient
                .meal_title
                .clone()
                .unwrap_or_else(|| plan.title.clone());

            match lines.get_mut(&key) {
                Some(line) => {
                    line.item.quantity += ingredient.quantity;
                    if !line.item.sources.contains(&source) {
                        line.item.sources.push(source);
                    }
                }
                None => {
                    let section =
                        categorize_ingredient(&ingredient.name, ingredient.category.as_deref());
                    lines.insert(
                        key,
                        Line {
                            item: ShoppingItem {
                                name: ingredient.name.clone(),
                                quantity: ingredient.quantity,
                                unit: ingredient.unit.clone(),
                                sources: vec![source],
                                checked: false,
                            },
                            section,
                        },
                    );
                }
            }
        }
    }

    let total_items = lines.len();
    let mut categories: BTreeMap<String, Vec<ShoppingItem>> = BTreeMap::new();
    for line in lines.into_values() {
        categories
            .entry(line.section.to_string())
            .or_default()
            .push(line.item);
    }
    for items in categories.values_mut() {
        items.sort_by(|a, b| a.name.cmp(&b.name));
    }

    ShoppingList {
        date_range: DateRange { start, end },
        categories,
        total_items,
        generated_at: Utc::now(),
    }
}

fn nutrition_totals(plans: &[MealPlan]) -> NutritionTotals {
    let value = |plan: &MealPlan, key: &str| {
        plan.nutrition_info
            .get(key)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    };

    plans.iter().fold(NutritionTotals::default(), |mut acc, plan| {
        acc.calories += value(plan, "calories");
        acc.protein += value(plan, "protein");
        acc.carbs += value(plan, "carbs");
        acc.fat += value(plan, "fat");
        acc.fiber += value(plan, "fiber");
        acc
    })
}

fn rank_suggestions(
    catalog: &Catalog,
    request: &SuggestRequest,
    recent_titles: &[String],
    diet: FamilyDiet,
    month0: u32,
) -> Vec<MealSuggestion> {
    let in_season = catalog.seasonal.for_month(month0);
    let servings = request.servings.unwrap_or(4).max(1) as f64;

    let mut ranked: Vec<(f64, &CatalogMeal)> = catalog
        .meals
        .iter()
        .filter(|m| request.meal_type.map_or(true, |t| m.meal_type == t))
        .filter(|m| !recent_titles.contains(&m.title.to_lowercase()))
        .filter(|m| !diet.vegetarian || m.vegetarian)
        .filter(|m| !diet.gluten_free || m.gluten_free)
        .filter(|m| !diet.dairy_free || m.dairy_free)
        .map(|m| {
            let boost = if in_season.contains(&m.title) {
                SEASONAL_BOOST
            } else {
                1.0
            };
            (m.popularity * boost, m)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, m)| MealSuggestion {
            title: m.title.clone(),
            meal_type: m.meal_type,
            prep_time: m.prep_time,
            servings: m.servings,
            ingredients: scale_ingredients(&m.ingredients, servings),
            nutrition_info: m.nutrition_info.clone(),
            tags: m.tags.clone(),
            difficulty: m.difficulty.clone(),
            description: m.description.clone(),
        })
        .collect()
}

fn scale_ingredients(ingredients: &[Ingredient], servings: f64) -> Vec<Ingredient> {
    let factor = servings / BASE_SERVINGS;
    ingredients
        .iter()
        .map(|i| Ingredient {
            quantity: (i.quantity * factor * 100.0).round() / 100.0,
            ..i.clone()
        })
        .collect()
}
