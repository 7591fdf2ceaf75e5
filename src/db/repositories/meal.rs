//! Meal plan repository

use crate::db::DynDatabasePool;
use crate::models::{parse_json_column, MealPlan};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

use super::family_member::json_object;

const MEAL_ORDER: &str = "ORDER BY date, CASE meal_type \
     WHEN 'breakfast' THEN 1 WHEN 'lunch' THEN 2 WHEN 'dinner' THEN 3 ELSE 4 END";

#[async_trait]
pub trait MealPlanRepository: Send + Sync {
    /// Insert a plan; `id` and `created_at` of the argument are ignored
    async fn create(&self, plan: &MealPlan) -> Result<MealPlan>;

    async fn get_by_id(&self, id: i64) -> Result<Option<MealPlan>>;

    /// Plans dated within `[start, end]`, by date then meal of the day
    async fn list_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MealPlan>>;

    /// Distinct titles planned on or after `since`
    async fn titles_since(&self, since: NaiveDate) -> Result<Vec<String>>;

    async fn update(&self, plan: &MealPlan) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxMealPlanRepository {
    pool: DynDatabasePool,
}

impl SqlxMealPlanRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MealPlanRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MealPlanRepository for SqlxMealPlanRepository {
    async fn create(&self, plan: &MealPlan) -> Result<MealPlan> {
        let result = sqlx::query(
            r#"
            INSERT INTO meal_plans (date, meal_type, title, recipe_url, ingredients,
                                    nutrition_info, portions, prep_time, assigned_cook, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.date)
        .bind(plan.meal_type.as_str())
        .bind(&plan.title)
        .bind(&plan.recipe_url)
        .bind(serde_json::to_string(&plan.ingredients)?)
        .bind(serde_json::to_string(&plan.nutrition_info)?)
        .bind(serde_json::to_string(&plan.portions)?)
        .bind(plan.prep_time)
        .bind(plan.assigned_cook)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create meal plan")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Meal plan vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MealPlan>> {
        let row = sqlx::query("SELECT * FROM meal_plans WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get meal plan")?;

        Ok(row.as_ref().map(row_to_meal_plan))
    }

    async fn list_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MealPlan>> {
        let sql = format!(
            "SELECT * FROM meal_plans WHERE date >= ? AND date <= ? {}",
            MEAL_ORDER
        );
        let rows = sqlx::query(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list meal plans")?;

        Ok(rows.iter().map(row_to_meal_plan).collect())
    }

    async fn titles_since(&self, since: NaiveDate) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT title FROM meal_plans WHERE date >= ?")
            .bind(since)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list recent meal titles")?;

        Ok(rows.iter().map(|r| r.get("title")).collect())
    }

    async fn update(&self, plan: &MealPlan) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE meal_plans
            SET date = ?, meal_type = ?, title = ?, recipe_url = ?, ingredients = ?,
                nutrition_info = ?, portions = ?, prep_time = ?, assigned_cook = ?
            WHERE id = ?
            "#,
        )
        .bind(plan.date)
        .bind(plan.meal_type.as_str())
        .bind(&plan.title)
        .bind(&plan.recipe_url)
        .bind(serde_json::to_string(&plan.ingredients)?)
        .bind(serde_json::to_string(&plan.nutrition_info)?)
        .bind(serde_json::to_string(&plan.portions)?)
        .bind(plan.prep_time)
        .bind(plan.assigned_cook)
        .bind(plan.id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update meal plan")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM meal_plans WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete meal plan")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_meal_plan(row: &SqliteRow) -> MealPlan {
    let meal_type: String = row.get("meal_type");
    let ingredients: String = row.get("ingredients");
    let nutrition: String = row.get("nutrition_info");
    let portions: String = row.get("portions");

    MealPlan {
        id: row.get("id"),
        date: row.get("date"),
        meal_type: meal_type.parse().unwrap_or_default(),
        title: row.get("title"),
        recipe_url: row.get("recipe_url"),
        ingredients: parse_json_column(&ingredients),
        nutrition_info: json_object(&nutrition),
        portions: json_object(&portions),
        prep_time: row.get("prep_time"),
        assigned_cook: row.get("assigned_cook"),
        created_at: row.get("created_at"),
    }
}
