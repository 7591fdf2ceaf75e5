//! Meal planning and meal learning endpoints
//!
//! Planning: weekly view, CRUD, shopping list, nutrition totals and catalogue
//! suggestions. Learning: completions, per-member feedback, history,
//! preferences, success scoring and patterns.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    CreateMealPlanInput, MealCompletionInput, MealFeedbackInput, MealHistoryEntry,
    MealHistoryFilter, MealPattern, MealPatternType, MealPlan, UpdateMealPlanInput,
};
use crate::services::meal::{
    MealSuggestion, NutritionTotals, ShoppingList, SuggestRequest,
};
use crate::services::meal_learning::{
    FamilyIngredientSummary, MemberPreferences, SuccessScore, SuccessScoreRequest,
};

const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
const DEFAULT_PATTERN_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_meal))
        .route("/week/{date}", get(week))
        .route("/shopping-list", get(shopping_list))
        .route("/nutrition", get(nutrition))
        .route("/suggest", post(suggest))
        .route("/history", get(history))
        .route("/preferences/{member_id}", get(member_preferences))
        .route("/success-score", post(success_score))
        .route("/patterns", get(patterns))
        .route("/ingredient-summary", get(ingredient_summary))
        .route("/{id}", get(get_meal).put(update_meal).delete(delete_meal))
        .route("/{id}/complete", post(complete_meal))
        .route("/{id}/feedback", post(meal_feedback))
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRangeQuery {
    fn bounds(&self) -> Result<(&str, &str), ApiError> {
        match (self.start.as_deref(), self.end.as_deref()) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(ApiError::validation_error("Start and end dates are required")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PreferencesQuery {
    #[serde(default)]
    pub min_occurrences: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PatternsQuery {
    pub pattern_type: Option<String>,
    pub min_confidence: Option<f64>,
    pub limit: Option<i64>,
}

async fn week(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<MealPlan>>, ApiError> {
    Ok(Json(state.meal_service.week(&date).await?))
}

async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MealPlan>, ApiError> {
    Ok(Json(state.meal_service.get(id).await?))
}

async fn create_meal(
    State(state): State<AppState>,
    Json(input): Json<CreateMealPlanInput>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = state.meal_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn update_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMealPlanInput>,
) -> Result<Json<MealPlan>, ApiError> {
    Ok(Json(state.meal_service.update(id, input).await?))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.meal_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn shopping_list(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<ShoppingList>, ApiError> {
    let (start, end) = query.bounds()?;
    Ok(Json(state.meal_service.shopping_list(start, end).await?))
}

async fn nutrition(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<NutritionTotals>, ApiError> {
    let (start, end) = query.bounds()?;
    Ok(Json(state.meal_service.nutrition(start, end).await?))
}

async fn suggest(
    State(state): State<AppState>,
    body: Option<Json<SuggestRequest>>,
) -> Result<Json<Vec<MealSuggestion>>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.meal_service.suggest(&request).await?))
}

async fn complete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<MealCompletionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.meal_learning_service.record_completion(id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn meal_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<MealFeedbackInput>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback_id = state.meal_learning_service.record_feedback(id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": feedback_id,
            "message": "Feedback recorded",
        })),
    ))
}

async fn history(
    State(state): State<AppState>,
    Query(filter): Query<MealHistoryFilter>,
) -> Result<Json<Vec<MealHistoryEntry>>, ApiError> {
    Ok(Json(state.meal_learning_service.history(&filter).await?))
}

async fn member_preferences(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
    Query(query): Query<PreferencesQuery>,
) -> Result<Json<MemberPreferences>, ApiError> {
    let min_occurrences = query.min_occurrences.unwrap_or(1);
    Ok(Json(
        state
            .meal_learning_service
            .member_preferences(member_id, min_occurrences)
            .await?,
    ))
}

async fn success_score(
    State(state): State<AppState>,
    Json(request): Json<SuccessScoreRequest>,
) -> Result<Json<SuccessScore>, ApiError> {
    Ok(Json(state.meal_learning_service.success_score(&request).await?))
}

async fn patterns(
    State(state): State<AppState>,
    Query(query): Query<PatternsQuery>,
) -> Result<Json<Vec<MealPattern>>, ApiError> {
    let pattern_type = query
        .pattern_type
        .as_deref()
        .map(str::parse::<MealPatternType>)
        .transpose()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    Ok(Json(
        state
            .meal_learning_service
            .patterns(
                pattern_type,
                query.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                query.limit.unwrap_or(DEFAULT_PATTERN_LIMIT),
            )
            .await?,
    ))
}

async fn ingredient_summary(
    State(state): State<AppState>,
) -> Result<Json<FamilyIngredientSummary>, ApiError> {
    Ok(Json(state.meal_learning_service.ingredient_summary().await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, signed_in_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_meal_plan_and_shopping_list() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (status, plan) = send(
            &app,
            Method::POST,
            "/api/meals",
            token,
            Some(json!({
                "date": "2026-05-04",
                "meal_type": "dinner",
                "title": "Tacos",
                "ingredients": [
                    {"name": "Ground beef", "quantity": 1.0, "unit": "lb"},
                    {"name": "Tortillas", "quantity": 8.0, "unit": "pieces"},
                ],
                "nutrition_info": {"calories": 650, "protein": 30},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(plan["meal_type"], "dinner");

        let (status, week) = send(&app, Method::GET, "/api/meals/week/2026-05-01", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(week.as_array().unwrap().len(), 1);

        let (status, list) = send(
            &app,
            Method::GET,
            "/api/meals/shopping-list?start=2026-05-01&end=2026-05-07",
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total_items"], 2);

        let (status, totals) = send(
            &app,
            Method::GET,
            "/api/meals/nutrition?start=2026-05-01&end=2026-05-07",
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(totals["calories"], 650.0);

        let (status, _) = send(&app, Method::GET, "/api/meals/shopping-list", token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_meal_completion_rating_bounds() {
        let (app, token) = signed_in_app().await;
        let token = Some(token.as_str());

        let (_, plan) = send(
            &app,
            Method::POST,
            "/api/meals",
            token,
            Some(json!({"date": "2026-05-04", "meal_type": "lunch", "title": "Soup"})),
        )
        .await;
        let id = plan["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/meals/{}/complete", id),
            token,
            Some(json!({"rating": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/meals/9999/complete",
            token,
            Some(json!({"rating": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/meals/{}/complete", id),
            token,
            Some(json!({"rating": 5, "date_served": "2026-05-04"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, history) = send(&app, Method::GET, "/api/meals/history", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_success_score_without_data_is_experimental() {
        let (app, token) = signed_in_app().await;
        let (status, score) = send(
            &app,
            Method::POST,
            "/api/meals/success-score",
            Some(&token),
            Some(json!({"ingredients": [], "meal_type": "dinner", "family_members": []})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(score["score"], 50);
        assert!(score["recommendation"].as_str().unwrap().contains("experimental"));
    }

    #[tokio::test]
    async fn test_patterns_rejects_unknown_type() {
        let (app, token) = signed_in_app().await;
        let (status, _) =
            send(&app, Method::GET, "/api/meals/patterns?pattern_type=monthly", Some(&token), None)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
