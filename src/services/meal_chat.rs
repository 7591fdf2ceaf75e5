//! Meal planning chat
//!
//! A rule-based assistant. Each message is classified into an intent and
//! answered from the meal plans, learned preferences and family members in
//! the database. Conversations live in a bounded moka cache and expire after
//! sitting idle.

use crate::config::MealChatConfig;
use crate::db::repositories::{FamilyMemberRepository, MealLearningRepository, MealPlanRepository};
use crate::models::{Ingredient, MealHistoryFilter, MealPlan, MealType, MemberType};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use moka::future::Cache;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const MAX_WEEK_SUGGESTIONS: usize = 12;
const DAY_OPTIONS: usize = 3;
const MAX_INGREDIENT_SUGGESTIONS: usize = 4;
const DEFAULT_PREP_MINUTES: i64 = 30;

const GREETINGS: [&str; 4] = [
    "I'm here to help with meal planning! What would you like to work on today?",
    "Let's plan some great meals for your family. What are you thinking about?",
    "I can help you plan meals based on what your family likes. What's on your mind?",
    "Ready to make meal planning easier? Tell me what you need help with.",
];

const COMMON_INGREDIENTS: [&str; 8] = [
    "chicken", "beef", "fish", "pasta", "rice", "eggs", "cheese", "vegetables",
];

struct ChatMeal {
    title: &'static str,
    prep_time: i64,
    tags: &'static [&'static str],
    calories: i64,
}

const BREAKFASTS: &[ChatMeal] = &[
    ChatMeal { title: "Pancakes with Berries", prep_time: 20, tags: &["sweet", "kid-friendly"], calories: 320 },
    ChatMeal { title: "Scrambled Eggs and Toast", prep_time: 10, tags: &["protein", "quick"], calories: 280 },
    ChatMeal { title: "Oatmeal with Fruit", prep_time: 8, tags: &["healthy", "filling"], calories: 250 },
    ChatMeal { title: "Smoothie Bowl", prep_time: 5, tags: &["healthy", "colorful"], calories: 200 },
];

const LUNCHES: &[ChatMeal] = &[
    ChatMeal { title: "Grilled Cheese and Soup", prep_time: 15, tags: &["comfort", "kid-friendly"], calories: 380 },
    ChatMeal { title: "Caesar Salad with Chicken", prep_time: 12, tags: &["healthy", "protein"], calories: 350 },
    ChatMeal { title: "Turkey and Avocado Wrap", prep_time: 8, tags: &["fresh", "portable"], calories: 320 },
    ChatMeal { title: "Leftover Transformation Bowl", prep_time: 10, tags: &["creative", "waste-free"], calories: 300 },
];

const DINNERS: &[ChatMeal] = &[
    ChatMeal { title: "Spaghetti with Meat Sauce", prep_time: 30, tags: &["family-favorite", "filling"], calories: 450 },
    ChatMeal { title: "Baked Salmon with Vegetables", prep_time: 25, tags: &["healthy", "omega-3"], calories: 380 },
    ChatMeal { title: "Chicken Stir Fry", prep_time: 20, tags: &["quick", "vegetables"], calories: 360 },
    ChatMeal { title: "Taco Tuesday Special", prep_time: 25, tags: &["fun", "interactive"], calories: 400 },
    ChatMeal { title: "Homemade Pizza", prep_time: 35, tags: &["weekend", "kid-friendly"], calories: 420 },
    ChatMeal { title: "Shepherd's Pie", prep_time: 45, tags: &["comfort", "hearty"], calories: 480 },
];

/// Meals built around one ingredient: (ingredient, title, prep minutes, description)
const INGREDIENT_MEALS: &[(&str, &str, i64, &str)] = &[
    ("chicken", "Chicken Stir Fry", 25, "Quick and healthy with vegetables"),
    ("chicken", "Honey Garlic Chicken", 30, "Sweet and savory, kid-friendly"),
    ("chicken", "Chicken and Rice Bowl", 20, "Simple one-bowl meal"),
    ("pasta", "Spaghetti with Marinara", 15, "Classic family favorite"),
    ("pasta", "Creamy Chicken Pasta", 25, "Rich and satisfying"),
    ("pasta", "Veggie Pasta Salad", 10, "Light and fresh"),
    ("eggs", "Scrambled Eggs and Toast", 10, "Perfect for breakfast"),
    ("eggs", "Vegetable Frittata", 20, "Healthy and filling"),
    ("eggs", "Egg Fried Rice", 15, "Great for using leftovers"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatIntent {
    PlanWeek,
    PlanDay,
    ProvideFeedback,
    MentionIngredients,
    MentionConstraints,
    AskQuestion,
    GeneralConversation,
}

impl ChatIntent {
    pub fn confidence(&self) -> f64 {
        match self {
            ChatIntent::PlanWeek => 0.9,
            ChatIntent::ProvideFeedback => 0.8,
            ChatIntent::PlanDay | ChatIntent::MentionIngredients | ChatIntent::MentionConstraints => 0.7,
            ChatIntent::AskQuestion => 0.6,
            ChatIntent::GeneralConversation => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMealSuggestion {
    pub title: String,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub prep_time: i64,
    pub success_score: f64,
    pub description: String,
    pub ingredients: Vec<Ingredient>,
    pub nutrition_info: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub based_on_ingredient: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub suggestions: Vec<ChatMealSuggestion>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationContext {
    pub mentioned_ingredients: Vec<String>,
    pub constraints: Vec<String>,
    pub last_intent: Option<ChatIntent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub context: ConversationContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            context: ConversationContext::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn push(&mut self, role: ChatRole, content: String, suggestions: Vec<ChatMealSuggestion>, window: usize) {
        let now = Utc::now();
        self.messages.push(ChatMessage {
            role,
            content,
            timestamp: now,
            suggestions,
        });
        if self.messages.len() > window {
            let excess = self.messages.len() - window;
            self.messages.drain(..excess);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub conversation_id: String,
    pub response: String,
    pub meal_suggestions: Vec<ChatMealSuggestion>,
    pub structured_data: Option<serde_json::Value>,
    pub intent: ChatIntent,
    pub confidence: f64,
}

/// Text plus optional suggestions produced by one intent handler
struct Answer {
    text: String,
    suggestions: Vec<ChatMealSuggestion>,
    structured_data: Option<serde_json::Value>,
}

impl From<String> for Answer {
    fn from(text: String) -> Self {
        Self {
            text,
            suggestions: Vec::new(),
            structured_data: None,
        }
    }
}

pub struct MealChatService {
    conversations: Cache<String, Arc<Mutex<Conversation>>>,
    history_window: usize,
    plans: Arc<dyn MealPlanRepository>,
    learning: Arc<dyn MealLearningRepository>,
    family: Arc<dyn FamilyMemberRepository>,
    /// User messages seen across all conversations, drives the greeting rotation
    turns: std::sync::atomic::AtomicUsize,
}

impl MealChatService {
    pub fn new(
        config: &MealChatConfig,
        plans: Arc<dyn MealPlanRepository>,
        learning: Arc<dyn MealLearningRepository>,
        family: Arc<dyn FamilyMemberRepository>,
    ) -> Self {
        let conversations = Cache::builder()
            .max_capacity(config.max_conversations)
            .time_to_idle(std::time::Duration::from_secs(config.idle_minutes * 60))
            .build();

        Self {
            conversations,
            history_window: config.history_window.max(2),
            plans,
            learning,
            family,
            turns: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Answer one message, creating the conversation when needed
    pub async fn send(&self, message: &str, conversation_id: Option<&str>) -> ServiceResult<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::validation("Message is required"));
        }

        let id = conversation_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let entry = self
            .conversations
            .get_with(id.clone(), async { Arc::new(Mutex::new(Conversation::new(id.clone()))) })
            .await;
        let mut conversation = entry.lock().await;

        conversation.push(ChatRole::User, message.to_string(), Vec::new(), self.history_window);
        let intent = detect_intent(message);
        let lower = message.to_lowercase();
        remember(&mut conversation.context, intent, &lower);

        let answer = match intent {
            ChatIntent::PlanWeek => self.plan_week(&lower).await?,
            ChatIntent::PlanDay => self.plan_day(&lower).await?,
            ChatIntent::ProvideFeedback => self.feedback(&lower).await?.into(),
            ChatIntent::AskQuestion => self.question(&lower).await?.into(),
            ChatIntent::MentionIngredients => ingredient_answer(&lower),
            ChatIntent::MentionConstraints => constraint_answer(&lower).into(),
            ChatIntent::GeneralConversation => {
                let turn = self.turns.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                GREETINGS[turn % GREETINGS.len()].to_string().into()
            }
        };

        conversation.push(
            ChatRole::Assistant,
            answer.text.clone(),
            answer.suggestions.clone(),
            self.history_window,
        );
        tracing::debug!(conversation_id = %id, intent = ?intent, "Meal chat reply");

        Ok(ChatReply {
            conversation_id: id,
            response: answer.text,
            meal_suggestions: answer.suggestions,
            structured_data: answer.structured_data,
            intent,
            confidence: intent.confidence(),
        })
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Conversation> {
        let entry = self
            .conversations
            .get(id)
            .await
            .ok_or_else(|| ServiceError::not_found("Conversation"))?;
        let conversation = entry.lock().await.clone();
        Ok(conversation)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        self.conversations
            .remove(id)
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("Conversation"))
    }

    async fn plan_week(&self, lower: &str) -> ServiceResult<Answer> {
        let today = Local::now().date_naive();
        let mut monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        if lower.contains("next week") {
            monday += Duration::days(7);
        }
        let sunday = monday + Duration::days(6);

        let existing = self
            .plans
            .list_between(monday, sunday)
            .await
            .context("Failed to list planned meals")?;
        let suggestions = week_suggestions(monday, &existing);

        let mut text = format!(
            "Great! I'll help you plan meals for the week of {}. ",
            monday.format("%A, %b %-d")
        );
        if suggestions.is_empty() {
            text.push_str("Every meal that week is already planned. Want to swap any of them?");
        } else {
            text.push_str("Here are some suggestions based on your family's preferences and recent meals:");
        }

        Ok(Answer {
            text,
            suggestions,
            structured_data: Some(json!({
                "week_range": {"start": monday, "end": sunday},
                "existing_meals": existing,
            })),
        })
    }

    async fn plan_day(&self, lower: &str) -> ServiceResult<Answer> {
        let today = Local::now().date_naive();
        let (date, day_text) = if lower.contains("tomorrow") {
            (today + Duration::days(1), "tomorrow")
        } else {
            (today, "today")
        };
        let meal_type = requested_meal_type(lower);

        let mut suggestions: Vec<ChatMealSuggestion> = Vec::new();
        for variant in 0..DAY_OPTIONS {
            let suggestion = catalog_suggestion(date, meal_type, variant);
            if !suggestions.iter().any(|s| s.title == suggestion.title) {
                suggestions.push(suggestion);
            }
        }

        let mut text = format!("Let me suggest some {} options for {}. ", meal_type, day_text);
        let recent = self
            .learning
            .list_history(&MealHistoryFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .context("Failed to load recent meals")?;
        if let Some(last) = recent.first().filter(|m| m.rating.or(m.feedback_rating).is_some_and(|r| r >= 4)) {
            text.push_str(&format!(
                "Since everyone enjoyed the {} recently, I'll keep similar preferences in mind. ",
                last.meal_title
            ));
        }

        Ok(Answer {
            text,
            suggestions,
            structured_data: Some(json!({
                "day_context": {"date": date, "meal_type": meal_type},
            })),
        })
    }

    async fn feedback(&self, lower: &str) -> ServiceResult<String> {
        let mut text = String::from("Thanks for the feedback! ");

        if lower.contains("love") || lower.contains("great") {
            text.push_str("I'm glad everyone enjoyed it. I'll remember that for future meal suggestions. ");
            let members = self.mentioned_members(lower).await?;
            if !members.is_empty() {
                text.push_str(&format!(
                    "I've noted that {} particularly liked this. ",
                    members.join(" and ")
                ));
            }
        } else if lower.contains("hate") || lower.contains("didn't like") {
            text.push_str("I'm sorry that didn't work out well. I'll avoid suggesting similar meals in the future. ");
            let disliked = disliked_mentions(lower);
            if !disliked.is_empty() {
                text.push_str(&format!("I'll remember that {} didn't go over well. ", disliked.join(", ")));
            }
        }

        text.push_str("Is there anything specific you'd like me to suggest instead?");
        Ok(text)
    }

    /// Family member names in the message. "kids" and "children" stand for every child.
    async fn mentioned_members(&self, lower: &str) -> ServiceResult<Vec<String>> {
        let members = self.family.list().await.context("Failed to list family members")?;
        let all_kids = lower.contains("kids") || lower.contains("children");

        let mut names: Vec<String> = Vec::new();
        for member in &members {
            let named = !member.name.is_empty() && lower.contains(&member.name.to_lowercase());
            let as_kid = all_kids && member.member_type == MemberType::Child;
            if (named || as_kid) && !names.contains(&member.name) {
                names.push(member.name.clone());
            }
        }
        Ok(names)
    }

    async fn question(&self, lower: &str) -> ServiceResult<String> {
        let members = self.family.list().await.context("Failed to list family members")?;
        let kids: Vec<_> = members
            .iter()
            .filter(|m| m.member_type == MemberType::Child)
            .collect();
        let asks_about_kids = lower.contains("kids")
            || lower.contains("children")
            || kids.iter().any(|k| lower.contains(&k.name.to_lowercase()));

        if lower.contains("what") && asks_about_kids {
            let names: Vec<String> = kids.iter().map(|k| k.name.clone()).collect();
            let mut liked: Vec<String> = Vec::new();
            for kid in &kids {
                let prefs = self
                    .learning
                    .list_preferences(kid.id, 2)
                    .await
                    .context("Failed to list preferences")?;
                for pref in prefs.into_iter().filter(|p| p.preference_score >= 20) {
                    if !liked.contains(&pref.ingredient) {
                        liked.push(pref.ingredient);
                    }
                }
            }

            let who = if names.is_empty() {
                "The kids".to_string()
            } else {
                join_names(&names)
            };
            if !liked.is_empty() {
                liked.truncate(3);
                return Ok(format!(
                    "Based on their eating history, {} tend to enjoy {}. They also prefer meals with mild flavors and finger-friendly foods.",
                    who,
                    liked.join(", ")
                ));
            }
            return Ok(format!(
                "{} generally prefer milder flavors, pasta dishes, and meals they can eat easily. They're usually more adventurous with foods that are colorful and fun!",
                who
            ));
        }

        if lower.contains("how often") || lower.contains("frequency") {
            let patterns = self
                .learning
                .list_patterns(None, 0.4, 10)
                .await
                .context("Failed to list meal patterns")?;
            if patterns.is_empty() {
                return Ok("Based on your meal history, I can help you understand your family's eating patterns. What specific frequency information would you like to know?".to_string());
            }
            let recent = self.recent_plans().await?;
            return Ok(format!(
                "Looking at your family's eating patterns, you have {} recurring meal patterns. In the past month, you've had {} planned meals total.",
                patterns.len(),
                recent.len()
            ));
        }

        if lower.contains("nutritious") || lower.contains("healthy") {
            return Ok("I focus on balanced meals with plenty of vegetables, lean proteins, and whole grains. I can suggest meals that are both nutritious and appealing to kids - would you like some specific healthy meal ideas?".to_string());
        }

        if lower.contains("prep time") || lower.contains("quick") {
            let recent = self.recent_plans().await?;
            let average = if recent.is_empty() {
                DEFAULT_PREP_MINUTES as f64
            } else {
                recent
                    .iter()
                    .map(|p| p.prep_time.unwrap_or(DEFAULT_PREP_MINUTES) as f64)
                    .sum::<f64>()
                    / recent.len() as f64
            };
            return Ok(format!(
                "Your recent meals average about {} minutes of prep time. For busy weeknights, I can suggest 15-20 minute meals that your family will still love. Would you like some quick meal ideas?",
                average.round() as i64
            ));
        }

        Ok("I'd be happy to help answer that! Could you be more specific about what aspect of meal planning you'd like to know about?".to_string())
    }

    async fn recent_plans(&self) -> ServiceResult<Vec<MealPlan>> {
        let today = Local::now().date_naive();
        Ok(self
            .plans
            .list_between(today - Duration::days(30), today)
            .await
            .context("Failed to list recent meals")?)
    }
}

pub fn detect_intent(message: &str) -> ChatIntent {
    let lower = message.trim().to_lowercase();
    let has = |needle: &str| lower.contains(needle);
    let asks = has("plan") || has("help me") || has("what should");

    if asks && has("week") {
        return ChatIntent::PlanWeek;
    }
    if (asks && (has("tomorrow") || has("tonight")))
        || has("dinner")
        || has("breakfast")
        || has("lunch")
    {
        return ChatIntent::PlanDay;
    }
    if has("didn't like") || has("loved") || has("hated") {
        return ChatIntent::ProvideFeedback;
    }
    let owns = has("have") || has("got");
    if (has("have") && (has("leftover") || has("ingredient")))
        || (owns && COMMON_INGREDIENTS.iter().any(|i| lower.contains(i)))
    {
        return ChatIntent::MentionIngredients;
    }
    if has("coming") || has("guest") || has("busy") {
        return ChatIntent::MentionConstraints;
    }
    if lower.starts_with("what") || lower.starts_with("how") || lower.starts_with("when") {
        return ChatIntent::AskQuestion;
    }
    ChatIntent::GeneralConversation
}

fn remember(context: &mut ConversationContext, intent: ChatIntent, lower: &str) {
    for ingredient in mentioned_ingredients(lower) {
        if !context.mentioned_ingredients.contains(&ingredient) {
            context.mentioned_ingredients.push(ingredient);
        }
    }
    for constraint in constraints(lower) {
        if !context.constraints.iter().any(|c| c == constraint) {
            context.constraints.push(constraint.to_string());
        }
    }
    context.last_intent = Some(intent);
}

fn mentioned_ingredients(lower: &str) -> Vec<String> {
    COMMON_INGREDIENTS
        .iter()
        .filter(|i| lower.contains(*i))
        .map(|i| i.to_string())
        .collect()
}

fn constraints(lower: &str) -> Vec<&'static str> {
    let mut found = Vec::new();
    if lower.contains("guest") || lower.contains("company") || lower.contains("coming") {
        found.push("guests");
    }
    if lower.contains("busy") || lower.contains("quick") {
        found.push("busy");
    }
    if lower.contains("leftover") {
        found.push("leftovers");
    }
    if lower.contains("soccer") || lower.contains("practice") {
        found.push("activities");
    }
    found
}

fn disliked_mentions(lower: &str) -> Vec<&'static str> {
    [("mushroom", "mushrooms"), ("onion", "onions"), ("spicy", "spicy food")]
        .iter()
        .filter(|(needle, _)| lower.contains(needle))
        .map(|(_, label)| *label)
        .collect()
}

/// Meal type named in the message; dinner when none is
fn requested_meal_type(lower: &str) -> MealType {
    if lower.contains("dinner") || lower.contains("tonight") {
        MealType::Dinner
    } else if lower.contains("lunch") {
        MealType::Lunch
    } else if lower.contains("breakfast") {
        MealType::Breakfast
    } else {
        MealType::Dinner
    }
}

fn constraint_answer(lower: &str) -> String {
    let found = constraints(lower);
    let mut text = String::from("I understand. ");
    if found.contains(&"guests") {
        text.push_str("For guest-friendly meals, I'd recommend dishes that have been popular with your whole family. ");
    }
    if found.contains(&"busy") {
        text.push_str("For busy days, I'll focus on meals that take 30 minutes or less to prepare. ");
    }
    if found.contains(&"leftovers") {
        text.push_str("I can suggest meals that use up leftovers or transform them into something new. ");
    }
    text.push_str("What specific meals would you like me to help plan?");
    text
}

fn ingredient_answer(lower: &str) -> Answer {
    let ingredients = mentioned_ingredients(lower);
    let tomorrow = Local::now().date_naive() + Duration::days(1);

    let suggestions: Vec<ChatMealSuggestion> = ingredients
        .iter()
        .flat_map(|ingredient| {
            INGREDIENT_MEALS
                .iter()
                .filter(move |(key, ..)| *key == ingredient.as_str())
                .map(move |(_, title, prep_time, description)| ChatMealSuggestion {
                    title: title.to_string(),
                    date: tomorrow,
                    meal_type: MealType::Dinner,
                    prep_time: *prep_time,
                    success_score: success_score(title, *prep_time, &[]),
                    description: description.to_string(),
                    ingredients: vec![Ingredient::new(ingredient, 1.0, "portion")],
                    nutrition_info: json!({}),
                    tags: Vec::new(),
                    based_on_ingredient: Some(ingredient.clone()),
                })
        })
        .take(MAX_INGREDIENT_SUGGESTIONS)
        .collect();

    let text = if ingredients.is_empty() {
        "Tell me which ingredients you have and I'll find meals that use them.".to_string()
    } else if suggestions.is_empty() {
        format!(
            "Great! I see you have {}. Let me think of some ways to use those ingredients that your family would enjoy.",
            ingredients.join(", ")
        )
    } else {
        format!(
            "Great! I see you have {}. Here are some meal ideas that use those ingredients and work well for your family:",
            ingredients.join(", ")
        )
    };

    Answer {
        text,
        suggestions,
        structured_data: None,
    }
}

fn week_suggestions(monday: NaiveDate, existing: &[MealPlan]) -> Vec<ChatMealSuggestion> {
    let mut suggestions = Vec::new();
    for offset in 0..7 {
        let date = monday + Duration::days(offset);
        for meal_type in [MealType::Breakfast, MealType::Lunch, MealType::Dinner] {
            let planned = existing
                .iter()
                .any(|p| p.date == date && p.meal_type == meal_type);
            if !planned {
                suggestions.push(catalog_suggestion(date, meal_type, offset as usize));
            }
        }
    }
    suggestions.truncate(MAX_WEEK_SUGGESTIONS);
    suggestions
}

fn catalog_suggestion(date: NaiveDate, meal_type: MealType, variant: usize) -> ChatMealSuggestion {
    let meals = match meal_type {
        MealType::Breakfast => BREAKFASTS,
        MealType::Lunch => LUNCHES,
        MealType::Dinner | MealType::Snack => DINNERS,
    };
    let meal = &meals[variant % meals.len()];

    ChatMealSuggestion {
        title: meal.title.to_string(),
        date,
        meal_type,
        prep_time: meal.prep_time,
        success_score: success_score(meal.title, meal.prep_time, meal.tags),
        description: format!("{} • {} min prep", meal.tags.join(", "), meal.prep_time),
        ingredients: ingredients_for(meal.title),
        nutrition_info: json!({"calories": meal.calories}),
        tags: meal.tags.iter().map(|t| t.to_string()).collect(),
        based_on_ingredient: None,
    }
}

/// Rough shopping ingredients keyed on words in a title
fn ingredients_for(title: &str) -> Vec<Ingredient> {
    let lower = title.to_lowercase();
    if lower.contains("spaghetti") {
        vec![
            Ingredient::new("Spaghetti pasta", 1.0, "lb"),
            Ingredient::new("Ground beef", 1.0, "lb"),
            Ingredient::new("Marinara sauce", 1.0, "jar"),
        ]
    } else if lower.contains("chicken") {
        vec![
            Ingredient::new("Chicken breast", 1.5, "lbs"),
            Ingredient::new("Olive oil", 2.0, "tbsp"),
            Ingredient::new("Seasonings", 1.0, "tsp"),
        ]
    } else if lower.contains("salmon") {
        vec![
            Ingredient::new("Salmon fillet", 1.5, "lbs"),
            Ingredient::new("Lemon", 1.0, "whole"),
            Ingredient::new("Vegetables", 2.0, "cups"),
        ]
    } else {
        vec![
            Ingredient::new("Main ingredient", 1.0, "portion"),
            Ingredient::new("Supporting ingredients", 1.0, "portion"),
        ]
    }
}

pub fn success_score(title: &str, prep_time: i64, tags: &[&str]) -> f64 {
    let lower = title.to_lowercase();
    let mut score = 0.5;
    if tags.contains(&"kid-friendly") {
        score += 0.2;
    }
    if prep_time <= 20 {
        score += 0.1;
    }
    if lower.contains("chicken") {
        score += 0.1;
    }
    if lower.contains("pasta") {
        score += 0.15;
    }
    if tags.contains(&"healthy") {
        score += 0.1;
    }
    let clamped: f64 = f64::clamp(score, 0.1, 1.0);
    (clamped * 100.0).round() / 100.0
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::meal::tests::plan;
    use crate::db::repositories::{
        SqlxFamilyMemberRepository, SqlxMealLearningRepository, SqlxMealPlanRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::CreateFamilyMemberInput;

    async fn setup_test_service() -> (MealChatService, Arc<dyn MealPlanRepository>, Arc<dyn FamilyMemberRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let plans = SqlxMealPlanRepository::boxed(pool.clone());
        let family = SqlxFamilyMemberRepository::boxed(pool.clone());
        let service = MealChatService::new(
            &MealChatConfig::default(),
            plans.clone(),
            SqlxMealLearningRepository::boxed(pool),
            family.clone(),
        );
        (service, plans, family)
    }

    async fn add_member(family: &Arc<dyn FamilyMemberRepository>, name: &str, member_type: MemberType) {
        family
            .create(&CreateFamilyMemberInput {
                name: name.to_string(),
                member_type: Some(member_type),
                birth_date: None,
                age: None,
                avatar: None,
                color: None,
                dietary_preferences: None,
                health_goals: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_detect_intent() {
        let cases = [
            ("Can you plan next week?", ChatIntent::PlanWeek),
            ("help me with tomorrow", ChatIntent::PlanDay),
            ("Ideas for lunch", ChatIntent::PlanDay),
            ("The kids loved the tacos", ChatIntent::ProvideFeedback),
            ("I have some leftover rice", ChatIntent::MentionIngredients),
            ("We got chicken", ChatIntent::MentionIngredients),
            ("Guests are coming Saturday", ChatIntent::MentionConstraints),
            ("How long do tacos take", ChatIntent::AskQuestion),
            ("hello there", ChatIntent::GeneralConversation),
        ];
        for (message, expected) in cases {
            assert_eq!(detect_intent(message), expected, "{}", message);
        }
        assert_eq!(ChatIntent::PlanWeek.confidence(), 0.9);
    }

    #[test]
    fn test_success_score() {
        assert_eq!(success_score("Homemade Pizza", 35, &["weekend", "kid-friendly"]), 0.7);
        assert_eq!(success_score("Chicken Stir Fry", 20, &["quick"]), 0.7);
        assert_eq!(success_score("Creamy Chicken Pasta", 10, &["healthy", "kid-friendly"]), 1.0);
        assert_eq!(success_score("Toast", 40, &[]), 0.5);
    }

    #[test]
    fn test_week_skips_planned_slots() {
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let existing = vec![plan(monday, MealType::Breakfast, "Waffles")];
        let suggestions = week_suggestions(monday, &existing);

        assert_eq!(suggestions.len(), MAX_WEEK_SUGGESTIONS);
        assert_eq!(suggestions[0].meal_type, MealType::Lunch);
        assert_eq!(suggestions[0].date, monday);
        assert_eq!(suggestions[2].meal_type, MealType::Breakfast);
    }

    #[test]
    fn test_join_names() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_names(&names(&["Ana"])), "Ana");
        assert_eq!(join_names(&names(&["Ana", "Ben", "Cy"])), "Ana, Ben and Cy");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (service, _, _) = setup_test_service().await;
        assert!(matches!(service.send("   ", None).await, Err(ServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let (service, _, _) = setup_test_service().await;
        let first = service.send("hello", None).await.unwrap();
        let second = service.send("hi again", Some(&first.conversation_id)).await.unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_ne!(first.response, second.response);

        let conversation = service.get(&first.conversation_id).await.unwrap();
        assert_eq!(conversation.messages.len(), 4);
        assert_eq!(conversation.messages[0].role, ChatRole::User);
        assert_eq!(conversation.context.last_intent, Some(ChatIntent::GeneralConversation));

        service.delete(&first.conversation_id).await.unwrap();
        assert!(matches!(service.get(&first.conversation_id).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.delete(&first.conversation_id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_day_plan_offers_three_options() {
        let (service, _, _) = setup_test_service().await;
        let reply = service.send("what should we have for breakfast tomorrow", None).await.unwrap();

        assert_eq!(reply.intent, ChatIntent::PlanDay);
        assert_eq!(reply.meal_suggestions.len(), 3);
        assert!(reply.meal_suggestions.iter().all(|s| s.meal_type == MealType::Breakfast));
        assert!(reply.response.contains("breakfast options for tomorrow"));
    }

    #[tokio::test]
    async fn test_feedback_names_kids() {
        let (service, _, family) = setup_test_service().await;
        add_member(&family, "Maya", MemberType::Child).await;
        add_member(&family, "Jon", MemberType::Child).await;
        add_member(&family, "Pat", MemberType::Parent).await;

        let reply = service.send("The kids loved it", None).await.unwrap();
        assert!(reply.response.contains("Jon and Maya particularly liked this"));

        let negative = service.send("Pat hated the onions", None).await.unwrap();
        assert!(negative.response.contains("onions didn't go over well"));
    }

    #[tokio::test]
    async fn test_ingredients_reply_limits_suggestions() {
        let (service, _, _) = setup_test_service().await;
        let reply = service.send("We have chicken and pasta", None).await.unwrap();

        assert_eq!(reply.intent, ChatIntent::MentionIngredients);
        assert_eq!(reply.meal_suggestions.len(), 4);
        assert_eq!(reply.meal_suggestions[0].based_on_ingredient.as_deref(), Some("chicken"));

        let conversation = service.get(&reply.conversation_id).await.unwrap();
        assert_eq!(conversation.context.mentioned_ingredients, vec!["chicken", "pasta"]);
    }

    #[tokio::test]
    async fn test_week_plan_reports_existing() {
        let (service, plans, _) = setup_test_service().await;
        let today = Local::now().date_naive();
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        plans.create(&plan(monday, MealType::Breakfast, "Waffles")).await.unwrap();

        let reply = service.send("please plan this week", None).await.unwrap();
        assert_eq!(reply.intent, ChatIntent::PlanWeek);
        let data = reply.structured_data.unwrap();
        assert_eq!(data["existing_meals"].as_array().unwrap().len(), 1);
        assert!(reply.meal_suggestions.iter().all(|s| !(s.date == monday && s.meal_type == MealType::Breakfast)));
    }
}
