//! Timeline template service
//!
//! Checklist templates double as preparation timelines: a template's items are
//! copied onto an event, tracked there, and a well-run event can be turned back
//! into a new template.

use crate::db::repositories::{
    ChecklistRepository, EventRepository, PreparationTimelineRepository, TemplateOrder,
};
use crate::models::{
    ChecklistTemplate, CreateChecklistTemplateInput, Event, PreparationTimeline,
    SimilarEventTimeline,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Templates considered when ranking suggestions
const SUGGESTION_POOL: usize = 20;
const MAX_SUGGESTIONS: usize = 10;
const MAX_SIMILAR_EVENTS: i64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSearch {
    pub category: Option<String>,
    pub event_type: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventDescription {
    #[serde(default)]
    pub event_title: Option<String>,
    #[serde(default)]
    pub event_description: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredTemplate {
    #[serde(flatten)]
    pub template: ChecklistTemplate,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemAdjustment {
    pub item_id: String,
    #[serde(default)]
    pub new_time_offset: Option<Value>,
    #[serde(default)]
    pub new_duration: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateFromEventInput {
    pub event_id: i64,
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub template_description: Option<String>,
    #[serde(default)]
    pub adjustments: Vec<ItemAdjustment>,
}

#[derive(Debug, Serialize)]
pub struct TemplateFromEvent {
    pub id: i64,
    pub template_items: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemCustomization {
    pub item_id: String,
    #[serde(default)]
    pub time_offset: Option<Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignTemplateInput {
    pub event_id: i64,
    pub template_id: i64,
    #[serde(default)]
    pub apply_to_series: bool,
    #[serde(default)]
    pub customizations: Vec<ItemCustomization>,
}

#[derive(Debug, Serialize)]
pub struct AssignOutcome {
    pub events_updated: usize,
    pub timeline_items: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineProgressInput {
    #[serde(default)]
    pub completed_tasks: Vec<Value>,
    #[serde(default)]
    pub timeline_data: Vec<Value>,
}

fn lowercase_terms(request: &EventDescription) -> Vec<String> {
    [
        &request.event_title,
        &request.event_description,
        &request.event_type,
        &request.event_location,
    ]
    .into_iter()
    .flatten()
    .filter(|t| !t.trim().is_empty())
    .map(|t| t.to_lowercase())
    .collect()
}

fn searchable_text(template: &ChecklistTemplate) -> String {
    format!(
        "{} {} {}",
        template.name,
        template.description.as_deref().unwrap_or_default(),
        template.tags.join(" ")
    )
    .to_lowercase()
}

/// Relevance of a template to an event being planned
pub fn relevance_score(template: &ChecklistTemplate, request: &EventDescription) -> f64 {
    let text = searchable_text(template);
    let mut score = template.usage_count as f64 * 0.1;
    score += 10.0 * lowercase_terms(request).iter().filter(|t| text.contains(t.as_str())).count() as f64;
    if let Some(event_type) = request.event_type.as_deref().filter(|t| !t.is_empty()) {
        if template.category.to_lowercase().contains(&event_type.to_lowercase()) {
            score += 15.0;
        }
    }
    score
}

fn matches_search(template: &ChecklistTemplate, search: &TemplateSearch) -> bool {
    if let Some(event_type) = search.event_type.as_deref() {
        if !template.tags.iter().any(|t| t == event_type) {
            return false;
        }
    }
    if let Some(query) = search.query.as_deref() {
        let query = query.to_lowercase();
        let in_name = template.name.to_lowercase().contains(&query);
        let in_description = template
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&query));
        let in_tags = template.tags.iter().any(|t| t.to_lowercase().contains(&query));
        if !(in_name || in_description || in_tags) {
            return false;
        }
    }
    true
}

fn item_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

/// Template items may be bare strings; timelines always hold objects
fn as_object(item: &Value) -> Map<String, Value> {
    match item {
        Value::Object(map) => map.clone(),
        Value::String(text) => {
            let mut map = Map::new();
            map.insert("text".to_string(), json!(text));
            map
        }
        other => {
            let mut map = Map::new();
            map.insert("text".to_string(), json!(other.to_string()));
            map
        }
    }
}

/// Copy template items into timeline entries with fresh ids
pub fn customize_items(items: &[Value], customizations: &[ItemCustomization]) -> Vec<Value> {
    items
        .iter()
        .map(|item| {
            let custom = item_id(item).and_then(|id| customizations.iter().find(|c| c.item_id == id));
            let mut entry = as_object(item);
            entry.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
            if let Some(offset) = custom.and_then(|c| c.time_offset.clone()) {
                entry.insert("timeOffset".to_string(), offset);
            }
            entry.insert(
                "enabled".to_string(),
                json!(custom.and_then(|c| c.enabled).unwrap_or(true)),
            );
            entry.insert(
                "customNotes".to_string(),
                json!(custom.and_then(|c| c.notes.clone()).unwrap_or_default()),
            );
            Value::Object(entry)
        })
        .collect()
}

/// Turn timeline entries back into template items
pub fn template_items_from(timeline: &[Value], adjustments: &[ItemAdjustment]) -> Vec<Value> {
    timeline
        .iter()
        .map(|item| {
            let adjustment = item_id(item).and_then(|id| adjustments.iter().find(|a| a.item_id == id));
            let field = |name: &str| item.get(name).filter(|v| !v.is_null()).cloned();
            json!({
                "text": field("text").unwrap_or_else(|| json!("")),
                "timeOffset": adjustment
                    .and_then(|a| a.new_time_offset.clone())
                    .or_else(|| field("timeOffset"))
                    .unwrap_or(Value::Null),
                "category": field("category").unwrap_or_else(|| json!("preparation")),
                "priority": field("priority").unwrap_or_else(|| json!("medium")),
                "duration": adjustment
                    .and_then(|a| a.new_duration.map(|d| json!(d)))
                    .or_else(|| field("duration"))
                    .unwrap_or_else(|| json!(15)),
                "notes": adjustment
                    .and_then(|a| a.notes.clone().map(Value::String))
                    .or_else(|| field("notes"))
                    .unwrap_or_else(|| json!("")),
            })
        })
        .collect()
}

pub struct TimelineTemplateService {
    checklists: Arc<dyn ChecklistRepository>,
    timelines: Arc<dyn PreparationTimelineRepository>,
    events: Arc<dyn EventRepository>,
}

impl TimelineTemplateService {
    pub fn new(
        checklists: Arc<dyn ChecklistRepository>,
        timelines: Arc<dyn PreparationTimelineRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            checklists,
            timelines,
            events,
        }
    }

    async fn most_used(&self, category: Option<&str>) -> ServiceResult<Vec<ChecklistTemplate>> {
        Ok(self
            .checklists
            .list_templates(category, TemplateOrder::MostUsed)
            .await
            .context("Failed to list checklist templates")?)
    }

    async fn own_event(&self, event_id: i64, user_id: i64) -> ServiceResult<Event> {
        self.events
            .get_by_id(event_id)
            .await
            .context("Failed to get event")?
            .filter(|e| e.created_by == Some(user_id))
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    pub async fn search(&self, search: &TemplateSearch) -> ServiceResult<Vec<ChecklistTemplate>> {
        let mut templates = self.most_used(search.category.as_deref()).await?;
        templates.retain(|t| matches_search(t, search));
        Ok(templates)
    }

    pub async fn suggest(&self, request: &EventDescription) -> ServiceResult<Vec<ScoredTemplate>> {
        let mut scored: Vec<ScoredTemplate> = self
            .most_used(None)
            .await?
            .into_iter()
            .take(SUGGESTION_POOL)
            .map(|template| ScoredTemplate {
                relevance_score: relevance_score(&template, request),
                template,
            })
            .collect();
        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored.truncate(MAX_SUGGESTIONS);
        Ok(scored)
    }

    pub async fn similar_events(
        &self,
        request: &EventDescription,
        user_id: i64,
    ) -> ServiceResult<Vec<SimilarEventTimeline>> {
        Ok(self
            .timelines
            .list_similar(
                user_id,
                request.event_title.as_deref().unwrap_or_default(),
                request.event_type.as_deref().unwrap_or_default(),
                request.event_location.as_deref().unwrap_or_default(),
                MAX_SIMILAR_EVENTS,
            )
            .await
            .context("Failed to find similar events")?)
    }

    pub async fn template_from_event(
        &self,
        input: TemplateFromEventInput,
        user_id: i64,
    ) -> ServiceResult<TemplateFromEvent> {
        let event = self.own_event(input.event_id, user_id).await?;
        if input.template_name.trim().is_empty() {
            return Err(ServiceError::validation("Template name is required"));
        }

        let timeline = self
            .timelines
            .get_for_event(event.id)
            .await
            .context("Failed to get preparation timeline")?
            .map(|t| t.timeline_data)
            .unwrap_or_default();
        let items = template_items_from(&timeline, &input.adjustments);

        let mut tags: Vec<String> = event.event_type.iter().cloned().collect();
        tags.push(if event.location.is_some() { "travel" } else { "home" }.to_string());
        tags.push(if items.len() > 5 { "detailed" } else { "simple" }.to_string());

        let template = self
            .checklists
            .create_template(
                &CreateChecklistTemplateInput {
                    name: input.template_name.trim().to_string(),
                    category: event.event_type.clone().unwrap_or_else(|| "general".to_string()),
                    description: Some(input.template_description.unwrap_or_else(|| {
                        format!("Template created from successful event: {}", event.title)
                    })),
                    items,
                    tags,
                },
                Some(user_id),
            )
            .await
            .context("Failed to create template")?;

        tracing::info!(template_id = template.id, event_id = event.id, user_id, "Template created from event");
        Ok(TemplateFromEvent {
            id: template.id,
            template_items: template.items.len(),
        })
    }

    pub async fn assign(&self, input: AssignTemplateInput, user_id: i64) -> ServiceResult<AssignOutcome> {
        let event = self
            .events
            .get_by_id(input.event_id)
            .await
            .context("Failed to get event")?
            .ok_or_else(|| ServiceError::not_found("Event"))?;
        let template = self
            .checklists
            .get_template(input.template_id)
            .await
            .context("Failed to get template")?
            .ok_or_else(|| ServiceError::not_found("Template"))?;

        let timeline = customize_items(&template.items, &input.customizations);
        self.timelines
            .upsert_from_template(event.id, template.id, &timeline, user_id)
            .await
            .context("Failed to save preparation timeline")?;
        let mut events_updated = 1;

        if let (true, Some(parent_id)) = (input.apply_to_series, event.parent_recurring_id) {
            let now = Utc::now();
            let siblings = self
                .events
                .list_instances_from(parent_id, Local::now().date_naive())
                .await
                .context("Failed to list recurring instances")?;
            for sibling in siblings.iter().filter(|s| s.id != event.id && s.start_time > now) {
                self.timelines
                    .upsert_from_template(sibling.id, template.id, &timeline, user_id)
                    .await
                    .context("Failed to save preparation timeline")?;
                events_updated += 1;
            }
        }

        self.checklists
            .increment_template_usage(template.id)
            .await
            .context("Failed to bump template usage")?;
        tracing::info!(
            template_id = template.id,
            event_id = event.id,
            events_updated,
            "Template assigned"
        );
        Ok(AssignOutcome {
            events_updated,
            timeline_items: timeline.len(),
        })
    }

    pub async fn timeline(&self, event_id: i64) -> ServiceResult<PreparationTimeline> {
        self.timelines
            .get_for_event(event_id)
            .await
            .context("Failed to get preparation timeline")?
            .ok_or_else(|| ServiceError::not_found("Timeline"))
    }

    pub async fn update_progress(
        &self,
        event_id: i64,
        input: TimelineProgressInput,
        user_id: i64,
    ) -> ServiceResult<PreparationTimeline> {
        self.own_event(event_id, user_id).await?;
        let saved = self
            .timelines
            .save_progress(event_id, &input.completed_tasks, &input.timeline_data)
            .await
            .context("Failed to save timeline progress")?;
        if !saved {
            return Err(ServiceError::not_found("Timeline"));
        }
        self.timeline(event_id).await
    }
}
