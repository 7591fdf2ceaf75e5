//! Checklist templates and their checkable instances

use crate::db::repositories::{ChecklistRepository, TemplateOrder};
use crate::models::{
    ChecklistInstance, ChecklistItem, ChecklistStatus, ChecklistTemplate,
    CreateChecklistInstanceInput, CreateChecklistTemplateInput,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct ChecklistService {
    repo: Arc<dyn ChecklistRepository>,
}

fn new_item(text: &str, custom: bool) -> ChecklistItem {
    ChecklistItem {
        id: Uuid::new_v4().to_string(),
        text: text.to_string(),
        checked: false,
        added_at: Utc::now(),
        custom,
    }
}

/// Template items are either plain strings or objects with a `text` field
fn template_item_text(item: &serde_json::Value) -> Option<&str> {
    match item {
        serde_json::Value::String(text) => Some(text.as_str()),
        serde_json::Value::Object(map) => map.get("text").and_then(|t| t.as_str()),
        _ => None,
    }
}

impl ChecklistService {
    pub fn new(repo: Arc<dyn ChecklistRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_templates(&self, category: Option<&str>) -> ServiceResult<Vec<ChecklistTemplate>> {
        Ok(self
            .repo
            .list_templates(category, TemplateOrder::CategoryThenName)
            .await
            .context("Failed to list checklist templates")?)
    }

    pub async fn popular_templates(&self) -> ServiceResult<Vec<ChecklistTemplate>> {
        Ok(self
            .repo
            .list_templates(None, TemplateOrder::MostUsed)
            .await
            .context("Failed to list checklist templates")?)
    }

    pub async fn get_template(&self, id: i64) -> ServiceResult<ChecklistTemplate> {
        self.repo
            .get_template(id)
            .await
            .context("Failed to get checklist template")?
            .ok_or_else(|| ServiceError::not_found("Template"))
    }

    pub async fn create_template(
        &self,
        input: CreateChecklistTemplateInput,
        created_by: i64,
    ) -> ServiceResult<ChecklistTemplate> {
        if input.name.trim().is_empty() || input.category.trim().is_empty() || input.items.is_empty() {
            return Err(ServiceError::validation("Name, category, and items are required"));
        }

        let template = self
            .repo
            .create_template(&input, Some(created_by))
            .await
            .context("Failed to create checklist template")?;
        tracing::info!(template_id = template.id, name = %template.name, "Checklist template created");
        Ok(template)
    }

    pub async fn use_template(&self, id: i64) -> ServiceResult<()> {
        if !self
            .repo
            .increment_template_usage(id)
            .await
            .context("Failed to update template usage")?
        {
            return Err(ServiceError::not_found("Template"));
        }
        Ok(())
    }

    pub async fn create_instance(
        &self,
        input: CreateChecklistInstanceInput,
        created_by: i64,
    ) -> ServiceResult<ChecklistInstance> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }

        let mut items = Vec::new();
        if let Some(template_id) = input.template_id {
            let template = self.get_template(template_id).await?;
            items.extend(
                template
                    .items
                    .iter()
                    .filter_map(template_item_text)
                    .map(|text| new_item(text, false)),
            );
            self.repo
                .increment_template_usage(template_id)
                .await
                .context("Failed to update template usage")?;
        }
        items.extend(
            input
                .custom_items
                .iter()
                .filter(|text| !text.trim().is_empty())
                .map(|text| new_item(text, true)),
        );

        Ok(self
            .repo
            .create_instance(
                input.template_id,
                input.event_id,
                &input.title,
                &items,
                Some(created_by),
            )
            .await
            .context("Failed to create checklist instance")?)
    }

    pub async fn get_instance(&self, id: i64) -> ServiceResult<ChecklistInstance> {
        self.repo
            .get_instance(id)
            .await
            .context("Failed to get checklist instance")?
            .ok_or_else(|| ServiceError::not_found("Checklist instance"))
    }

    pub async fn active_instances(&self) -> ServiceResult<Vec<ChecklistInstance>> {
        Ok(self
            .repo
            .list_active_instances()
            .await
            .context("Failed to list checklist instances")?)
    }

    /// Check or uncheck one item. A fully checked list becomes completed.
    pub async fn check_item(&self, id: i64, item_id: &str, checked: bool) -> ServiceResult<ChecklistInstance> {
        let mut instance = self.get_instance(id).await?;
        let item = instance
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| ServiceError::not_found("Item"))?;
        item.checked = checked;

        self.save_progress(instance).await
    }

    pub async fn add_item(&self, id: i64, text: &str) -> ServiceResult<ChecklistInstance> {
        if text.trim().is_empty() {
            return Err(ServiceError::validation("Item text is required"));
        }
        let mut instance = self.get_instance(id).await?;
        instance.items.push(new_item(text.trim(), true));

        self.save_progress(instance).await
    }

    async fn save_progress(&self, mut instance: ChecklistInstance) -> ServiceResult<ChecklistInstance> {
        let completion = ChecklistInstance::compute_completion(&instance.items);
        let (status, completed_at) = if completion >= 100.0 {
            (ChecklistStatus::Completed, Some(Utc::now()))
        } else {
            (ChecklistStatus::Active, None)
        };

        self.repo
            .save_instance_progress(instance.id, &instance.items, completion, status, completed_at)
            .await
            .context("Failed to save checklist progress")?;

        instance.completion_percentage = completion;
        instance.status = status;
        instance.completed_at = completed_at;
        Ok(instance)
    }

    pub async fn delete_instance(&self, id: i64) -> ServiceResult<()> {
        if !self
            .repo
            .delete_instance(id)
            .await
            .context("Failed to delete checklist instance")?
        {
            return Err(ServiceError::not_found("Checklist instance"));
        }
        Ok(())
    }
}
