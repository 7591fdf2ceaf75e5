//! Preparation timeline repository

use crate::db::DynDatabasePool;
use crate::models::{parse_json_column, PreparationTimeline, SimilarEventTimeline};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait PreparationTimelineRepository: Send + Sync {
    /// Replace the event's timeline with items copied from a template
    async fn upsert_from_template(
        &self,
        event_id: i64,
        template_id: i64,
        timeline_data: &[Value],
        created_by: i64,
    ) -> Result<()>;

    /// The event's timeline joined with its template name and event title
    async fn get_for_event(&self, event_id: i64) -> Result<Option<PreparationTimeline>>;

    /// Returns false when the event has no timeline
    async fn save_progress(
        &self,
        event_id: i64,
        completed_tasks: &[Value],
        timeline_data: &[Value],
    ) -> Result<bool>;

    /// Template-backed timelines of the user's events whose title, type or
    /// location contains the matching text. Empty text matches nothing.
    /// Newest events first.
    async fn list_similar(
        &self,
        user_id: i64,
        title: &str,
        event_type: &str,
        location: &str,
        limit: i64,
    ) -> Result<Vec<SimilarEventTimeline>>;
}

pub struct SqlxPreparationTimelineRepository {
    pool: DynDatabasePool,
}

impl SqlxPreparationTimelineRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PreparationTimelineRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PreparationTimelineRepository for SqlxPreparationTimelineRepository {
    async fn upsert_from_template(
        &self,
        event_id: i64,
        template_id: i64,
        timeline_data: &[Value],
        created_by: i64,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO preparation_timelines
                (event_id, template_id, timeline_data, is_custom, created_by, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?, ?)
            ON CONFLICT(event_id) DO UPDATE SET
                template_id = excluded.template_id,
                timeline_data = excluded.timeline_data,
                is_custom = 0,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(event_id)
        .bind(template_id)
        .bind(serde_json::to_string(timeline_data)?)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save preparation timeline")?;

        Ok(())
    }

    async fn get_for_event(&self, event_id: i64) -> Result<Option<PreparationTimeline>> {
        let row = sqlx::query(
            r#"
            SELECT pt.*, ct.name AS template_name, ct.description AS template_description,
                   e.title AS event_title, e.start_time AS event_start_time
            FROM preparation_timelines pt
            LEFT JOIN checklist_templates ct ON pt.template_id = ct.id
            INNER JOIN events e ON pt.event_id = e.id
            WHERE pt.event_id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get preparation timeline")?;

        Ok(row.as_ref().map(row_to_timeline))
    }

    async fn save_progress(
        &self,
        event_id: i64,
        completed_tasks: &[Value],
        timeline_data: &[Value],
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE preparation_timelines
            SET completed_tasks = ?, timeline_data = ?, updated_at = ?
            WHERE event_id = ?
            "#,
        )
        .bind(serde_json::to_string(completed_tasks)?)
        .bind(serde_json::to_string(timeline_data)?)
        .bind(Utc::now())
        .bind(event_id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save timeline progress")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_similar(
        &self,
        user_id: i64,
        title: &str,
        event_type: &str,
        location: &str,
        limit: i64,
    ) -> Result<Vec<SimilarEventTimeline>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id AS event_id, e.title, e.event_type, e.location,
                   pt.template_id, pt.timeline_data,
                   ct.name AS template_name, ct.description AS template_description,
                   ct.items AS template_items
            FROM events e
            INNER JOIN preparation_timelines pt ON e.id = pt.event_id
            LEFT JOIN checklist_templates ct ON pt.template_id = ct.id
            WHERE e.created_by = ?4
              AND pt.template_id IS NOT NULL
              AND ((?1 <> '' AND instr(lower(e.title), lower(?1)) > 0)
                   OR (?2 <> '' AND instr(lower(e.event_type), lower(?2)) > 0)
                   OR (?3 <> '' AND instr(lower(e.location), lower(?3)) > 0))
            ORDER BY e.start_time DESC
            LIMIT ?5
            "#,
        )
        .bind(title)
        .bind(event_type)
        .bind(location)
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to find similar events")?;

        Ok(rows
            .iter()
            .map(|row| {
                let timeline: String = row.get("timeline_data");
                let items: Option<String> = row.get("template_items");
                SimilarEventTimeline {
                    event_id: row.get("event_id"),
                    title: row.get("title"),
                    event_type: row.get("event_type"),
                    location: row.get("location"),
                    template_id: row.get("template_id"),
                    template_name: row.get("template_name"),
                    template_description: row.get("template_description"),
                    timeline_data: parse_json_column(&timeline),
                    template_items: items
                        .as_deref()
                        .map(parse_json_column::<Vec<Value>>)
                        .unwrap_or_default(),
                }
            })
            .collect())
    }
}

fn row_to_timeline(row: &SqliteRow) -> PreparationTimeline {
    let timeline: String = row.get("timeline_data");
    let completed: String = row.get("completed_tasks");

    PreparationTimeline {
        id: row.get("id"),
        event_id: row.get("event_id"),
        timeline_data: parse_json_column(&timeline),
        event_pattern: row.get("event_pattern"),
        confidence: row.get("confidence"),
        completed_tasks: parse_json_column(&completed),
        template_id: row.get("template_id"),
        is_custom: row.get("is_custom"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        template_name: row.get("template_name"),
        template_description: row.get("template_description"),
        event_title: row.get("event_title"),
        event_start_time: row.get("event_start_time"),
    }
}
