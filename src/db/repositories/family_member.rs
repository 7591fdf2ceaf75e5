//! Family member repository

use crate::db::DynDatabasePool;
use crate::models::{CreateFamilyMemberInput, FamilyMember, UpdateFamilyMemberInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait FamilyMemberRepository: Send + Sync {
    async fn create(&self, input: &CreateFamilyMemberInput) -> Result<FamilyMember>;

    async fn get_by_id(&self, id: i64) -> Result<Option<FamilyMember>>;

    /// All members ordered by name
    async fn list(&self) -> Result<Vec<FamilyMember>>;

    async fn update(&self, id: i64, input: &UpdateFamilyMemberInput)
        -> Result<Option<FamilyMember>>;

    /// Returns false when no row was deleted
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxFamilyMemberRepository {
    pool: DynDatabasePool,
}

impl SqlxFamilyMemberRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FamilyMemberRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FamilyMemberRepository for SqlxFamilyMemberRepository {
    async fn create(&self, input: &CreateFamilyMemberInput) -> Result<FamilyMember> {
        let empty = serde_json::json!({});
        let result = sqlx::query(
            r#"
            INSERT INTO family_members (name, type, birth_date, age, avatar, color,
                                        dietary_preferences, health_goals, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(input.member_type.unwrap_or_default().as_str())
        .bind(input.birth_date)
        .bind(input.age)
        .bind(&input.avatar)
        .bind(input.color.as_deref().unwrap_or("#3B82F6"))
        .bind(serde_json::to_string(input.dietary_preferences.as_ref().unwrap_or(&empty))?)
        .bind(serde_json::to_string(input.health_goals.as_ref().unwrap_or(&empty))?)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create family member")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Family member vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<FamilyMember>> {
        let row = sqlx::query("SELECT * FROM family_members WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get family member")?;

        Ok(row.as_ref().map(row_to_member))
    }

    async fn list(&self) -> Result<Vec<FamilyMember>> {
        let rows = sqlx::query("SELECT * FROM family_members ORDER BY name")
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list family members")?;

        Ok(rows.iter().map(row_to_member).collect())
    }

    async fn update(
        &self,
        id: i64,
        input: &UpdateFamilyMemberInput,
    ) -> Result<Option<FamilyMember>> {
        let Some(mut member) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(name) = &input.name {
            member.name = name.trim().to_string();
        }
        if let Some(member_type) = input.member_type {
            member.member_type = member_type;
        }
        if input.birth_date.is_some() {
            member.birth_date = input.birth_date;
        }
        if input.age.is_some() {
            member.age = input.age;
        }
        if input.avatar.is_some() {
            member.avatar = input.avatar.clone();
        }
        if let Some(color) = &input.color {
            member.color = color.clone();
        }
        if let Some(prefs) = &input.dietary_preferences {
            member.dietary_preferences = prefs.clone();
        }
        if let Some(goals) = &input.health_goals {
            member.health_goals = goals.clone();
        }

        sqlx::query(
            r#"
            UPDATE family_members
            SET name = ?, type = ?, birth_date = ?, age = ?, avatar = ?, color = ?,
                dietary_preferences = ?, health_goals = ?
            WHERE id = ?
            "#,
        )
        .bind(&member.name)
        .bind(member.member_type.as_str())
        .bind(member.birth_date)
        .bind(member.age)
        .bind(&member.avatar)
        .bind(&member.color)
        .bind(serde_json::to_string(&member.dietary_preferences)?)
        .bind(serde_json::to_string(&member.health_goals)?)
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update family member")?;

        Ok(Some(member))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM family_members WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete family member")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_member(row: &SqliteRow) -> FamilyMember {
    let member_type: String = row.get("type");
    let dietary: String = row.get("dietary_preferences");
    let goals: String = row.get("health_goals");

    FamilyMember {
        id: row.get("id"),
        name: row.get("name"),
        member_type: member_type.parse().unwrap_or_default(),
        birth_date: row.get("birth_date"),
        age: row.get("age"),
        avatar: row.get("avatar"),
        color: row.get("color"),
        dietary_preferences: json_object(&dietary),
        health_goals: json_object(&goals),
        created_at: row.get("created_at"),
    }
}

/// Parse a JSON object column; anything else reads back as `{}`.
pub(crate) fn json_object(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => value,
        _ => serde_json::json!({}),
    }
}
