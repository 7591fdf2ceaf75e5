//! Family member model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Kind of household member
    pub enum MemberType ("member type") {
        #[default]
        Parent => "parent",
        Child => "child",
        Pet => "pet",
    }
}

/// A household member. Members are not accounts; they carry dietary data for meal planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub member_type: MemberType,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<i64>,
    pub avatar: Option<String>,
    pub color: String,
    /// `{vegetarian, vegan, glutenFree, dairyFree, allergies[]}`
    pub dietary_preferences: serde_json::Value,
    pub health_goals: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl FamilyMember {
    /// Read a boolean flag such as `vegetarian` from the dietary preferences.
    pub fn dietary_flag(&self, key: &str) -> bool {
        self.dietary_preferences
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFamilyMemberInput {
    pub name: String,
    #[serde(default, rename = "type")]
    pub member_type: Option<MemberType>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub dietary_preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub health_goals: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFamilyMemberInput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub member_type: Option<MemberType>,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<i64>,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub dietary_preferences: Option<serde_json::Value>,
    pub health_goals: Option<serde_json::Value>,
}
