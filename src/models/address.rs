//! Saved address model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum AddressType ("address type") {
        Home => "home",
        Work => "work",
        School => "school",
        #[default]
        Other => "other",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub label: String,
    pub address: String,
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub is_primary: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAddressInput {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, rename = "type")]
    pub address_type: Option<AddressType>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAddressInput {
    pub label: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub address_type: Option<AddressType>,
    pub is_primary: Option<bool>,
    pub notes: Option<String>,
}
