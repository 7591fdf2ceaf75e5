//! Notification, notification preference and push subscription models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

string_enum! {
    pub enum NotificationPriority ("notification priority") {
        Low => "low",
        #[default]
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

impl NotificationPriority {
    pub fn emoji(&self) -> &'static str {
        match self {
            NotificationPriority::Urgent => "🚨",
            NotificationPriority::High => "🔥",
            NotificationPriority::Normal => "ℹ️",
            NotificationPriority::Low => "📝",
        }
    }
}

/// A delivered (or attempted) notification, kept as an in-app inbox entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub sent_via: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-user delivery preferences. Every section is a free-form JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: i64,
    pub channel_settings: serde_json::Value,
    pub time_preferences: serde_json::Value,
    pub priority_thresholds: serde_json::Value,
    pub quiet_hours: serde_json::Value,
    pub notification_types: serde_json::Value,
}

impl NotificationPreferences {
    pub fn defaults(user_id: i64) -> Self {
        Self {
            user_id,
            channel_settings: json!({
                "push": true,
                "sms": false,
                "email": true,
                "telegram": true
            }),
            time_preferences: json!({
                "morning_brief_time": "06:30",
                "evening_prep_time": "20:00"
            }),
            priority_thresholds: json!({
                "minimal": 1,
                "normal": 2,
                "maximum": 3
            }),
            quiet_hours: json!({
                "enabled": true,
                "start": "22:00",
                "end": "07:00"
            }),
            notification_types: json!({
                "event_reminders": true,
                "task_due": true,
                "daily_brief": true,
                "evening_prep": true,
                "responsibility_alerts": true,
                "handoff_notifications": true,
                "urgent_alerts": true
            }),
        }
    }

    pub fn channel_enabled(&self, channel: &str) -> bool {
        self.channel_settings
            .get(channel)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Types missing from the map are treated as enabled.
    pub fn type_enabled(&self, notification_type: &str) -> bool {
        self.notification_types
            .get(notification_type)
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNotificationPreferencesInput {
    pub channel_settings: Option<serde_json::Value>,
    pub time_preferences: Option<serde_json::Value>,
    pub priority_thresholds: Option<serde_json::Value>,
    pub quiet_hours: Option<serde_json::Value>,
    pub notification_types: Option<serde_json::Value>,
}

/// A browser push endpoint registered by a user
#[derive(Debug, Clone, Serialize)]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub subscription_data: serde_json::Value,
    pub endpoint: String,
    pub user_agent: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub total: i64,
    pub unread: i64,
    pub today: i64,
}
