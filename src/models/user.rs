//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A family member account that can sign in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    /// Numeric Telegram user id, stored once the account is linked
    pub telegram_id: Option<String>,
    /// Chat the bot talks to, set when the user sends `/start`
    pub telegram_chat_id: Option<String>,
    pub telegram_settings: TelegramSettings,
    pub preferences: serde_json::Value,
    pub google_calendar_id: Option<String>,
    #[serde(skip_serializing)]
    pub google_tokens: GoogleTokens,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub sync_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name used in greetings: the full name, or the username when unset.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }

    pub fn is_telegram_linked(&self) -> bool {
        self.telegram_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn has_google_tokens(&self) -> bool {
        self.google_tokens.access_token.is_some()
    }
}

/// Per-user Telegram notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_reminder_minutes")]
    pub reminder_minutes: i64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            reminder_minutes: default_reminder_minutes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reminder_minutes() -> i64 {
    30
}

/// OAuth tokens issued by Google
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as a unix timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl GoogleTokens {
    /// True when the access token is missing or expires within a minute.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expiry_date) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(expiry)) => expiry <= now.timestamp_millis() + 60_000,
        }
    }
}

/// Input for registering a new user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_settings_defaults_fill_missing_fields() {
        let settings: TelegramSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.notifications_enabled);
        assert_eq!(settings.reminder_minutes, 30);
    }

    #[test]
    fn test_google_tokens_expiry() {
        let now = Utc::now();
        let mut tokens = GoogleTokens::default();
        assert!(tokens.is_expired(now));

        tokens.access_token = Some("ya29".to_string());
        assert!(!tokens.is_expired(now));

        tokens.expiry_date = Some(now.timestamp_millis() + 30_000);
        assert!(tokens.is_expired(now));

        tokens.expiry_date = Some(now.timestamp_millis() + 3_600_000);
        assert!(!tokens.is_expired(now));
    }
}
