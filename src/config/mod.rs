//! Configuration management
//!
//! This module handles loading and parsing configuration for the Itineraries server.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. External
//! integrations (Telegram, Google Calendar, SMTP, Web Push) stay in mock mode
//! until their credentials are provided.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub meal_chat: MealChatConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Externally reachable base URL, used for the Telegram webhook
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path (":memory:" for an in-memory database)
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/itineraries.db".to_string()
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Whether new accounts can be registered
    #[serde(default = "default_true")]
    pub allow_registration: bool,
    /// Secret used to sign OAuth `state` parameters
    #[serde(default = "default_state_secret")]
    pub state_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            allow_registration: true,
            state_secret: default_state_secret(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_true() -> bool {
    true
}

fn default_state_secret() -> String {
    "change-me-in-production".to_string()
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; the bot runs in mock mode when unset
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` header
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_username: default_bot_username(),
            webhook_secret: None,
            api_base: default_telegram_api_base(),
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn default_bot_username() -> String {
    "itineraries_bot".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// Web Push configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vapid_subject")]
    pub vapid_subject: String,
    #[serde(default)]
    pub vapid_public_key: Option<String>,
    /// Time-to-live sent with each push message
    #[serde(default = "default_push_ttl")]
    pub ttl_seconds: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            vapid_subject: default_vapid_subject(),
            vapid_public_key: None,
            ttl_seconds: default_push_ttl(),
        }
    }
}

fn default_vapid_subject() -> String {
    "mailto:admin@itineraries.local".to_string()
}

fn default_push_ttl() -> u64 {
    86400
}

/// Google Calendar OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Front-end base URL the OAuth callback redirects to
    #[serde(default = "default_cors_origin")]
    pub client_url: String,
    /// Time zone attached to exported events
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_google_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    #[serde(default = "default_google_api_base")]
    pub api_base: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            client_url: default_cors_origin(),
            time_zone: default_time_zone(),
            auth_base: default_google_auth_base(),
            token_url: default_google_token_url(),
            api_base: default_google_api_base(),
        }
    }
}

impl GoogleConfig {
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.client_id) && present(&self.client_secret)
    }
}

fn default_redirect_uri() -> String {
    "http://localhost:3001/api/google/callback".to_string()
}

fn default_time_zone() -> String {
    "America/New_York".to_string()
}

fn default_google_auth_base() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_google_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

/// SMTP configuration for the email notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            from: default_smtp_from(),
        }
    }
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.is_empty())
    }
}

fn default_smtp_port() -> u16 {
    465
}

fn default_smtp_from() -> String {
    "Itineraries <noreply@itineraries.local>".to_string()
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local time of the morning brief (HH:MM)
    #[serde(default = "default_daily_brief_time")]
    pub daily_brief_time: String,
    /// Local time of the evening preparation message (HH:MM)
    #[serde(default = "default_evening_prep_time")]
    pub evening_prep_time: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_brief_time: default_daily_brief_time(),
            evening_prep_time: default_evening_prep_time(),
        }
    }
}

fn default_daily_brief_time() -> String {
    "06:30".to_string()
}

fn default_evening_prep_time() -> String {
    "20:00".to_string()
}

/// Meal chat conversation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealChatConfig {
    #[serde(default = "default_max_conversations")]
    pub max_conversations: u64,
    /// Conversations idle for longer than this are dropped
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: u64,
    /// Messages kept per conversation; older ones are dropped
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for MealChatConfig {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            idle_minutes: default_idle_minutes(),
            history_window: default_history_window(),
        }
    }
}

fn default_max_conversations() -> u64 {
    1000
}

fn default_idle_minutes() -> u64 {
    120
}

fn default_history_window() -> usize {
    50
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with the location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - ITINERARIES_SERVER_HOST / ITINERARIES_PORT
    /// - ITINERARIES_DATABASE_URL
    /// - ITINERARIES_TELEGRAM_BOT_TOKEN
    /// - ITINERARIES_GOOGLE_CLIENT_ID / ITINERARIES_GOOGLE_CLIENT_SECRET
    /// - ITINERARIES_SMTP_HOST
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ITINERARIES_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ITINERARIES_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("ITINERARIES_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(url) = std::env::var("ITINERARIES_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("ITINERARIES_STATE_SECRET") {
            self.auth.state_secret = secret;
        }
        if let Ok(token) = std::env::var("ITINERARIES_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Ok(id) = std::env::var("ITINERARIES_GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("ITINERARIES_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(secret);
        }
        if let Ok(host) = std::env::var("ITINERARIES_SMTP_HOST") {
            self.smtp.host = Some(host);
        }
    }

    /// Reject values the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.auth.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_days must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("scheduler.daily_brief_time", &self.scheduler.daily_brief_time),
            ("scheduler.evening_prep_time", &self.scheduler.evening_prep_time),
        ] {
            if parse_hh_mm(value).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be HH:MM, got '{}'",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Parse "HH:MM" into (hour, minute)
pub fn parse_hh_mm(value: &str) -> Option<(u32, u32)> {
    let (h, m) = value.trim().split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "ITINERARIES_SERVER_HOST",
    "ITINERARIES_PORT",
    "ITINERARIES_SERVER_CORS_ORIGIN",
    "ITINERARIES_DATABASE_URL",
    "ITINERARIES_STATE_SECRET",
    "ITINERARIES_TELEGRAM_BOT_TOKEN",
    "ITINERARIES_GOOGLE_CLIENT_ID",
    "ITINERARIES_GOOGLE_CLIENT_SECRET",
    "ITINERARIES_SMTP_HOST",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============================================================================
    // Strategies for generating test data
    // ============================================================================

    fn valid_host_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
                .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
            Just("localhost".to_string()),
            Just("0.0.0.0".to_string()),
            "[a-z][a-z0-9]{0,10}".prop_map(|s| s),
        ]
    }

    fn valid_time_strategy() -> impl Strategy<Value = String> {
        (0u32..24, 0u32..60).prop_map(|(h, m)| format!("{:02}:{:02}", h, m))
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            valid_host_strategy(),
            1u16..=65535,
            "[a-z][a-z0-9_/]{0,20}\\.db",
            1i64..=90,
            proptest::option::of("[0-9]{5,10}:[A-Za-z0-9]{10,20}"),
            valid_time_strategy(),
            valid_time_strategy(),
            1u64..=10_000,
        )
            .prop_map(
                |(host, port, url, days, token, brief, prep, max_conversations)| {
                    let mut config = Config::default();
                    config.server.host = host;
                    config.server.port = port;
                    config.database.url = url;
                    config.auth.session_days = days;
                    config.telegram.bot_token = token;
                    config.scheduler.daily_brief_time = brief;
                    config.scheduler.evening_prep_time = prep;
                    config.meal_chat.max_conversations = max_conversations;
                    config
                },
            )
    }

    fn partial_config_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("   \n".to_string()),
            (1u16..=65535).prop_map(|p| format!("server:\n  port: {}\n", p)),
            "[a-z]{3,10}".prop_map(|u| format!("database:\n  url: \"{}.db\"\n", u)),
            valid_time_strategy().prop_map(|t| format!("scheduler:\n  daily_brief_time: \"{}\"\n", t)),
        ]
    }

    // ============================================================================
    // Property Tests
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a valid config to YAML and loading it back yields the same values.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(&config.server.host, &parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(&config.database.url, &parsed.database.url);
            prop_assert_eq!(config.auth.session_days, parsed.auth.session_days);
            prop_assert_eq!(&config.telegram.bot_token, &parsed.telegram.bot_token);
            prop_assert_eq!(&config.scheduler.daily_brief_time, &parsed.scheduler.daily_brief_time);
            prop_assert_eq!(config.meal_chat.max_conversations, parsed.meal_chat.max_conversations);
            prop_assert!(parsed.validate().is_ok());
        }

        /// Partial files are completed with defaults and always validate.
        #[test]
        fn config_default_filling(yaml in partial_config_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let config = Config::load(file.path()).expect("Failed to parse config");

            prop_assert!(!config.server.host.is_empty());
            prop_assert!(!config.database.url.is_empty());
            prop_assert!(config.auth.session_days > 0);
            prop_assert!(config.validate().is_ok());

            if yaml.trim().is_empty() {
                prop_assert_eq!(config.server.port, 3001);
                prop_assert_eq!(config.database.url, "data/itineraries.db");
            }
        }

        /// Environment values take precedence over the file.
        #[test]
        fn env_precedence_over_file(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = lock_env();
            clear_env();

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("Failed to write config");

            std::env::set_var("ITINERARIES_PORT", env_port.to_string());
            let config = Config::load_with_env(file.path()).expect("Failed to load config");
            clear_env();

            prop_assert_eq!(config.server.port, env_port);
        }
    }
}
