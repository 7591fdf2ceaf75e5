//! Telegram Bot API client
//!
//! Only `sendMessage` and `answerCallbackQuery` are used. Without a bot token
//! the mock client logs every call and returns synthetic message ids.

use crate::config::TelegramConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One row of an inline keyboard button: (label, callback data)
pub type Button = (&'static str, &'static str);

/// Build `reply_markup` with one button per row
pub fn inline_keyboard(buttons: &[(String, String)]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|(text, data)| json!([{ "text": text, "callback_data": data }]))
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Same as [`inline_keyboard`] for static buttons
pub fn keyboard(buttons: &[Button]) -> Value {
    let owned: Vec<(String, String)> = buttons
        .iter()
        .map(|(t, d)| (t.to_string(), d.to_string()))
        .collect();
    inline_keyboard(&owned)
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Send a Markdown message and return its message id
    async fn send_message(&self, chat_id: &str, text: &str, reply_markup: Option<Value>) -> Result<i64>;

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()>;

    fn is_mock(&self) -> bool;
}

/// Pick the HTTP client when a token is configured, the mock otherwise
pub fn from_config(config: &TelegramConfig) -> Result<Arc<dyn TelegramApi>> {
    match config.bot_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Ok(Arc::new(HttpTelegramApi::new(&config.api_base, token)?)),
        None => {
            tracing::warn!("Telegram bot token not configured, running in mock mode");
            Ok(Arc::new(MockTelegramApi::default()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

pub struct HttpTelegramApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelegramApi {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Itineraries")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let response: ApiResponse = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        if !response.ok {
            return Err(anyhow!(
                "Telegram {} failed: {}",
                method,
                response.description.unwrap_or_default()
            ));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl TelegramApi for HttpTelegramApi {
    async fn send_message(&self, chat_id: &str, text: &str, reply_markup: Option<Value>) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let result = self.call("sendMessage", &body).await?;
        Ok(result["message_id"].as_i64().unwrap_or_default())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_query_id }),
        )
        .await?;
        Ok(())
    }

    fn is_mock(&self) -> bool {
        false
    }
}

/// Logs outgoing messages and remembers them for inspection
#[derive(Default)]
pub struct MockTelegramApi {
    next_id: AtomicI64,
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl MockTelegramApi {
    /// Messages sent so far as (chat id, text)
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TelegramApi for MockTelegramApi {
    async fn send_message(&self, chat_id: &str, text: &str, _reply_markup: Option<Value>) -> Result<i64> {
        tracing::info!(chat_id, text, "[mock] Telegram message");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id.to_string(), text.to_string()));
        }
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        tracing::debug!(callback_query_id, "[mock] Callback query answered");
        Ok(())
    }

    fn is_mock(&self) -> bool {
        true
    }
}
