//! Telegram bot
//!
//! Turns webhook updates into replies, links accounts through `TG` codes and
//! sends event and task reminders to linked chats.

use crate::config::TelegramConfig;
use crate::db::repositories::{
    ChecklistRepository, EventRepository, NewNotification, NotificationRepository, TaskRepository,
    UserRepository,
};
use crate::models::{local_day_bounds, CreateTaskInput, Event, Task, TaskStatus, TelegramSettings, User};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::notification::local_time;
use crate::services::telegram_api::{keyboard, TelegramApi};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const LINK_FIRST: &str = "🔗 Please link your account first using /start";
const NOT_LINKED: &str = "User not linked to Telegram";

fn is_linking_code(code: &str) -> bool {
    code.len() == 8 && code.starts_with("TG") && code[2..].bytes().all(|b| b.is_ascii_digit())
}

/// Drop the leading "add", "add reminder to" or "add task to"
fn strip_add_prefix(text: &str) -> String {
    match Regex::new(r"add\s+(reminder\s+to\s+|task\s+to\s+)?") {
        Ok(re) => re.replace(text, "").trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

/// Linking code for a Telegram user id: `TG` plus its last six digits
pub fn linking_code(telegram_id: &str) -> String {
    let digits = &telegram_id[telegram_id.len().saturating_sub(6)..];
    format!("TG{:0>6}", digits)
}

// Webhook payloads. Only the fields the bot reads are declared.

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Sender,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// What a message or button press asks the bot to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    Start,
    Today,
    Tomorrow,
    Week,
    Tasks,
    Checklists,
    Add(String),
    Help,
    HelpLinking,
    /// Free text the bot could not place
    Unknown,
}

impl BotAction {
    /// Parse a `/command`, ignoring a trailing `@botname`
    pub fn from_command(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let command = head.split('@').next().unwrap_or(head);
        let action = match command {
            "/start" => Self::Start,
            "/today" => Self::Today,
            "/tomorrow" => Self::Tomorrow,
            "/week" => Self::Week,
            "/tasks" => Self::Tasks,
            "/checklist" => Self::Checklists,
            "/add" => Self::Add(rest.trim().to_string()),
            "/help" => Self::Help,
            _ => return None,
        };
        Some(action)
    }

    /// Keyword matching for plain messages
    pub fn from_text(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("today") {
            Self::Today
        } else if text.contains("tomorrow") {
            Self::Tomorrow
        } else if text.contains("week") {
            Self::Week
        } else if text.contains("add") && (text.contains("reminder") || text.contains("task")) {
            Self::Add(strip_add_prefix(&text))
        } else if text.contains("task") {
            Self::Tasks
        } else {
            Self::Unknown
        }
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        let action = match data {
            "today" => Self::Today,
            "tomorrow" => Self::Tomorrow,
            "week" => Self::Week,
            "tasks" => Self::Tasks,
            "checklist" => Self::Checklists,
            "help" => Self::Help,
            "help_linking" => Self::HelpLinking,
            _ => return None,
        };
        Some(action)
    }

    fn failure_text(&self) -> &'static str {
        match self {
            Self::Today => "❌ Error fetching today's schedule. Please try again.",
            Self::Tomorrow => "❌ Error fetching tomorrow's schedule. Please try again.",
            Self::Week => "❌ Error fetching week overview. Please try again.",
            Self::Tasks => "❌ Error fetching tasks. Please try again.",
            Self::Checklists => "❌ Error fetching checklists. Please try again.",
            Self::Add(_) => "❌ Sorry, couldn't add that item. Please try again.",
            _ => "❌ Sorry, something went wrong. Please try again later.",
        }
    }
}

struct Reply {
    text: String,
    markup: Option<Value>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    fn with_buttons(text: impl Into<String>, buttons: &[(&'static str, &'static str)]) -> Self {
        Self {
            text: text.into(),
            markup: Some(keyboard(buttons)),
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%a, %b %-d").to_string()
}

fn local_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSettingsInput {
    pub notifications_enabled: Option<bool>,
    pub reminder_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelegramStatus {
    pub linked: bool,
    pub telegram_id: Option<String>,
    pub has_chat_connection: bool,
    pub settings: TelegramSettings,
    pub bot_username: String,
    pub bot_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkingCode {
    #[serde(rename = "linkingCode")]
    pub linking_code: String,
    #[serde(rename = "alreadyLinked")]
    pub already_linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotInfo {
    pub bot_active: bool,
    pub mock_mode: bool,
    pub bot_username: String,
    pub connected_users: i64,
    pub notifications_sent_24h: i64,
    pub webhook_url: Option<String>,
}

pub struct TelegramService {
    api: Arc<dyn TelegramApi>,
    config: TelegramConfig,
    public_url: Option<String>,
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventRepository>,
    tasks: Arc<dyn TaskRepository>,
    checklists: Arc<dyn ChecklistRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl TelegramService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn TelegramApi>,
        config: TelegramConfig,
        public_url: Option<String>,
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventRepository>,
        tasks: Arc<dyn TaskRepository>,
        checklists: Arc<dyn ChecklistRepository>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            api,
            config,
            public_url,
            users,
            events,
            tasks,
            checklists,
            notifications,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.api.is_mock()
    }

    /// True when no secret is configured or the header matches it
    pub fn verify_webhook_secret(&self, header: Option<&str>) -> bool {
        match self.config.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => header == Some(secret),
            None => true,
        }
    }

    /// Handle one webhook update. Failures are reported to the chat, not the caller.
    pub async fn handle_update(&self, update: &Update) -> Result<()> {
        if let Some(callback) = &update.callback_query {
            self.api.answer_callback_query(&callback.id).await?;
            let Some(chat_id) = callback.message.as_ref().map(|m| m.chat.id) else {
                return Ok(());
            };
            match callback.data.as_deref().and_then(BotAction::from_callback) {
                Some(action) => self.act(chat_id, callback.from.id, action).await?,
                None => tracing::debug!(data = ?callback.data, "Ignoring callback"),
            }
            return Ok(());
        }

        let Some(message) = &update.message else {
            return Ok(());
        };
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let sender = message.from.as_ref().map(|f| f.id).unwrap_or(message.chat.id);

        let action = if text.starts_with('/') {
            match BotAction::from_command(text) {
                Some(action) => action,
                None => return Ok(()),
            }
        } else {
            BotAction::from_text(text)
        };
        self.act(message.chat.id, sender, action).await
    }

    async fn act(&self, chat_id: i64, sender_id: i64, action: BotAction) -> Result<()> {
        let chat = chat_id.to_string();
        let reply = match &action {
            BotAction::Start => self.start(&chat, sender_id).await,
            BotAction::Help => Ok(help()),
            BotAction::HelpLinking => Ok(Reply::text(
                "🔗 **Linking Your Account**\n\n\
                 1. Open your Itineraries app\n\
                 2. Go to Settings\n\
                 3. Find \"Telegram Integration\"\n\
                 4. Enter the linking code I provided\n\
                 5. Come back here and try /start again\n\n\
                 Need more help? Contact your family admin!",
            )),
            _ => match self.users.get_by_telegram_chat_id(&chat).await? {
                None => Ok(Reply::text(LINK_FIRST)),
                Some(user) => self.respond(&user, &action).await,
            },
        };

        let reply = reply.unwrap_or_else(|e| {
            tracing::error!(chat_id, ?action, error = %e, "Telegram handler failed");
            Reply::text(action.failure_text())
        });
        self.api.send_message(&chat, &reply.text, reply.markup).await?;
        Ok(())
    }

    async fn respond(&self, user: &User, action: &BotAction) -> Result<Reply> {
        let today = Local::now().date_naive();
        match action {
            BotAction::Today => self.day(user, today, true).await,
            BotAction::Tomorrow => self.day(user, today + Duration::days(1), false).await,
            BotAction::Week => self.week(user, today).await,
            BotAction::Tasks => self.task_list(user).await,
            BotAction::Checklists => self.checklist_list(user).await,
            BotAction::Add(text) => self.quick_add(user, text).await,
            _ => Ok(Reply::with_buttons(
                "🤔 I'm not sure what you mean. Try one of these:\n\n\
                 • \"What's on today?\"\n\
                 • \"Show me tomorrow's schedule\"\n\
                 • \"What tasks do I have?\"\n\
                 • \"Add reminder to pack lunch\"\n\n\
                 Or use /help to see all commands.",
                &[("📅 Today", "today"), ("✅ Tasks", "tasks"), ("❓ Help", "help")],
            )),
        }
    }

    async fn start(&self, chat: &str, sender_id: i64) -> Result<Reply> {
        let code = linking_code(&sender_id.to_string());
        match self.users.get_by_telegram_id(&code[2..]).await? {
            Some(user) => {
                self.users.set_telegram_chat_id(user.id, chat).await?;
                tracing::info!(user_id = user.id, "Telegram chat linked");
                Ok(Reply::with_buttons(
                    format!(
                        "🎉 Welcome back, {}!\n\n\
                         Your Telegram account is now linked to Itineraries. You'll receive notifications and can interact with your family schedule right here.\n\n\
                         Try these commands:\n\
                         • /today - See today's schedule\n\
                         • /tomorrow - See tomorrow's schedule\n\
                         • /tasks - View your tasks\n\
                         • /help - See all commands",
                        user.display_name()
                    ),
                    &[("📅 Today's Schedule", "today"), ("✅ My Tasks", "tasks"), ("🗓️ This Week", "week")],
                ))
            }
            None => Ok(Reply::with_buttons(
                format!(
                    "👋 Hello! I'm your Itineraries assistant!\n\n\
                     To get started, you need to link your Telegram account with your Itineraries account.\n\n\
                     Here's your unique linking code: `{}`\n\n\
                     Please enter this code in your Itineraries app settings under \"Telegram Integration\".",
                    code
                ),
                &[("❓ Need Help?", "help_linking")],
            )),
        }
    }

    async fn day(&self, user: &User, date: NaiveDate, is_today: bool) -> Result<Reply> {
        let (start, end) = local_day_bounds(date);
        let events = self.events.list_for_user_between(user.id, start, end).await?;
        let tasks = self.tasks.list_due_between(Some(user.id), start, end).await?;
        let (label, empty) = if is_today {
            ("Today", "🌟 You have a free day today! No scheduled events or urgent tasks.")
        } else {
            ("Tomorrow", "🌟 Tomorrow looks free! No scheduled events or urgent tasks.")
        };

        if events.is_empty() && tasks.is_empty() {
            return Ok(Reply::text(empty));
        }

        let mut message = format!("📅 **{}'s Schedule** ({})\n\n", label, format_date(date));
        if !events.is_empty() {
            message.push_str("🗓️ **Events:**\n");
            push_events(&mut message, &events);
            message.push('\n');
        }
        if !tasks.is_empty() {
            message.push_str(&format!("✅ **Tasks Due {}:**\n", label));
            for task in &tasks {
                message.push_str(&format!("• {}\n", task.title));
            }
        }

        Ok(if is_today {
            Reply::with_buttons(
                message,
                &[("📅 Tomorrow", "tomorrow"), ("🗓️ This Week", "week"), ("✅ All Tasks", "tasks")],
            )
        } else {
            Reply::with_buttons(message, &[("📅 Today", "today"), ("🗓️ This Week", "week")])
        })
    }

    /// Sunday through Saturday of the current week
    async fn week(&self, user: &User, today: NaiveDate) -> Result<Reply> {
        let first = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
        let last = first + Duration::days(6);
        let (start, _) = local_day_bounds(first);
        let (_, end) = local_day_bounds(last);

        let events = self.events.list_for_user_between(user.id, start, end).await?;
        let tasks = self.tasks.list_due_between(Some(user.id), start, end).await?;

        let mut message = format!(
            "🗓️ **This Week's Overview**\n{} - {}\n\n",
            format_date(first),
            format_date(last)
        );
        if events.is_empty() && tasks.is_empty() {
            message.push_str("🌟 You have a peaceful week ahead!");
        } else {
            message.push_str("📊 **Summary:**\n");
            message.push_str(&format!("• {} events scheduled\n", events.len()));
            message.push_str(&format!("• {} tasks to complete\n\n", tasks.len()));

            let mut by_day: BTreeMap<NaiveDate, Vec<&Event>> = BTreeMap::new();
            for event in &events {
                by_day.entry(local_date(event.start_time)).or_default().push(event);
            }
            for (day, day_events) in by_day {
                message.push_str(&format!("**{}:**\n", format_date(day)));
                for event in day_events {
                    message.push_str(&format!("• {} - {}\n", local_time(event.start_time), event.title));
                }
                message.push('\n');
            }
        }

        Ok(Reply::with_buttons(
            message,
            &[("📅 Today", "today"), ("📅 Tomorrow", "tomorrow"), ("✅ Tasks", "tasks")],
        ))
    }

    async fn task_list(&self, user: &User) -> Result<Reply> {
        let tasks = self.tasks.list_pending_for_user(user.id).await?;
        if tasks.is_empty() {
            return Ok(Reply::text("🎉 All caught up! You have no pending tasks."));
        }

        let mut message = String::from("✅ **Your Tasks**\n\n");
        let groups: [(&str, Vec<&Task>); 3] = [
            ("🔥 High", tasks.iter().filter(|t| t.priority <= 1).collect()),
            ("📋 Medium", tasks.iter().filter(|t| t.priority == 2).collect()),
            ("📝 Low", tasks.iter().filter(|t| t.priority >= 3).collect()),
        ];
        for (label, group) in groups.iter().filter(|(_, g)| !g.is_empty()) {
            message.push_str(&format!("**{} Priority:**\n", label));
            for task in group {
                message.push_str(&format!("• {}", task.title));
                if let Some(due) = task.due_date {
                    message.push_str(&format!(" (Due: {})", format_date(local_date(due))));
                }
                message.push('\n');
            }
            message.push('\n');
        }

        Ok(Reply::with_buttons(
            message,
            &[("📅 Today", "today"), ("🗓️ This Week", "week"), ("📝 Add Task", "add_task")],
        ))
    }

    async fn checklist_list(&self, user: &User) -> Result<Reply> {
        let checklists: Vec<_> = self
            .checklists
            .list_active_instances()
            .await?
            .into_iter()
            .filter(|c| c.created_by == Some(user.id))
            .collect();
        if checklists.is_empty() {
            return Ok(Reply::text("📋 No active checklists at the moment."));
        }

        let mut message = String::from("📋 **Active Checklists**\n\n");
        for checklist in &checklists {
            message.push_str(&format!(
                "**{}**\nProgress: {}%\n\n",
                checklist.title,
                checklist.completion_percentage.round()
            ));
        }
        Ok(Reply::with_buttons(message, &[("📅 Today", "today"), ("✅ Tasks", "tasks")]))
    }

    async fn quick_add(&self, user: &User, text: &str) -> Result<Reply> {
        let title = text.trim();
        if title.is_empty() {
            return Ok(Reply::text("✏️ Tell me what to add, for example: /add pack lunch"));
        }
        let input = CreateTaskInput {
            title: title.to_string(),
            assigned_to: Some(user.id),
            priority: Some(3),
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        let task = self.tasks.create(&input, Some(user.id)).await?;
        tracing::info!(user_id = user.id, task_id = task.id, "Task added from Telegram");

        Ok(Reply::with_buttons(
            format!("✅ Added task: \"{}\"", title),
            &[("✅ View All Tasks", "tasks")],
        ))
    }

    async fn user(&self, user_id: i64) -> ServiceResult<User> {
        self.users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    /// Store the Telegram id encoded in a `TG123456` code
    pub async fn link(&self, user_id: i64, code: Option<&str>) -> ServiceResult<String> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::validation("Linking code is required"))?;
        if !is_linking_code(code) {
            return Err(ServiceError::validation("Invalid linking code format"));
        }
        self.user(user_id).await?;

        self.users
            .set_telegram_link(user_id, Some(&code[2..]))
            .await
            .context("Failed to link Telegram account")?;
        tracing::info!(user_id, "Telegram account linked");
        Ok(code.to_string())
    }

    pub async fn unlink(&self, user_id: i64) -> ServiceResult<()> {
        self.user(user_id).await?;
        self.users
            .set_telegram_link(user_id, None)
            .await
            .context("Failed to unlink Telegram account")?;
        self.users
            .update_telegram_settings(user_id, &TelegramSettings::default())
            .await
            .context("Failed to reset Telegram settings")?;
        Ok(())
    }

    pub async fn status(&self, user_id: i64) -> ServiceResult<TelegramStatus> {
        let user = self.user(user_id).await?;
        let has_chat = user.telegram_chat_id.is_some();
        Ok(TelegramStatus {
            linked: user.is_telegram_linked() && has_chat,
            telegram_id: user.telegram_id,
            has_chat_connection: has_chat,
            settings: user.telegram_settings,
            bot_username: self.config.bot_username.clone(),
            bot_active: !self.is_mock(),
        })
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        input: TelegramSettingsInput,
    ) -> ServiceResult<TelegramSettings> {
        let notifications_enabled = input
            .notifications_enabled
            .ok_or_else(|| ServiceError::validation("notifications_enabled must be boolean"))?;
        let reminder_minutes = input.reminder_minutes.unwrap_or(30);
        if !(5..=120).contains(&reminder_minutes) {
            return Err(ServiceError::validation("reminder_minutes must be between 5 and 120"));
        }
        self.user(user_id).await?;

        let settings = TelegramSettings {
            notifications_enabled,
            reminder_minutes,
        };
        self.users
            .update_telegram_settings(user_id, &settings)
            .await
            .context("Failed to update Telegram settings")?;
        Ok(settings)
    }

    /// Returns the id of the delivered message
    pub async fn send_test(&self, user_id: i64) -> ServiceResult<i64> {
        let user = self.user(user_id).await?;
        let chat = user
            .telegram_chat_id
            .as_deref()
            .ok_or_else(|| ServiceError::validation(NOT_LINKED))?;
        let text = format!(
            "🧪 **Test Message**\n\n\
             Hello {}! Your Telegram integration is working perfectly.\n\n\
             You'll receive notifications for:\n\
             • Upcoming events ({} min before)\n\
             • Task reminders\n\
             • Important family updates",
            user.display_name(),
            user.telegram_settings.reminder_minutes
        );
        Ok(self
            .api
            .send_message(chat, &text, Some(keyboard(&[("📅 Today's Schedule", "today")])))
            .await
            .context("Failed to send test message")?)
    }

    pub async fn send_custom(&self, user_id: i64, message: Option<&str>) -> ServiceResult<i64> {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ServiceError::validation("Message is required"))?;
        let user = self.user(user_id).await?;
        let chat = user
            .telegram_chat_id
            .as_deref()
            .ok_or_else(|| ServiceError::validation(NOT_LINKED))?;
        Ok(self
            .api
            .send_message(chat, message, None)
            .await
            .context("Failed to send message")?)
    }

    pub async fn linking_code_for(&self, user_id: i64) -> ServiceResult<LinkingCode> {
        let user = self.user(user_id).await?;
        Ok(match user.telegram_id.as_deref().filter(|id| !id.is_empty()) {
            Some(telegram_id) => LinkingCode {
                linking_code: linking_code(telegram_id),
                already_linked: true,
                note: None,
            },
            None => LinkingCode {
                linking_code: linking_code(&user_id.to_string()),
                already_linked: false,
                note: Some("This code will be validated when user starts the bot"),
            },
        })
    }

    pub async fn info(&self) -> ServiceResult<BotInfo> {
        let connected_users = self
            .users
            .count_telegram_linked()
            .await
            .context("Failed to count linked users")?;
        let notifications_sent_24h = self
            .notifications
            .count_sent_via("telegram", Utc::now() - Duration::hours(24))
            .await
            .context("Failed to count Telegram notifications")?;

        Ok(BotInfo {
            bot_active: !self.is_mock(),
            mock_mode: self.is_mock(),
            bot_username: self.config.bot_username.clone(),
            connected_users,
            notifications_sent_24h,
            webhook_url: self
                .public_url
                .as_deref()
                .map(|url| format!("{}/api/telegram/webhook", url.trim_end_matches('/'))),
        })
    }

    async fn reminder_recipients(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .list_with_telegram_chat()
            .await?
            .into_iter()
            .filter(|u| u.telegram_settings.notifications_enabled)
            .collect())
    }

    async fn log_reminder(
        &self,
        user_id: i64,
        notification_type: &str,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<()> {
        self.notifications
            .insert(&NewNotification {
                user_id,
                notification_type,
                title,
                message,
                data: &data,
                sent_via: Some("telegram"),
            })
            .await?;
        Ok(())
    }

    /// Remind each linked user of events starting within their reminder window.
    /// An event is reminded at most once per user.
    pub async fn send_event_reminders(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sent = 0;

        for user in self.reminder_recipients().await? {
            let Some(chat) = user.telegram_chat_id.as_deref() else {
                continue;
            };
            let minutes = user.telegram_settings.reminder_minutes;
            let events = self
                .events
                .list_for_user_between(user.id, now, now + Duration::minutes(minutes))
                .await?;

            for event in events {
                if self
                    .notifications
                    .exists_for(user.id, "event_reminder", "event_id", event.id, None)
                    .await?
                {
                    continue;
                }

                let text = format!(
                    "🔔 **Upcoming Event Reminder**\n\n\
                     📅 **{}**\n\
                     🕐 {}\n\
                     📍 {}\n\n\
                     Starting in {} minutes!",
                    event.title,
                    local_time(event.start_time),
                    event
                        .location
                        .as_deref()
                        .filter(|l| !l.is_empty())
                        .unwrap_or("No location specified"),
                    (event.start_time - now).num_minutes().max(1),
                );
                if let Err(e) = self
                    .api
                    .send_message(chat, &text, Some(keyboard(&[("📅 Today's Schedule", "today")])))
                    .await
                {
                    tracing::warn!(user_id = user.id, event_id = event.id, error = %e, "Event reminder failed");
                    continue;
                }

                self.log_reminder(
                    user.id,
                    "event_reminder",
                    "Event Reminder",
                    &format!("Reminder: {} starting in {} minutes", event.title, minutes),
                    json!({ "event_id": event.id }),
                )
                .await?;
                sent += 1;
            }
        }

        if sent > 0 {
            tracing::info!(sent, "Telegram event reminders sent");
        }
        Ok(sent)
    }

    /// Remind assignees of unfinished tasks due later today, once per task per day
    pub async fn send_task_reminders(&self) -> Result<usize> {
        let now = Utc::now();
        let (day_start, day_end) = local_day_bounds(Local::now().date_naive());
        let mut sent = 0;

        for user in self.reminder_recipients().await? {
            let Some(chat) = user.telegram_chat_id.as_deref() else {
                continue;
            };
            let tasks = self
                .tasks
                .list_due_between(Some(user.id), now, day_end)
                .await?
                .into_iter()
                .filter(|t| t.assigned_to == Some(user.id));

            for task in tasks {
                if self
                    .notifications
                    .exists_for(user.id, "task_reminder", "task_id", task.id, Some(day_start))
                    .await?
                {
                    continue;
                }
                let due = task.due_date.map(local_date).unwrap_or_else(|| local_date(now));

                let text = format!(
                    "⏰ **Task Reminder**\n\n\
                     ✅ **{}**\n\
                     📅 Due: {}\n\n\
                     Don't forget to complete this task!",
                    task.title,
                    format_date(due)
                );
                if let Err(e) = self
                    .api
                    .send_message(chat, &text, Some(keyboard(&[("✅ View All Tasks", "tasks")])))
                    .await
                {
                    tracing::warn!(user_id = user.id, task_id = task.id, error = %e, "Task reminder failed");
                    continue;
                }

                self.log_reminder(
                    user.id,
                    "task_reminder",
                    "Task Reminder",
                    &format!("Reminder: {} is due today", task.title),
                    json!({ "task_id": task.id }),
                )
                .await?;
                sent += 1;
            }
        }

        if sent > 0 {
            tracing::info!(sent, "Telegram task reminders sent");
        }
        Ok(sent)
    }
}

fn push_events(message: &mut String, events: &[Event]) {
    for event in events {
        message.push_str(&format!("• {} - {}\n", local_time(event.start_time), event.title));
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            message.push_str(&format!("  📍 {}\n", location));
        }
    }
}

fn help() -> Reply {
    Reply::with_buttons(
        "🤖 **Your Itineraries Assistant**\n\n\
         **Commands:**\n\
         • /today - Today's schedule\n\
         • /tomorrow - Tomorrow's schedule\n\
         • /week - This week's overview\n\
         • /tasks - View your tasks\n\
         • /checklist - Active checklists\n\
         • /add [text] - Quick add task/reminder\n\
         • /help - Show this help\n\n\
         **Natural Language:**\n\
         You can also just type questions like:\n\
         • \"What's on today?\"\n\
         • \"When is soccer practice?\"\n\
         • \"Add reminder to pack lunch\"\n\n\
         **Notifications:**\n\
         I'll send you reminders before events and for important tasks.",
        &[("📅 Today", "today"), ("✅ Tasks", "tasks")],
    )
}
