//! Notification delivery
//!
//! [`NotificationService::send`] applies a user's quiet hours and type
//! filters, fans a notification out to Telegram, web push and email, and
//! logs the attempt in the notification inbox. The scheduled senders
//! (daily brief, evening prep, responsibility alert) build their messages
//! from the calendar and task lists.

use crate::db::repositories::{
    EventRepository, NewNotification, NotificationRepository, TaskRepository, UserRepository,
};
use crate::models::{
    local_day_bounds, AssignmentStatus, Event, HandoffRecord, Notification,
    NotificationPreferences, NotificationPriority, NotificationStats, PushSubscription, Task,
    UpdateNotificationPreferencesInput,
};
use crate::services::email::{plain_text, EmailService};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::push::PushSender;
use crate::services::telegram_api::{inline_keyboard, TelegramApi};
use anyhow::Context;
use chrono::{Duration, Local, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAction {
    pub text: String,
    pub callback_data: String,
}

/// A notification about to be delivered
#[derive(Debug, Clone)]
pub struct OutgoingNotification {
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub data: Value,
    pub actions: Vec<NotificationAction>,
}

impl OutgoingNotification {
    pub fn new(
        notification_type: &str,
        title: &str,
        message: impl Into<String>,
        priority: NotificationPriority,
    ) -> Self {
        Self {
            notification_type: notification_type.to_string(),
            title: title.to_string(),
            message: message.into(),
            priority,
            data: json!({}),
            actions: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_actions(mut self, actions: &[(&str, &str)]) -> Self {
        self.actions = actions
            .iter()
            .map(|(text, callback_data)| NotificationAction {
                text: text.to_string(),
                callback_data: callback_data.to_string(),
            })
            .collect();
        self
    }
}

/// Outcome of one delivery channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelResult {
    pub channel: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelResult {
    fn from_result(channel: &'static str, result: anyhow::Result<bool>) -> Self {
        match result {
            Ok(success) => Self {
                channel,
                success,
                error: None,
            },
            Err(e) => {
                tracing::warn!(channel, error = %e, "Notification channel failed");
                Self {
                    channel,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Subscription fields safe to hand back to clients
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub id: i64,
    pub endpoint: String,
    pub user_agent: Option<String>,
    pub active: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<PushSubscription> for SubscriptionSummary {
    fn from(sub: PushSubscription) -> Self {
        Self {
            id: sub.id,
            endpoint: sub.endpoint,
            user_agent: sub.user_agent,
            active: sub.active,
            created_at: sub.created_at,
        }
    }
}

fn hhmm(value: &str) -> Option<u32> {
    value.replace(':', "").trim().parse().ok()
}

/// Whether `now` falls in the quiet window. Windows with start > end wrap midnight.
pub fn is_quiet_hours(quiet_hours: &Value, now: NaiveTime) -> bool {
    if !quiet_hours["enabled"].as_bool().unwrap_or(false) {
        return false;
    }
    let (Some(start), Some(end)) = (
        quiet_hours["start"].as_str().and_then(hhmm),
        quiet_hours["end"].as_str().and_then(hhmm),
    ) else {
        return false;
    };
    let current = now.hour() * 100 + now.minute();

    if start > end {
        current >= start || current <= end
    } else {
        current >= start && current <= end
    }
}

pub fn format_message(notification: &OutgoingNotification) -> String {
    let mut message = format!("**{}**\n\n", notification.title);
    if !notification.message.is_empty() {
        message.push_str(&notification.message);
        message.push_str("\n\n");
    }
    message.push_str(&format!(
        "{} Priority: {}",
        notification.priority.emoji(),
        notification.priority
    ));
    message
}

pub(crate) fn local_time(at: chrono::DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%-I:%M %p").to_string()
}

pub fn daily_brief_message(name: &str, events: &[Event], tasks: &[Task], unclaimed: &[Event]) -> String {
    let mut message = format!("Good morning, {}!\n\n", name);
    if events.is_empty() && tasks.is_empty() {
        message.push_str("🌟 You have a peaceful day ahead! No scheduled events or urgent tasks.");
        return message;
    }

    message.push_str("📊 **Today's Overview:**\n");
    message.push_str(&format!("• {} events scheduled\n", events.len()));
    message.push_str(&format!("• {} tasks due\n", tasks.len()));
    if !unclaimed.is_empty() {
        message.push_str(&format!("• {} events need assignment\n", unclaimed.len()));
    }
    message.push('\n');

    if !events.is_empty() {
        message.push_str("📅 **Today's Events:**\n");
        for event in events.iter().take(3) {
            message.push_str(&format!("• {} - {}\n", local_time(event.start_time), event.title));
        }
        if events.len() > 3 {
            message.push_str(&format!("... and {} more events\n", events.len() - 3));
        }
        message.push('\n');
    }

    let urgent: Vec<&Task> = tasks.iter().filter(|t| t.priority <= 2).collect();
    if !urgent.is_empty() {
        message.push_str("🔥 **Priority Tasks:**\n");
        for task in urgent.iter().take(3) {
            message.push_str(&format!("• {}\n", task.title));
        }
        message.push('\n');
    }

    if !unclaimed.is_empty() {
        message.push_str("⚠️ **Action Needed:**\n");
        message.push_str(&format!(
            "{} events need to be claimed by someone in the family.\n",
            unclaimed.len()
        ));
    }

    message.push_str("Have a great day! 🌟");
    message
}

pub fn evening_prep_message(name: &str, events: &[Event]) -> String {
    let mut message = format!("Good evening, {}!\n\n🌙 **Tomorrow's Preparation**\n\n", name);

    message.push_str("📅 **Tomorrow's Schedule:**\n");
    for event in events {
        message.push_str(&format!("• {} - {}\n", local_time(event.start_time), event.title));
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            message.push_str(&format!("  📍 {}\n", location));
        }
    }
    message.push('\n');

    let with_prep: Vec<&Event> = events
        .iter()
        .filter(|e| !e.preparation_list.is_empty())
        .collect();
    if !with_prep.is_empty() {
        message.push_str("📋 **Preparation Reminders:**\n");
        for event in with_prep {
            message.push_str(&format!("**{}:**\n", event.title));
            for item in event.preparation_list.iter().take(3) {
                message.push_str(&format!("  • {}\n", item));
            }
            if event.preparation_list.len() > 3 {
                message.push_str(&format!(
                    "  ... and {} more items\n",
                    event.preparation_list.len() - 3
                ));
            }
        }
        message.push('\n');
    }

    message.push_str("Sleep well and be prepared for tomorrow! 😴");
    message
}

pub fn responsibility_alert_message(unclaimed: &[Event]) -> String {
    let mut message = String::from("⚠️ **Family Events Need Assignment**\n\n");
    message.push_str(&format!(
        "{} upcoming events need someone to take responsibility:\n\n",
        unclaimed.len()
    ));

    for event in unclaimed.iter().take(5) {
        let local = event.start_time.with_timezone(&Local);
        message.push_str(&format!(
            "• **{}** - {} at {}\n",
            event.title,
            local.format("%b %-d"),
            local.format("%-I:%M %p")
        ));
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            message.push_str(&format!("  📍 {}\n", location));
        }
    }
    if unclaimed.len() > 5 {
        message.push_str(&format!("... and {} more events\n", unclaimed.len() - 5));
    }

    message.push_str("\nPlease claim responsibility to ensure smooth family coordination! 👨‍👩‍👧‍👦");
    message
}

fn handoff_message(event: &Event, from_name: &str) -> String {
    let local = event.start_time.with_timezone(&Local);
    format!(
        "🔄 **Event Responsibility Handoff**\n\n\
         **{}** has been transferred from {} to you.\n\n\
         📅 Date: {}\n\
         🕐 Time: {}\n\
         📍 Location: {}\n\n\
         Please review the event details and preparation requirements.",
        event.title,
        from_name,
        local.format("%A, %B %-d"),
        local.format("%-I:%M %p"),
        event.location.as_deref().filter(|l| !l.is_empty()).unwrap_or("TBD"),
    )
}

pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventRepository>,
    tasks: Arc<dyn TaskRepository>,
    telegram: Arc<dyn TelegramApi>,
    push: PushSender,
    email: EmailService,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventRepository>,
        tasks: Arc<dyn TaskRepository>,
        telegram: Arc<dyn TelegramApi>,
        push: PushSender,
        email: EmailService,
    ) -> Self {
        Self {
            repo,
            users,
            events,
            tasks,
            telegram,
            push,
            email,
        }
    }

    pub async fn preferences(&self, user_id: i64) -> ServiceResult<NotificationPreferences> {
        Ok(self
            .repo
            .get_preferences(user_id)
            .await
            .context("Failed to load notification preferences")?)
    }

    /// Replace every preference section; each must be a JSON object
    pub async fn update_preferences(
        &self,
        user_id: i64,
        input: UpdateNotificationPreferencesInput,
    ) -> ServiceResult<NotificationPreferences> {
        fn section(value: Option<Value>, label: &str) -> ServiceResult<Value> {
            match value {
                Some(v) if v.is_object() => Ok(v),
                _ => Err(ServiceError::validation(format!("{} must be an object", label))),
            }
        }

        let prefs = NotificationPreferences {
            user_id,
            channel_settings: section(input.channel_settings, "Channel settings")?,
            time_preferences: section(input.time_preferences, "Time preferences")?,
            priority_thresholds: section(input.priority_thresholds, "Priority thresholds")?,
            quiet_hours: section(input.quiet_hours, "Quiet hours")?,
            notification_types: section(input.notification_types, "Notification types")?,
        };
        self.repo
            .save_preferences(&prefs)
            .await
            .context("Failed to save notification preferences")?;
        Ok(prefs)
    }

    /// Deliver through every enabled channel and log the attempt.
    /// Returns `None` when quiet hours or a disabled type suppressed it.
    pub async fn send(
        &self,
        user_id: i64,
        notification: &OutgoingNotification,
    ) -> ServiceResult<Option<Vec<ChannelResult>>> {
        let prefs = self.preferences(user_id).await?;

        if notification.priority != NotificationPriority::Urgent
            && is_quiet_hours(&prefs.quiet_hours, Local::now().time())
        {
            tracing::debug!(user_id, kind = %notification.notification_type, "Skipped during quiet hours");
            return Ok(None);
        }
        if !prefs.type_enabled(&notification.notification_type) {
            tracing::debug!(user_id, kind = %notification.notification_type, "Notification type disabled");
            return Ok(None);
        }

        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let text = format_message(notification);
        let mut results = Vec::new();

        if prefs.channel_enabled("telegram") {
            let sent = match user.telegram_chat_id.as_deref() {
                Some(chat_id) => {
                    let markup = (!notification.actions.is_empty()).then(|| {
                        let buttons: Vec<(String, String)> = notification
                            .actions
                            .iter()
                            .map(|a| (a.text.clone(), a.callback_data.clone()))
                            .collect();
                        inline_keyboard(&buttons)
                    });
                    self.telegram
                        .send_message(chat_id, &text, markup)
                        .await
                        .map(|_| true)
                }
                None => Ok(false),
            };
            results.push(ChannelResult::from_result("telegram", sent));
        }

        if prefs.channel_enabled("push") {
            let payload = json!({
                "title": notification.title,
                "body": notification.message,
                "icon": "/icon-192x192.png",
                "badge": "/icon-192x192.png",
                "data": notification.data,
                "actions": notification.actions,
                "priority": notification.priority,
                "tag": format!("itineraries-{}", notification.notification_type),
                "timestamp": Utc::now().timestamp_millis(),
            });
            results.push(ChannelResult::from_result(
                "push",
                self.push.send(user_id, &payload).await,
            ));
        }

        if prefs.channel_enabled("email") && self.email.is_configured() {
            let sent = self
                .email
                .send(&user.email, &notification.title, &plain_text(&text))
                .await
                .map(|_| true);
            results.push(ChannelResult::from_result("email", sent));
        }

        let sent_via: Vec<&str> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.channel)
            .collect();
        let sent_via = if sent_via.is_empty() {
            "none".to_string()
        } else {
            sent_via.join(",")
        };
        let data = json!({
            "priority": notification.priority,
            "results": results,
            "original_data": notification.data,
        });
        self.repo
            .insert(&NewNotification {
                user_id,
                notification_type: &notification.notification_type,
                title: &notification.title,
                message: &notification.message,
                data: &data,
                sent_via: Some(&sent_via),
            })
            .await
            .context("Failed to log notification")?;

        Ok(Some(results))
    }

    /// Users whose preferences enable `notification_type`
    async fn recipients(&self, notification_type: &str) -> ServiceResult<Vec<crate::models::User>> {
        let users = self.users.list().await.context("Failed to list users")?;
        let mut recipients = Vec::new();
        for user in users {
            if self.preferences(user.id).await?.type_enabled(notification_type) {
                recipients.push(user);
            }
        }
        Ok(recipients)
    }

    /// Send, logging failures for one recipient without stopping a batch
    async fn send_logged(&self, user_id: i64, notification: &OutgoingNotification) -> bool {
        match self.send(user_id, notification).await {
            Ok(outcome) => outcome.is_some(),
            Err(e) => {
                tracing::error!(user_id, kind = %notification.notification_type, error = %e, "Failed to send notification");
                false
            }
        }
    }

    /// Morning overview of today's events and tasks. Returns how many were sent.
    pub async fn send_daily_brief(&self) -> ServiceResult<usize> {
        let today = Local::now().date_naive();
        let (start, end) = local_day_bounds(today);
        let unclaimed: Vec<Event> = self
            .events
            .list_starting_between(start, end)
            .await
            .context("Failed to list today's events")?
            .into_iter()
            .filter(|e| e.assignment_status == AssignmentStatus::Pending)
            .collect();

        let mut sent = 0;
        for user in self.recipients("daily_brief").await? {
            let events = self
                .events
                .list_for_user_between(user.id, start, end)
                .await
                .context("Failed to list events")?;
            let tasks = self
                .tasks
                .list_due_between(Some(user.id), start, end)
                .await
                .context("Failed to list tasks")?;

            let notification = OutgoingNotification::new(
                "daily_brief",
                "Good Morning! Your Daily Brief",
                daily_brief_message(user.display_name(), &events, &tasks, &unclaimed),
                NotificationPriority::Normal,
            )
            .with_data(json!({
                "events": events,
                "tasks": tasks,
                "unclaimed": unclaimed,
                "date": today,
            }))
            .with_actions(&[("📅 View Full Schedule", "today"), ("✅ View Tasks", "tasks")]);

            if self.send_logged(user.id, &notification).await {
                sent += 1;
            }
        }
        tracing::info!(sent, "Daily briefs sent");
        Ok(sent)
    }

    /// Tomorrow's schedule with preparation lists; users without events are skipped
    pub async fn send_evening_prep(&self) -> ServiceResult<usize> {
        let tomorrow = Local::now().date_naive() + Duration::days(1);
        let (start, end) = local_day_bounds(tomorrow);

        let mut sent = 0;
        for user in self.recipients("evening_prep").await? {
            let events = self
                .events
                .list_for_user_between(user.id, start, end)
                .await
                .context("Failed to list events")?;
            if events.is_empty() {
                continue;
            }

            let notification = OutgoingNotification::new(
                "evening_prep",
                "Tomorrow's Preparation",
                evening_prep_message(user.display_name(), &events),
                NotificationPriority::Normal,
            )
            .with_data(json!({ "events": events, "date": tomorrow }))
            .with_actions(&[("📅 Tomorrow's Schedule", "tomorrow"), ("📋 View Checklists", "checklist")]);

            if self.send_logged(user.id, &notification).await {
                sent += 1;
            }
        }
        tracing::info!(sent, "Evening prep notifications sent");
        Ok(sent)
    }

    /// Alert everyone about unassigned events in the next 24 hours
    pub async fn send_responsibility_alert(&self) -> ServiceResult<usize> {
        let now = Utc::now();
        let unclaimed: Vec<Event> = self
            .events
            .list_starting_between(now, now + Duration::hours(24))
            .await
            .context("Failed to list upcoming events")?
            .into_iter()
            .filter(|e| e.assignment_status == AssignmentStatus::Pending)
            .collect();
        if unclaimed.is_empty() {
            return Ok(0);
        }

        let notification = OutgoingNotification::new(
            "responsibility_alerts",
            "Events Need Assignment",
            responsibility_alert_message(&unclaimed),
            NotificationPriority::High,
        )
        .with_data(json!({ "unclaimed_events": unclaimed }))
        .with_actions(&[("👥 View Events", "today"), ("✋ Claim Responsibility", "claim_event")]);

        let mut sent = 0;
        for user in self.recipients("responsibility_alerts").await? {
            if self.send_logged(user.id, &notification).await {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Hand an event to another user and tell them about it
    pub async fn handoff(&self, event_id: i64, from_user_id: i64, to_user_id: i64) -> ServiceResult<Event> {
        let event = self
            .events
            .get_by_id(event_id)
            .await
            .context("Failed to get event")?
            .ok_or_else(|| ServiceError::not_found("Event"))?;
        let from = self
            .users
            .get_by_id(from_user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        if self
            .users
            .get_by_id(to_user_id)
            .await
            .context("Failed to get user")?
            .is_none()
        {
            return Err(ServiceError::not_found("Target user"));
        }

        let notification = OutgoingNotification::new(
            "handoff_notifications",
            "Event Assigned to You",
            handoff_message(&event, from.display_name()),
            NotificationPriority::High,
        )
        .with_data(json!({ "event_id": event_id, "from_user_id": from_user_id }));
        let view = format!("event_{}", event_id);
        let ack = format!("ack_handoff_{}", event_id);
        let notification = OutgoingNotification {
            actions: vec![
                NotificationAction {
                    text: "📋 View Event Details".to_string(),
                    callback_data: view,
                },
                NotificationAction {
                    text: "✅ Acknowledge".to_string(),
                    callback_data: ack,
                },
            ],
            ..notification
        };
        self.send(to_user_id, &notification).await?;

        self.events
            .record_handoff(
                event_id,
                &HandoffRecord::new(from_user_id, to_user_id),
            )
            .await
            .context("Failed to record handoff")?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    pub async fn send_urgent(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        data: Value,
    ) -> ServiceResult<Option<Vec<ChannelResult>>> {
        if title.trim().is_empty() || message.trim().is_empty() {
            return Err(ServiceError::validation("Title and message are required"));
        }
        let notification =
            OutgoingNotification::new("urgent_alerts", title, message, NotificationPriority::Urgent)
                .with_data(data);
        self.send(user_id, &notification).await
    }

    pub async fn send_test(&self, user_id: i64) -> ServiceResult<Option<Vec<ChannelResult>>> {
        let notification = OutgoingNotification::new(
            "test",
            "Test Notification",
            "This is a test notification to verify your settings are working correctly.",
            NotificationPriority::Normal,
        )
        .with_data(json!({ "test": true }));
        self.send(user_id, &notification).await
    }

    pub async fn list(&self, user_id: i64, limit: Option<i64>, unread_only: bool) -> ServiceResult<Vec<Notification>> {
        let limit = limit.unwrap_or(50).clamp(1, 500);
        Ok(self
            .repo
            .list(user_id, limit, unread_only)
            .await
            .context("Failed to list notifications")?)
    }

    pub async fn mark_read(&self, user_id: i64, id: i64) -> ServiceResult<()> {
        if !self
            .repo
            .mark_read(user_id, id)
            .await
            .context("Failed to mark notification read")?
        {
            return Err(ServiceError::not_found("Notification"));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: i64) -> ServiceResult<u64> {
        Ok(self
            .repo
            .mark_all_read(user_id)
            .await
            .context("Failed to mark notifications read")?)
    }

    pub async fn stats(&self, user_id: i64) -> ServiceResult<NotificationStats> {
        Ok(self
            .repo
            .stats(user_id)
            .await
            .context("Failed to load notification stats")?)
    }

    pub async fn subscribe(
        &self,
        user_id: i64,
        subscription: &Value,
        user_agent: Option<&str>,
    ) -> ServiceResult<SubscriptionSummary> {
        let endpoint = subscription["endpoint"]
            .as_str()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ServiceError::validation("Subscription endpoint is required"))?;

        let saved = self
            .repo
            .upsert_subscription(user_id, endpoint, subscription, user_agent)
            .await
            .context("Failed to save push subscription")?;
        Ok(saved.into())
    }

    pub async fn unsubscribe(&self, user_id: i64, subscription: &Value) -> ServiceResult<()> {
        let endpoint = subscription["endpoint"]
            .as_str()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ServiceError::validation("Subscription endpoint is required"))?;

        if !self
            .repo
            .deactivate_subscription(user_id, endpoint)
            .await
            .context("Failed to remove push subscription")?
        {
            return Err(ServiceError::not_found("Subscription"));
        }
        Ok(())
    }

    pub async fn subscriptions(&self, user_id: i64) -> ServiceResult<Vec<SubscriptionSummary>> {
        Ok(self
            .repo
            .list_active_subscriptions(user_id)
            .await
            .context("Failed to list push subscriptions")?
            .into_iter()
            .map(SubscriptionSummary::from)
            .collect())
    }
}
