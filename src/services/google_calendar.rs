//! Google Calendar integration
//!
//! OAuth2 consent and token storage, calendar listing, one-way import of
//! Google events into the local calendar, and export of local events.
//! The OAuth `state` carries the user id signed with HMAC-SHA256 so the
//! public callback can trust it.

use crate::config::GoogleConfig;
use crate::db::repositories::{EventRepository, UserRepository};
use crate::models::{CreateEventInput, Event, GoogleTokens, UpdateEventInput, User};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];
const SYNCED: &str = "synced";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleOrganizer {
    #[serde(default)]
    pub email: Option<String>,
}

/// The subset of a Calendar API event resource used here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub start: GoogleEventTime,
    #[serde(default)]
    pub end: GoogleEventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<GoogleOrganizer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub primary: bool,
    pub access_role: Option<String>,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
}

/// Google Calendar and OAuth endpoints
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens>;

    /// The returned tokens may omit the refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokens>;

    async fn list_calendars(&self, access_token: &str) -> Result<Vec<CalendarSummary>>;

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleEvent>>;

    async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleEvent,
    ) -> Result<GoogleEvent>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl From<TokenResponse> for GoogleTokens {
    fn from(response: TokenResponse) -> Self {
        GoogleTokens {
            access_token: Some(response.access_token),
            refresh_token: response.refresh_token,
            expiry_date: response
                .expires_in
                .map(|secs| Utc::now().timestamp_millis() + secs * 1000),
            scope: response.scope,
            token_type: response.token_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    primary: Option<bool>,
    #[serde(default)]
    access_role: Option<String>,
    #[serde(default)]
    background_color: Option<String>,
    #[serde(default)]
    foreground_color: Option<String>,
}

pub struct HttpCalendarApi {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl HttpCalendarApi {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Itineraries")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<GoogleTokens> {
        let client_id = self.config.client_id.as_deref().unwrap_or_default();
        let client_secret = self.config.client_secret.as_deref().unwrap_or_default();
        let mut form = vec![("client_id", client_id), ("client_secret", client_secret)];
        form.extend_from_slice(params);

        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let response = self
            .client
            .post(&self.config.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .context("Failed to reach Google token endpoint")?;

        if !response.status().is_success() {
            return Err(anyhow!("Google token endpoint returned {}", response.status()));
        }
        let tokens: TokenResponse = response
            .json()
            .await
            .context("Failed to parse Google token response")?;
        Ok(tokens.into())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl CalendarApi for HttpCalendarApi {
    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
        self.token_request(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokens> {
        self.token_request(&[("refresh_token", refresh_token), ("grant_type", "refresh_token")])
            .await
    }

    async fn list_calendars(&self, access_token: &str) -> Result<Vec<CalendarSummary>> {
        let list: ListResponse<CalendarListEntry> = self
            .client
            .get(self.url("/users/me/calendarList"))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to fetch calendars")?
            .error_for_status()
            .context("Google rejected the calendar list request")?
            .json()
            .await
            .context("Failed to parse calendar list")?;

        Ok(list
            .items
            .into_iter()
            .map(|c| CalendarSummary {
                name: c.summary.unwrap_or_else(|| c.id.clone()),
                id: c.id,
                description: c.description.unwrap_or_default(),
                primary: c.primary.unwrap_or(false),
                access_role: c.access_role,
                background_color: c.background_color,
                foreground_color: c.foreground_color,
            })
            .collect())
    }

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleEvent>> {
        let url = self.url(&format!(
            "/calendars/{}/events?timeMin={}&timeMax={}&maxResults=250&singleEvents=true&orderBy=startTime",
            urlencoding::encode(calendar_id),
            urlencoding::encode(&time_min.to_rfc3339()),
            urlencoding::encode(&time_max.to_rfc3339()),
        ));
        let list: ListResponse<GoogleEvent> = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to fetch events from Google Calendar")?
            .error_for_status()
            .context("Google rejected the event list request")?
            .json()
            .await
            .context("Failed to parse Google events")?;
        Ok(list.items)
    }

    async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleEvent,
    ) -> Result<GoogleEvent> {
        self.client
            .post(self.url(&format!("/calendars/{}/events", urlencoding::encode(calendar_id))))
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .context("Failed to create event in Google Calendar")?
            .error_for_status()
            .context("Google rejected the new event")?
            .json()
            .await
            .context("Failed to parse created Google event")
    }
}

fn parse_event_time(time: &GoogleEventTime) -> Result<DateTime<Utc>> {
    if let Some(date_time) = &time.date_time {
        return Ok(DateTime::parse_from_rfc3339(date_time)
            .with_context(|| format!("Invalid dateTime {}", date_time))?
            .with_timezone(&Utc));
    }
    if let Some(date) = &time.date {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date {}", date))?;
        return Ok(day.and_time(NaiveTime::MIN).and_utc());
    }
    Err(anyhow!("Event time has neither dateTime nor date"))
}

/// Map a Google event onto a local event input
pub fn to_local(event: &GoogleEvent) -> Result<CreateEventInput> {
    Ok(CreateEventInput {
        title: event
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Untitled Event".to_string()),
        description: event.description.clone(),
        start_time: parse_event_time(&event.start)?,
        end_time: parse_event_time(&event.end)?,
        location: event.location.clone(),
        calendar_id: Some(
            event
                .organizer
                .as_ref()
                .and_then(|o| o.email.clone())
                .unwrap_or_else(|| "primary".to_string()),
        ),
        event_type: Some(SYNCED.to_string()),
        google_event_id: event.id.clone(),
        ..Default::default()
    })
}

pub fn to_google(event: &Event, time_zone: &str) -> GoogleEvent {
    let at = |t: DateTime<Utc>| GoogleEventTime {
        date_time: Some(t.to_rfc3339()),
        date: None,
        time_zone: Some(time_zone.to_string()),
    };
    GoogleEvent {
        id: None,
        summary: Some(event.title.clone()),
        description: event.description.clone(),
        location: event.location.clone(),
        start: at(event.start_time),
        end: at(event.end_time),
        organizer: None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleStatus {
    pub configured: bool,
    pub connected: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub event_id: i64,
    pub google_event_id: String,
    pub conflict: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub google_event_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub imported: usize,
    pub updated: usize,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<SyncError>,
}

fn content_mismatch(local: &Event, remote: &CreateEventInput) -> Option<Value> {
    if local.title == remote.title
        && local.start_time == remote.start_time
        && local.end_time == remote.end_time
    {
        return None;
    }
    Some(json!({
        "type": "content_mismatch",
        "localUpdated": local.updated_at,
        "fields": {
            "title": { "local": local.title, "google": remote.title },
            "start_time": { "local": local.start_time, "google": remote.start_time },
            "end_time": { "local": local.end_time, "google": remote.end_time },
        }
    }))
}

pub struct GoogleCalendarService {
    api: Arc<dyn CalendarApi>,
    config: GoogleConfig,
    state_secret: String,
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventRepository>,
}

impl GoogleCalendarService {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        config: GoogleConfig,
        state_secret: String,
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            api,
            config,
            state_secret,
            users,
            events,
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.state_secret.as_bytes())
            .map_err(|e| anyhow!("Invalid state secret: {}", e))
    }

    /// `{user_id}.{hex hmac}`
    pub fn sign_state(&self, user_id: i64) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(user_id.to_string().as_bytes());
        Ok(format!("{}.{}", user_id, HEXLOWER.encode(&mac.finalize().into_bytes())))
    }

    pub fn verify_state(&self, state: &str) -> Option<i64> {
        let (id, signature) = state.split_once('.')?;
        let signature = HEXLOWER.decode(signature.as_bytes()).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        id.parse().ok()
    }

    fn ensure_configured(&self) -> ServiceResult<()> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(ServiceError::Unavailable("Google Calendar not configured".to_string()))
        }
    }

    async fn user(&self, user_id: i64) -> ServiceResult<User> {
        self.users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    pub async fn status(&self, user_id: i64) -> ServiceResult<GoogleStatus> {
        let user = self.user(user_id).await?;
        Ok(GoogleStatus {
            configured: self.config.is_configured(),
            connected: user.has_google_tokens(),
            last_sync: user.last_sync_time,
        })
    }

    pub fn auth_url(&self, user_id: i64) -> ServiceResult<String> {
        self.ensure_configured()?;
        let state = self.sign_state(user_id)?;
        let scope = SCOPES.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_deref().unwrap_or_default()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state.as_str()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        Ok(format!("{}?{}", self.config.auth_base, query))
    }

    /// Finish the OAuth flow and return where to send the browser
    pub async fn callback(&self, code: Option<&str>, state: Option<&str>) -> String {
        let settings = format!("{}/settings", self.config.client_url.trim_end_matches('/'));
        let Some(code) = code.filter(|c| !c.is_empty()) else {
            return format!("{}?error=missing_code", settings);
        };

        match self.complete_auth(code, state.unwrap_or_default()).await {
            Ok(user_id) => {
                tracing::info!(user_id, "Google Calendar connected");
                format!("{}?calendar_auth=success", settings)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Google OAuth callback failed");
                format!("{}?calendar_auth=error", settings)
            }
        }
    }

    async fn complete_auth(&self, code: &str, state: &str) -> Result<i64> {
        let user_id = self
            .verify_state(state)
            .ok_or_else(|| anyhow!("Invalid OAuth state"))?;
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| anyhow!("Unknown user {}", user_id))?;

        let tokens = self
            .api
            .exchange_code(code)
            .await
            .context("Failed to exchange authorization code")?;
        if tokens.refresh_token.is_none() {
            tracing::warn!(user_id, "No refresh token received; access must be re-granted later");
        }
        self.users.update_google_tokens(user_id, &tokens, true).await?;
        self.users.set_last_sync_time(user_id, Utc::now()).await?;
        Ok(user_id)
    }

    pub async fn disconnect(&self, user_id: i64) -> ServiceResult<()> {
        self.user(user_id).await?;
        self.users
            .update_google_tokens(user_id, &GoogleTokens::default(), false)
            .await
            .context("Failed to clear Google tokens")?;
        Ok(())
    }

    /// A valid access token, refreshing and persisting it when expired
    async fn access_token(&self, user: &User) -> ServiceResult<String> {
        let tokens = &user.google_tokens;
        if !user.has_google_tokens() {
            return Err(ServiceError::validation(
                "User not authenticated with Google Calendar",
            ));
        }
        if !tokens.is_expired(Utc::now()) {
            return Ok(tokens.access_token.clone().unwrap_or_default());
        }

        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            ServiceError::validation(
                "No refresh token available. User needs to re-authorize with Google Calendar.",
            )
        })?;
        let fresh = self
            .api
            .refresh(refresh_token)
            .await
            .context("Failed to refresh Google access token")?;
        let merged = GoogleTokens {
            refresh_token: fresh.refresh_token.clone().or_else(|| tokens.refresh_token.clone()),
            scope: fresh.scope.clone().or_else(|| tokens.scope.clone()),
            ..fresh
        };
        self.users
            .update_google_tokens(user.id, &merged, user.sync_enabled)
            .await
            .context("Failed to store refreshed tokens")?;
        tracing::debug!(user_id = user.id, "Google access token refreshed");

        Ok(merged.access_token.unwrap_or_default())
    }

    pub async fn calendars(&self, user_id: i64) -> ServiceResult<Vec<CalendarSummary>> {
        self.ensure_configured()?;
        let user = self.user(user_id).await?;
        let token = self.access_token(&user).await?;
        Ok(self.api.list_calendars(&token).await?)
    }

    /// Import Google events changed since the last sync, up to 90 days ahead
    pub async fn sync(&self, user_id: i64, calendar_id: Option<&str>) -> ServiceResult<SyncReport> {
        self.ensure_configured()?;
        let user = self.user(user_id).await?;
        if !user.sync_enabled {
            return Err(ServiceError::validation("Sync not enabled for user"));
        }
        let token = self.access_token(&user).await?;

        let now = Utc::now();
        let time_min = user.last_sync_time.unwrap_or(now - Duration::days(7));
        let time_max = now + Duration::days(90);
        let remote = self
            .api
            .list_events(&token, calendar_id.unwrap_or("primary"), time_min, time_max)
            .await?;

        let mut report = SyncReport::default();
        for event in &remote {
            if let Err(e) = self.import_one(event, user_id, &mut report).await {
                report.errors.push(SyncError {
                    google_event_id: event.id.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.users
            .set_last_sync_time(user_id, Utc::now())
            .await
            .context("Failed to stamp sync time")?;
        tracing::info!(
            user_id,
            imported = report.imported,
            updated = report.updated,
            conflicts = report.conflicts.len(),
            errors = report.errors.len(),
            "Google Calendar sync finished"
        );
        Ok(report)
    }

    /// Sync every connected user with sync turned on. Returns how many succeeded.
    pub async fn sync_all(&self) -> Result<usize> {
        if !self.config.is_configured() {
            return Ok(0);
        }
        let users = self.users.list_sync_enabled().await?;
        let mut synced = 0;
        for user in users.iter().filter(|u| u.has_google_tokens()) {
            match self.sync(user.id, None).await {
                Ok(_) => synced += 1,
                Err(e) => tracing::warn!(user_id = user.id, error = %e, "Scheduled Google sync failed"),
            }
        }
        Ok(synced)
    }

    async fn import_one(&self, event: &GoogleEvent, user_id: i64, report: &mut SyncReport) -> Result<()> {
        let google_id = event
            .id
            .clone()
            .ok_or_else(|| anyhow!("Google event has no id"))?;
        let input = to_local(event)?;

        match self.events.get_by_google_id(&google_id).await? {
            Some(existing) => {
                if let Some(conflict) = content_mismatch(&existing, &input) {
                    report.conflicts.push(SyncConflict {
                        event_id: existing.id,
                        google_event_id: google_id,
                        conflict,
                    });
                    return Ok(());
                }
                let update = UpdateEventInput {
                    title: Some(input.title),
                    description: input.description,
                    start_time: Some(input.start_time),
                    end_time: Some(input.end_time),
                    location: input.location,
                    ..Default::default()
                };
                self.events.update(existing.id, &update).await?;
                report.updated += 1;
            }
            None => {
                self.events.create(&input, Some(user_id)).await?;
                report.imported += 1;
            }
        }
        Ok(())
    }

    /// Create the local event in Google Calendar and remember its id
    pub async fn export(&self, user_id: i64, event_id: i64, calendar_id: Option<&str>) -> ServiceResult<Event> {
        self.ensure_configured()?;
        let event = self
            .events
            .get_by_id(event_id)
            .await
            .context("Failed to get event")?
            .ok_or_else(|| ServiceError::not_found("Event"))?;
        let user = self.user(user_id).await?;
        let token = self.access_token(&user).await?;

        let created = self
            .api
            .insert_event(
                &token,
                calendar_id.unwrap_or("primary"),
                &to_google(&event, &self.config.time_zone),
            )
            .await?;
        let google_id = created
            .id
            .ok_or_else(|| anyhow!("Google did not return an event id"))?;
        self.events
            .set_google_event_id(event_id, &google_id)
            .await
            .context("Failed to store Google event id")?;

        Ok(Event {
            google_event_id: Some(google_id),
            ..event
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::event::tests::event_input;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxEventRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCalendarApi {
        events: Vec<GoogleEvent>,
        refreshes: Mutex<usize>,
        inserted: Mutex<Vec<GoogleEvent>>,
    }

    #[async_trait]
    impl CalendarApi for FakeCalendarApi {
        async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
            if code == "bad" {
                return Err(anyhow!("invalid_grant"));
            }
            Ok(GoogleTokens {
                access_token: Some("access-1".to_string()),
                refresh_token: Some("refresh-1".to_string()),
                expiry_date: Some(Utc::now().timestamp_millis() + 3_600_000),
                ..Default::default()
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<GoogleTokens> {
            *self.refreshes.lock().unwrap() += 1;
            Ok(GoogleTokens {
                access_token: Some("access-2".to_string()),
                expiry_date: Some(Utc::now().timestamp_millis() + 3_600_000),
                ..Default::default()
            })
        }

        async fn list_calendars(&self, _access_token: &str) -> Result<Vec<CalendarSummary>> {
            Ok(vec![CalendarSummary {
                id: "primary".to_string(),
                name: "Home".to_string(),
                description: String::new(),
                primary: true,
                access_role: Some("owner".to_string()),
                background_color: None,
                foreground_color: None,
            }])
        }

        async fn list_events(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
        ) -> Result<Vec<GoogleEvent>> {
            Ok(self.events.clone())
        }

        async fn insert_event(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            event: &GoogleEvent,
        ) -> Result<GoogleEvent> {
            self.inserted.lock().unwrap().push(event.clone());
            Ok(GoogleEvent {
                id: Some("g-new".to_string()),
                ..event.clone()
            })
        }
    }

    fn configured() -> GoogleConfig {
        GoogleConfig {
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            client_url: "http://app.example".to_string(),
            ..Default::default()
        }
    }

    fn google_event(id: &str, title: &str, start: &str, end: &str) -> GoogleEvent {
        GoogleEvent {
            id: Some(id.to_string()),
            summary: Some(title.to_string()),
            start: GoogleEventTime {
                date_time: Some(start.to_string()),
                ..Default::default()
            },
            end: GoogleEventTime {
                date_time: Some(end.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn setup(
        api: FakeCalendarApi,
        config: GoogleConfig,
    ) -> (GoogleCalendarService, Arc<FakeCalendarApi>, Arc<dyn UserRepository>, Arc<dyn EventRepository>, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let events = SqlxEventRepository::boxed(pool);
        let user = users.create(&new_user("cal")).await.unwrap();
        let api = Arc::new(api);
        let service = GoogleCalendarService::new(
            api.clone(),
            config,
            "state-secret".to_string(),
            users.clone(),
            events.clone(),
        );
        (service, api, users, events, user.id)
    }

    #[test]
    fn test_google_to_local_mapping() {
        let all_day = GoogleEvent {
            id: Some("g1".to_string()),
            start: GoogleEventTime {
                date: Some("2024-05-01".to_string()),
                ..Default::default()
            },
            end: GoogleEventTime {
                date: Some("2024-05-02".to_string()),
                ..Default::default()
            },
            organizer: Some(GoogleOrganizer {
                email: Some("mom@example.com".to_string()),
            }),
            ..Default::default()
        };
        let input = to_local(&all_day).unwrap();
        assert_eq!(input.title, "Untitled Event");
        assert_eq!(input.start_time.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert_eq!(input.calendar_id.as_deref(), Some("mom@example.com"));
        assert_eq!(input.event_type.as_deref(), Some("synced"));
        assert_eq!(input.google_event_id.as_deref(), Some("g1"));

        assert!(to_local(&GoogleEvent::default()).is_err());
    }

    #[tokio::test]
    async fn test_state_signature() {
        let (service, ..) = setup(FakeCalendarApi::default(), configured()).await;
        let state = service.sign_state(42).unwrap();
        assert_eq!(service.verify_state(&state), Some(42));
        assert_eq!(service.verify_state(&state.replacen("42", "43", 1)), None);
        assert_eq!(service.verify_state("42"), None);
    }

    #[tokio::test]
    async fn test_auth_url_requires_configuration() {
        let (service, ..) = setup(FakeCalendarApi::default(), GoogleConfig::default()).await;
        assert!(matches!(service.auth_url(1), Err(ServiceError::Unavailable(_))));

        let (service, ..) = setup(FakeCalendarApi::default(), configured()).await;
        let url = service.auth_url(1).unwrap();
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains(&urlencoding::encode(SCOPES[1]).into_owned()));
    }

    #[tokio::test]
    async fn test_callback_stores_tokens() {
        let (service, _, users, _, user) = setup(FakeCalendarApi::default(), configured()).await;

        assert_eq!(
            service.callback(None, None).await,
            "http://app.example/settings?error=missing_code"
        );
        assert_eq!(
            service.callback(Some("code"), Some("1.deadbeef")).await,
            "http://app.example/settings?calendar_auth=error"
        );

        let state = service.sign_state(user).unwrap();
        assert_eq!(
            service.callback(Some("code"), Some(&state)).await,
            "http://app.example/settings?calendar_auth=success"
        );
        let stored = users.get_by_id(user).await.unwrap().unwrap();
        assert!(stored.sync_enabled);
        assert_eq!(stored.google_tokens.refresh_token.as_deref(), Some("refresh-1"));
        assert!(service.status(user).await.unwrap().connected);

        service.disconnect(user).await.unwrap();
        let status = service.status(user).await.unwrap();
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn test_sync_imports_updates_and_reports_conflicts() {
        let api = FakeCalendarApi {
            events: vec![
                google_event("g-same", "Soccer", "2030-01-05T10:00:00Z", "2030-01-05T11:00:00Z"),
                google_event("g-moved", "Piano", "2030-01-06T15:00:00Z", "2030-01-06T16:00:00Z"),
                google_event("g-new", "Dentist", "2030-01-07T09:00:00Z", "2030-01-07T10:00:00Z"),
                GoogleEvent {
                    id: Some("g-broken".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let (service, _, users, events, user) = setup(api, configured()).await;
        let state = service.sign_state(user).unwrap();
        service.callback(Some("code"), Some(&state)).await;

        for (gid, title, start) in [
            ("g-same", "Soccer", "2030-01-05T10:00:00Z"),
            ("g-moved", "Piano", "2030-01-06T14:00:00Z"),
        ] {
            let start = DateTime::parse_from_rfc3339(start).unwrap().with_timezone(&Utc);
            let mut input = event_input(title, start, 1);
            input.google_event_id = Some(gid.to_string());
            events.create(&input, Some(user)).await.unwrap();
        }

        let report = service.sync(user, None).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].google_event_id, "g-moved");
        assert_eq!(report.errors.len(), 1);

        let imported = events.get_by_google_id("g-new").await.unwrap().unwrap();
        assert_eq!(imported.event_type.as_deref(), Some("synced"));
        assert!(users.get_by_id(user).await.unwrap().unwrap().last_sync_time.is_some());
    }

    #[tokio::test]
    async fn test_sync_requires_enabled_and_refreshes_tokens() {
        let (service, api, users, _, user) = setup(FakeCalendarApi::default(), configured()).await;
        assert!(matches!(
            service.sync(user, None).await,
            Err(ServiceError::ValidationError(_))
        ));

        let expired = GoogleTokens {
            access_token: Some("old".to_string()),
            refresh_token: Some("refresh-1".to_string()),
            expiry_date: Some(0),
            ..Default::default()
        };
        users.update_google_tokens(user, &expired, true).await.unwrap();
        service.sync(user, None).await.unwrap();

        assert_eq!(*api.refreshes.lock().unwrap(), 1);
        let tokens = users.get_by_id(user).await.unwrap().unwrap().google_tokens;
        assert_eq!(tokens.access_token.as_deref(), Some("access-2"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_export_stores_google_id() {
        let (service, api, _, events, user) = setup(FakeCalendarApi::default(), configured()).await;
        let state = service.sign_state(user).unwrap();
        service.callback(Some("code"), Some(&state)).await;
        let event = events
            .create(&event_input("Recital", Utc::now() + Duration::days(3), 2), Some(user))
            .await
            .unwrap();

        let exported = service.export(user, event.id, None).await.unwrap();
        assert_eq!(exported.google_event_id.as_deref(), Some("g-new"));
        let sent = api.inserted.lock().unwrap();
        assert_eq!(sent[0].start.time_zone.as_deref(), Some("America/New_York"));
        assert_eq!(
            events.get_by_id(event.id).await.unwrap().unwrap().google_event_id.as_deref(),
            Some("g-new")
        );
    }
}
