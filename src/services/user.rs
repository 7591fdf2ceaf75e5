//! User service
//!
//! Registration, login, and the opaque session tokens that authenticate
//! every other request.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, GoogleTokens, Session, TelegramSettings, User};
use crate::services::password::{hash_password, is_strong_enough, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("{0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("{0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("{0}")]
    UserExists(String),

    /// New accounts are switched off
    #[error("Registration is disabled")]
    RegistrationDisabled,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing accounts and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
    allow_registration: bool,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
            allow_registration: true,
        }
    }

    /// Apply the `auth` config section
    pub fn with_settings(mut self, session_expiration_days: i64, allow_registration: bool) -> Self {
        self.session_expiration_days = session_expiration_days;
        self.allow_registration = allow_registration;
        self
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Register a new user and open a session for them
    ///
    /// # Errors
    ///
    /// - `RegistrationDisabled` when the config forbids new accounts
    /// - `ValidationError` for a missing field, a short password or a malformed email
    /// - `UserExists` if the username or email is taken
    pub async fn register(
        &self,
        input: CreateUserInput,
    ) -> Result<(User, Session), UserServiceError> {
        if !self.allow_registration {
            return Err(UserServiceError::RegistrationDisabled);
        }
        validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_username(input.username.trim())
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username.trim()
            )));
        }

        if self
            .user_repo
            .get_by_email(input.email.trim())
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email.trim()
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let now = Utc::now();
        let user = User {
            id: 0,
            username: input.username.trim().to_string(),
            email: input.email.trim().to_string(),
            password_hash,
            full_name: input.full_name.unwrap_or_default().trim().to_string(),
            telegram_id: None,
            telegram_chat_id: None,
            telegram_settings: TelegramSettings::default(),
            preferences: serde_json::json!({}),
            google_calendar_id: None,
            google_tokens: GoogleTokens::default(),
            last_sync_time: None,
            sync_enabled: false,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;
        tracing::info!(user_id = created.id, username = %created.username, "User registered");

        let session = self.create_session(created.id).await?;
        Ok((created, session))
    }

    /// Check credentials and open a session. `username` may also be an email.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(User, Session), UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid credentials".to_string());

        let user = self
            .find_user_by_username_or_email(username)
            .await?
            .ok_or_else(invalid)?;

        let password_valid =
            verify_password(password, &user.password_hash).context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        Ok((user, session))
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Replace a session with a fresh one
    pub async fn refresh_session(
        &self,
        session_id: &str,
        user_id: i64,
    ) -> Result<Session, UserServiceError> {
        let session = self.create_session(user_id).await?;
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete old session")?;
        Ok(session)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Resolve a session token to its user
    ///
    /// Returns `None` for an unknown or expired token. Expired sessions are
    /// removed on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        Ok(self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

fn validate_register_input(input: &CreateUserInput) -> Result<(), UserServiceError> {
    let missing = input.username.trim().is_empty()
        || input.email.trim().is_empty()
        || input.password.is_empty()
        || input
            .full_name
            .as_deref()
            .map_or(true, |name| name.trim().is_empty());
    if missing {
        return Err(UserServiceError::ValidationError(
            "Username, email, password and full name are required".to_string(),
        ));
    }

    if !is_strong_enough(&input.password) {
        return Err(UserServiceError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }

    Ok(())
}
