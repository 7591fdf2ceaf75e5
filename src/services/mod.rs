//! Services layer - Business logic
//!
//! This module contains the domain services of the family coordination server
//! and the adapters for the outside world (Telegram, Web Push, Google Calendar,
//! SMTP). Services are responsible for:
//! - Implementing business rules
//! - Coordinating between repositories and external adapters
//! - Handling validation and error cases

pub mod address;
pub mod checklist;
pub mod conflict;
pub mod dashboard;
pub mod email;
pub mod error;
pub mod event;
pub mod family;
pub mod family_note;
pub mod google_calendar;
pub mod handoff;
pub mod meal;
pub mod meal_chat;
pub mod meal_learning;
pub mod notification;
pub mod password;
pub mod push;
pub mod rate_limiter;
pub mod recurring_event;
pub mod scheduler;
pub mod task;
pub mod telegram;
pub mod telegram_api;
pub mod timeline_template;
pub mod timeline_suggestion;
pub mod user;

pub use address::AddressService;
pub use checklist::ChecklistService;
pub use conflict::ConflictService;
pub use dashboard::DashboardService;
pub use email::EmailService;
pub use error::{ServiceError, ServiceResult};
pub use event::EventService;
pub use family::FamilyService;
pub use family_note::FamilyNoteService;
pub use google_calendar::{CalendarApi, GoogleCalendarService, HttpCalendarApi};
pub use handoff::HandoffService;
pub use meal::MealService;
pub use meal_chat::MealChatService;
pub use meal_learning::MealLearningService;
pub use notification::NotificationService;
pub use password::{hash_password, verify_password};
pub use push::{HttpPushGateway, PushGateway, PushSender};
pub use rate_limiter::LoginRateLimiter;
pub use recurring_event::RecurringEventService;
pub use scheduler::{standard_jobs, JobServices, Schedule, Scheduler};
pub use task::TaskService;
pub use telegram::TelegramService;
pub use telegram_api::TelegramApi;
pub use timeline_suggestion::TimelineSuggestionService;
pub use timeline_template::TimelineTemplateService;
pub use user::{UserService, UserServiceError};
