//! Itineraries - Family coordination server
//!
//! Shared calendar, tasks, meal planning, checklists, family notes and
//! notifications (Telegram, Web Push, email) behind a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
