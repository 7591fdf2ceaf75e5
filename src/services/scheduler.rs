//! Background jobs
//!
//! A single tokio task wakes up on an interval, looks at the local wall clock
//! and runs every job whose schedule matches the current minute. Each minute
//! is processed at most once.

use crate::config::{parse_hh_mm, SchedulerConfig};
use crate::services::conflict::ConflictService;
use crate::services::google_calendar::GoogleCalendarService;
use crate::services::notification::NotificationService;
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::recurring_event::RecurringEventService;
use crate::services::telegram::TelegramService;
use crate::services::user::UserService;
use anyhow::{anyhow, Result};
use chrono::{Local, NaiveTime, Timelike};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TICK_SECONDS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at this local time
    Daily { hour: u32, minute: u32 },
    /// Every N minutes, on wall-clock multiples (N=15 runs at :00, :15, :30, :45)
    EveryMinutes(u32),
}

impl Schedule {
    pub fn daily(value: &str) -> Result<Self> {
        let (hour, minute) =
            parse_hh_mm(value).ok_or_else(|| anyhow!("Invalid schedule time: {}", value))?;
        Ok(Schedule::Daily { hour, minute })
    }

    pub fn is_due(&self, at: NaiveTime) -> bool {
        match *self {
            Schedule::Daily { hour, minute } => at.hour() == hour && at.minute() == minute,
            Schedule::EveryMinutes(0) => false,
            Schedule::EveryMinutes(n) => (at.hour() * 60 + at.minute()) % n == 0,
        }
    }
}

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<usize>> + Send + Sync>;

struct ScheduledJob {
    name: &'static str,
    schedule: Schedule,
    run: JobFn,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job; its result is the number of items it handled
    pub fn add<F, Fut>(mut self, name: &'static str, schedule: Schedule, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<usize>> + Send + 'static,
    {
        self.jobs.push(ScheduledJob {
            name,
            schedule,
            run: Arc::new(move || Box::pin(job())),
        });
        self
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name).collect()
    }

    /// Run the jobs due at `at`, one after another. Returns how many ran.
    pub async fn run_due(&self, at: NaiveTime) -> usize {
        let mut ran = 0;
        for job in self.jobs.iter().filter(|j| j.schedule.is_due(at)) {
            ran += 1;
            match (job.run)().await {
                Ok(0) => tracing::debug!(job = job.name, "Job finished, nothing to do"),
                Ok(handled) => tracing::info!(job = job.name, handled, "Job finished"),
                Err(e) => tracing::error!(job = job.name, error = %e, "Job failed"),
            }
        }
        ran
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(TICK_SECONDS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_minute = None;
            loop {
                interval.tick().await;
                let now = Local::now().time();
                let minute = (now.hour(), now.minute());
                if last_minute == Some(minute) {
                    continue;
                }
                last_minute = Some(minute);
                self.run_due(now).await;
            }
        })
    }
}

/// The services the standard jobs drive
pub struct JobServices {
    pub notifications: Arc<NotificationService>,
    pub telegram: Arc<TelegramService>,
    pub google: Arc<GoogleCalendarService>,
    pub users: Arc<UserService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub recurring: Arc<RecurringEventService>,
    pub conflicts: Arc<ConflictService>,
}

pub fn standard_jobs(config: &SchedulerConfig, services: JobServices) -> Result<Scheduler> {
    let JobServices {
        notifications,
        telegram,
        google,
        users,
        rate_limiter,
        recurring,
        conflicts,
    } = services;

    let brief = notifications.clone();
    let prep = notifications.clone();
    let alerts = notifications;
    let event_reminders = telegram.clone();
    let task_reminders = telegram;

    Ok(Scheduler::new()
        .add("daily_brief", Schedule::daily(&config.daily_brief_time)?, move || {
            let service = brief.clone();
            async move { Ok(service.send_daily_brief().await?) }
        })
        .add("evening_prep", Schedule::daily(&config.evening_prep_time)?, move || {
            let service = prep.clone();
            async move { Ok(service.send_evening_prep().await?) }
        })
        .add("responsibility_alerts", Schedule::EveryMinutes(30), move || {
            let service = alerts.clone();
            async move { Ok(service.send_responsibility_alert().await?) }
        })
        .add("telegram_event_reminders", Schedule::EveryMinutes(5), move || {
            let service = event_reminders.clone();
            async move { service.send_event_reminders().await }
        })
        .add("telegram_task_reminders", Schedule::EveryMinutes(60), move || {
            let service = task_reminders.clone();
            async move { service.send_task_reminders().await }
        })
        .add("google_sync", Schedule::EveryMinutes(15), move || {
            let service = google.clone();
            async move { service.sync_all().await }
        })
        .add("session_cleanup", Schedule::EveryMinutes(60), move || {
            let service = users.clone();
            async move { Ok(service.cleanup_expired_sessions().await?.max(0) as usize) }
        })
        .add("login_limiter_cleanup", Schedule::EveryMinutes(5), move || {
            let limiter = rate_limiter.clone();
            async move {
                limiter.cleanup().await;
                Ok(0)
            }
        })
        .add("recurring_instances", Schedule::daily("00:15")?, move || {
            let service = recurring.clone();
            async move { Ok(service.top_up().await?) }
        })
        .add("conflict_scan", Schedule::EveryMinutes(60), move || {
            let service = conflicts.clone();
            async move { Ok(service.scan().await?) }
        }))
}
