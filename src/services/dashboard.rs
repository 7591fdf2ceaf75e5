//! Dashboard service
//!
//! Read-only aggregates over events, tasks and conflicts. Days are local
//! calendar days.

use crate::db::repositories::{ConflictRepository, EventRepository, TaskRepository, UserRepository};
use crate::models::{local_day_bounds, Event, Task, TaskFilter, TaskStatus, User};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_FOCUS: &str = "Family coordination and task completion";

fn plural_s(n: usize) -> &'static str {
    if n > 1 {
        "s"
    } else {
        ""
    }
}

/// Local day boundaries used by every aggregate
#[derive(Debug, Clone, Copy)]
struct Days {
    today: DateTime<Utc>,
    tomorrow: DateTime<Utc>,
    day_after: DateTime<Utc>,
    week_end: DateTime<Utc>,
}

impl Days {
    fn now() -> Self {
        let date = Local::now().date_naive();
        let (today, tomorrow) = local_day_bounds(date);
        let (_, day_after) = local_day_bounds(date + Duration::days(1));
        Self {
            today,
            tomorrow,
            day_after,
            week_end: today + Duration::days(7),
        }
    }

    fn is_today(&self, at: DateTime<Utc>) -> bool {
        at >= self.today && at < self.tomorrow
    }

    fn is_overdue(&self, task: &Task) -> bool {
        task.status != TaskStatus::Completed && task.due_date.is_some_and(|d| d < self.today)
    }

    fn is_due_today(&self, task: &Task) -> bool {
        task.status != TaskStatus::Completed && task.due_date.is_some_and(|d| self.is_today(d))
    }
}

fn is_active(task: &Task) -> bool {
    task.status != TaskStatus::Completed
}

fn is_high_priority(priority: i64) -> bool {
    priority <= 2
}

fn involves(event: &Event, user_id: i64) -> bool {
    event.assigned_to == Some(user_id) || event.created_by == Some(user_id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub insight_type: &'static str,
    pub message: String,
    pub priority: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TodaysEvents {
    pub total: usize,
    pub family: usize,
    pub needing_prep: usize,
}

#[derive(Debug, Serialize)]
pub struct TomorrowEvents {
    pub total: usize,
    pub early: usize,
}

#[derive(Debug, Serialize)]
pub struct TaskCounts {
    pub active: usize,
    pub overdue: usize,
    pub due_today: usize,
    pub high_priority: usize,
}

#[derive(Debug, Serialize)]
pub struct ConflictCount {
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct MemberActivity {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub active_tasks: usize,
    pub today_events: usize,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub todays_events: TodaysEvents,
    pub tomorrow_events: TomorrowEvents,
    pub tasks: TaskCounts,
    pub conflicts: ConflictCount,
    pub family_activity: Vec<MemberActivity>,
    pub insights: Vec<Insight>,
    pub focus: String,
    pub key_reminders: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonalUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct PersonalStatistics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub overdue_tasks: usize,
    pub due_today_tasks: usize,
    pub today_events: usize,
    pub this_week_events: usize,
    pub completion_rate: i64,
    pub workload_level: &'static str,
    pub workload_score: usize,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct PriorityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Serialize)]
pub struct PersonalDashboard {
    pub user: PersonalUser,
    pub statistics: PersonalStatistics,
    pub priority_breakdown: PriorityBreakdown,
    pub insights: Vec<String>,
    pub recent_tasks: Vec<Task>,
    pub upcoming_events: Vec<Event>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberWorkload {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub active_tasks: usize,
    pub high_priority_tasks: usize,
    pub due_today_tasks: usize,
    pub overdue_tasks: usize,
    pub today_events: usize,
    pub events_need_prep: usize,
    pub workload_score: usize,
    pub workload_level: &'static str,
    pub needs_attention: bool,
    pub availability_status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WorkloadBalance {
    pub is_balanced: bool,
    pub heaviest_member: Option<MemberWorkload>,
    pub lightest_member: Option<MemberWorkload>,
    pub average_workload: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkloadTotals {
    pub total_active_tasks: usize,
    pub total_today_events: usize,
    pub total_overdue: usize,
    pub members_needing_attention: usize,
}

#[derive(Debug, Serialize)]
pub struct FamilyWorkload {
    pub members: Vec<MemberWorkload>,
    pub balance: WorkloadBalance,
    pub summary: WorkloadTotals,
}

pub fn personal_workload_level(score: usize) -> &'static str {
    match score {
        s if s >= 10 => "heavy",
        s if s >= 6 => "moderate",
        _ => "light",
    }
}

pub fn family_workload_level(score: usize) -> &'static str {
    match score {
        s if s >= 8 => "heavy",
        s if s >= 4 => "moderate",
        _ => "light",
    }
}

pub fn availability(score: usize) -> &'static str {
    match score {
        0..=2 => "available",
        3..=5 => "busy",
        _ => "overloaded",
    }
}

fn completion_insight(rate: i64) -> &'static str {
    match rate {
        r if r >= 80 => "Excellent task completion rate! Keep up the great work.",
        r if r >= 60 => "Good progress on tasks. Consider focusing on high-priority items.",
        r if r >= 40 => {
            "Room for improvement on task completion. Break down large tasks into smaller ones."
        }
        _ => "Consider reviewing your task management approach and priorities.",
    }
}

/// Balance figures over members already sorted by score, heaviest first
fn balance(members: &[MemberWorkload]) -> WorkloadBalance {
    let heaviest = members.first().cloned();
    let lightest = members.last().cloned();
    let max = heaviest.as_ref().map_or(0, |m| m.workload_score);
    let min = lightest.as_ref().map_or(0, |m| m.workload_score);
    let average = if members.is_empty() {
        0.0
    } else {
        let total: usize = members.iter().map(|m| m.workload_score).sum();
        (total as f64 / members.len() as f64 * 100.0).round() / 100.0
    };

    let is_balanced = max - min <= 3;
    let mut recommendations = Vec::new();
    if let (false, Some(heaviest)) = (is_balanced, heaviest.as_ref()) {
        recommendations.push(format!(
            "Consider redistributing tasks from {} to balance workload",
            heaviest.full_name
        ));
    }
    let overloaded = members.iter().filter(|m| m.workload_level == "heavy").count();
    if overloaded > 0 {
        recommendations.push(format!(
            "{} family member{} may be overloaded",
            overloaded,
            plural_s(overloaded)
        ));
    }

    WorkloadBalance {
        is_balanced,
        heaviest_member: heaviest,
        lightest_member: lightest,
        average_workload: average,
        recommendations,
    }
}

pub struct DashboardService {
    events: Arc<dyn EventRepository>,
    tasks: Arc<dyn TaskRepository>,
    users: Arc<dyn UserRepository>,
    conflicts: Arc<dyn ConflictRepository>,
}

impl DashboardService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        tasks: Arc<dyn TaskRepository>,
        users: Arc<dyn UserRepository>,
        conflicts: Arc<dyn ConflictRepository>,
    ) -> Self {
        Self {
            events,
            tasks,
            users,
            conflicts,
        }
    }

    async fn all_tasks(&self) -> ServiceResult<Vec<Task>> {
        Ok(self
            .tasks
            .list(&TaskFilter::default())
            .await
            .context("Failed to list tasks")?)
    }

    async fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<Event>> {
        let mut events = self
            .events
            .list_starting_between(from, to)
            .await
            .context("Failed to list events")?;
        events.retain(|e| !e.is_recurring);
        Ok(events)
    }

    async fn users(&self) -> ServiceResult<Vec<User>> {
        Ok(self.users.list().await.context("Failed to list users")?)
    }

    pub async fn summary(&self) -> ServiceResult<DashboardSummary> {
        let days = Days::now();
        let events = self.events_between(days.today, days.day_after).await?;
        let (today_events, tomorrow_events): (Vec<&Event>, Vec<&Event>) =
            events.iter().partition(|e| days.is_today(e.start_time));
        let tasks = self.all_tasks().await?;
        let active: Vec<&Task> = tasks.iter().filter(|t| is_active(t)).collect();
        let overdue = active.iter().filter(|t| days.is_overdue(t)).count();
        let due_today: Vec<&Task> = active.iter().copied().filter(|t| days.is_due_today(t)).collect();
        let active_conflicts = self
            .conflicts
            .count_active()
            .await
            .context("Failed to count active conflicts")?;

        let family_activity = self
            .users()
            .await?
            .into_iter()
            .map(|u| MemberActivity {
                active_tasks: active.iter().filter(|t| t.assigned_to == Some(u.id)).count(),
                today_events: today_events.iter().filter(|e| involves(e, u.id)).count(),
                user_id: u.id,
                username: u.username,
                full_name: u.full_name,
            })
            .collect();

        let mut insights = Vec::new();
        if overdue > 0 {
            insights.push(Insight {
                insight_type: "warning",
                message: format!(
                    "{} task{} overdue - need immediate attention",
                    overdue,
                    plural_s(overdue)
                ),
                priority: "high",
            });
        }
        if !due_today.is_empty() {
            insights.push(Insight {
                insight_type: "info",
                message: format!("{} task{} due today", due_today.len(), plural_s(due_today.len())),
                priority: "medium",
            });
        }
        if today_events.len() > 5 {
            insights.push(Insight {
                insight_type: "info",
                message: "Busy day ahead with multiple events scheduled".to_string(),
                priority: "medium",
            });
        }
        if active_conflicts > 0 {
            let n = active_conflicts as usize;
            insights.push(Insight {
                insight_type: "warning",
                message: format!("{} schedule conflict{} need resolution", n, plural_s(n)),
                priority: "high",
            });
        }

        let focus = insights
            .iter()
            .find(|i| i.priority == "high")
            .or_else(|| insights.first())
            .map(|i| i.message.clone())
            .unwrap_or_else(|| DEFAULT_FOCUS.to_string());

        let key_reminders = due_today
            .iter()
            .take(2)
            .map(|t| format!("Complete: {}", t.title))
            .chain(today_events.iter().take(2).map(|e| {
                format!(
                    "{}: {}",
                    e.start_time.with_timezone(&Local).format("%H:%M"),
                    e.title
                )
            }))
            .take(3)
            .collect();

        Ok(DashboardSummary {
            todays_events: TodaysEvents {
                total: today_events.len(),
                family: today_events.iter().filter(|e| e.category == "family").count(),
                needing_prep: today_events
                    .iter()
                    .filter(|e| !e.preparation_list.is_empty())
                    .count(),
            },
            tomorrow_events: TomorrowEvents {
                total: tomorrow_events.len(),
                early: tomorrow_events
                    .iter()
                    .filter(|e| e.start_time.with_timezone(&Local).hour() < 9)
                    .count(),
            },
            tasks: TaskCounts {
                active: active.len(),
                overdue,
                due_today: due_today.len(),
                high_priority: active.iter().filter(|t| is_high_priority(t.priority)).count(),
            },
            conflicts: ConflictCount {
                active: active_conflicts,
            },
            family_activity,
            insights,
            focus,
            key_reminders,
        })
    }

    pub async fn personal(&self, user_id: i64) -> ServiceResult<PersonalDashboard> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let days = Days::now();

        let mut tasks: Vec<Task> = self
            .all_tasks()
            .await?
            .into_iter()
            .filter(|t| t.assigned_to == Some(user_id) || t.created_by == Some(user_id))
            .collect();
        tasks.sort_by_key(|t| (!is_active(t), t.priority, t.due_date.is_none(), t.due_date));

        let week_events: Vec<Event> = self
            .events_between(days.today, days.week_end)
            .await?
            .into_iter()
            .filter(|e| involves(e, user_id))
            .collect();
        let today_events = week_events.iter().filter(|e| days.is_today(e.start_time)).count();

        let pending: Vec<&Task> = tasks.iter().filter(|t| is_active(t)).collect();
        let completed = tasks.len() - pending.len();
        let overdue = pending.iter().filter(|t| days.is_overdue(t)).count();
        let due_today = pending.iter().filter(|t| days.is_due_today(t)).count();
        let completion_rate = if tasks.is_empty() {
            0
        } else {
            (completed as f64 / tasks.len() as f64 * 100.0).round() as i64
        };
        let workload_score = pending.len() + today_events + overdue * 2;
        let workload_level = personal_workload_level(workload_score);

        let mut priority_breakdown = PriorityBreakdown::default();
        for task in &pending {
            match task.priority {
                p if is_high_priority(p) => priority_breakdown.high += 1,
                3 => priority_breakdown.medium += 1,
                _ => priority_breakdown.low += 1,
            }
        }

        let mut insights = vec![completion_insight(completion_rate).to_string()];
        if overdue > 0 {
            insights.push(format!(
                "{} overdue task{} need immediate attention.",
                overdue,
                plural_s(overdue)
            ));
        }
        if workload_level == "heavy" {
            insights.push(
                "Heavy workload detected. Consider delegating or rescheduling some items.".to_string(),
            );
        }

        let recommendations = [
            (overdue > 0, "Focus on completing overdue tasks first"),
            (due_today > 0, "Complete today's tasks before end of day"),
            (priority_breakdown.high > 0, "Prioritize high-importance tasks"),
            (today_events > 3, "Prepare for busy day with multiple events"),
        ]
        .into_iter()
        .filter(|(applies, _)| *applies)
        .map(|(_, text)| text.to_string())
        .take(3)
        .collect();

        Ok(PersonalDashboard {
            statistics: PersonalStatistics {
                total_tasks: tasks.len(),
                completed_tasks: completed,
                pending_tasks: pending.len(),
                overdue_tasks: overdue,
                due_today_tasks: due_today,
                today_events,
                this_week_events: week_events.len(),
                completion_rate,
                workload_level,
                workload_score,
            },
            priority_breakdown,
            insights,
            recommendations,
            recent_tasks: tasks.iter().take(10).cloned().collect(),
            upcoming_events: week_events.into_iter().take(5).collect(),
            user: PersonalUser {
                id: user.id,
                username: user.username,
                full_name: user.full_name,
            },
        })
    }

    pub async fn family_workload(&self) -> ServiceResult<FamilyWorkload> {
        let days = Days::now();
        let tasks = self.all_tasks().await?;
        let today_events = self.events_between(days.today, days.tomorrow).await?;

        let mut members: Vec<MemberWorkload> = self
            .users()
            .await?
            .into_iter()
            .map(|u| {
                let mine: Vec<&Task> = tasks
                    .iter()
                    .filter(|t| is_active(t) && t.assigned_to == Some(u.id))
                    .collect();
                let events: Vec<&Event> = today_events.iter().filter(|e| involves(e, u.id)).collect();
                let overdue = mine.iter().filter(|t| days.is_overdue(t)).count();
                let due_today = mine.iter().filter(|t| days.is_due_today(t)).count();
                let score = mine.len() + events.len() + overdue * 2;
                MemberWorkload {
                    id: u.id,
                    username: u.username,
                    full_name: u.full_name,
                    email: u.email,
                    active_tasks: mine.len(),
                    high_priority_tasks: mine.iter().filter(|t| is_high_priority(t.priority)).count(),
                    due_today_tasks: due_today,
                    overdue_tasks: overdue,
                    today_events: events.len(),
                    events_need_prep: events.iter().filter(|e| !e.preparation_list.is_empty()).count(),
                    workload_score: score,
                    workload_level: family_workload_level(score),
                    needs_attention: overdue > 0 || due_today > 2,
                    availability_status: availability(score),
                }
            })
            .collect();
        members.sort_by(|a, b| b.workload_score.cmp(&a.workload_score));

        let summary = WorkloadTotals {
            total_active_tasks: members.iter().map(|m| m.active_tasks).sum(),
            total_today_events: members.iter().map(|m| m.today_events).sum(),
            total_overdue: members.iter().map(|m| m.overdue_tasks).sum(),
            members_needing_attention: members.iter().filter(|m| m.needs_attention).count(),
        };
        Ok(FamilyWorkload {
            balance: balance(&members),
            members,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::event::tests::event_input;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{
        SqlxConflictRepository, SqlxEventRepository, SqlxTaskRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::CreateTaskInput;

    struct Fixture {
        service: DashboardService,
        events: Arc<dyn EventRepository>,
        tasks: Arc<dyn TaskRepository>,
        parent: i64,
        partner: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let parent = users.create(&new_user("parent")).await.unwrap().id;
        let partner = users.create(&new_user("partner")).await.unwrap().id;
        let events = SqlxEventRepository::boxed(pool.clone());
        let tasks = SqlxTaskRepository::boxed(pool.clone());
        Fixture {
            service: DashboardService::new(
                events.clone(),
                tasks.clone(),
                users,
                SqlxConflictRepository::boxed(pool),
            ),
            events,
            tasks,
            parent,
            partner,
        }
    }

    fn task(title: &str, assigned_to: i64, due: Option<DateTime<Utc>>, priority: i64) -> CreateTaskInput {
        CreateTaskInput {
            title: title.to_string(),
            assigned_to: Some(assigned_to),
            due_date: due,
            priority: Some(priority),
            ..Default::default()
        }
    }

    /// Noon today in local time, so day-relative fixtures stay inside the day
    fn local_noon_today() -> DateTime<Utc> {
        let (start, _) = local_day_bounds(Local::now().date_naive());
        start + Duration::hours(12)
    }

    #[test]
    fn test_levels() {
        assert_eq!(personal_workload_level(10), "heavy");
        assert_eq!(personal_workload_level(6), "moderate");
        assert_eq!(personal_workload_level(5), "light");
        assert_eq!(family_workload_level(8), "heavy");
        assert_eq!(family_workload_level(4), "moderate");
        assert_eq!(availability(2), "available");
        assert_eq!(availability(5), "busy");
        assert_eq!(availability(6), "overloaded");
        assert_eq!(completion_insight(40), completion_insight(59));
    }

    #[tokio::test]
    async fn test_summary_counts_and_reminders() {
        let f = setup().await;
        let noon = local_noon_today();
        let mut family = event_input("Family lunch", noon, 1);
        family.category = Some("family".to_string());
        family.preparation_list = Some(vec!["Bring salad".to_string()]);
        family.assigned_to = Some(f.parent);
        f.events.create(&family, Some(f.parent)).await.unwrap();
        let early = local_day_bounds(Local::now().date_naive() + Duration::days(1)).0 + Duration::hours(7);
        f.events.create(&event_input("Early swim", early, 1), Some(f.partner)).await.unwrap();

        f.tasks
            .create(&task("Pay rent", f.parent, Some(noon - Duration::days(2)), 1), Some(f.parent))
            .await
            .unwrap();
        f.tasks
            .create(&task("Buy milk", f.partner, Some(noon), 3), Some(f.parent))
            .await
            .unwrap();

        let summary = f.service.summary().await.unwrap();
        assert_eq!(summary.todays_events.total, 1);
        assert_eq!(summary.todays_events.family, 1);
        assert_eq!(summary.todays_events.needing_prep, 1);
        assert_eq!(summary.tomorrow_events.total, 1);
        assert_eq!(summary.tomorrow_events.early, 1);
        assert_eq!(summary.tasks.active, 2);
        assert_eq!(summary.tasks.overdue, 1);
        assert_eq!(summary.tasks.due_today, 1);
        assert_eq!(summary.tasks.high_priority, 1);
        assert_eq!(summary.conflicts.active, 0);
        assert_eq!(summary.focus, "1 task overdue - need immediate attention");
        assert_eq!(summary.insights.len(), 2);
        assert_eq!(
            summary.key_reminders,
            vec!["Complete: Buy milk".to_string(), "12:00: Family lunch".to_string()]
        );

        let parent = summary
            .family_activity
            .iter()
            .find(|m| m.user_id == f.parent)
            .unwrap();
        assert_eq!(parent.active_tasks, 1);
        assert_eq!(parent.today_events, 1);
    }

    #[tokio::test]
    async fn test_empty_summary_uses_default_focus() {
        let f = setup().await;
        let summary = f.service.summary().await.unwrap();
        assert!(summary.insights.is_empty());
        assert_eq!(summary.focus, DEFAULT_FOCUS);
        assert!(summary.key_reminders.is_empty());
    }

    #[tokio::test]
    async fn test_personal_dashboard() {
        let f = setup().await;
        let noon = local_noon_today();
        let done = f
            .tasks
            .create(&task("Done", f.parent, None, 3), Some(f.parent))
            .await
            .unwrap();
        f.tasks
            .update(
                done.id,
                &crate::models::UpdateTaskInput {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        f.tasks
            .create(&task("Late", f.parent, Some(noon - Duration::days(1)), 2), Some(f.parent))
            .await
            .unwrap();
        f.tasks
            .create(&task("Someone else's", f.partner, None, 5), Some(f.partner))
            .await
            .unwrap();

        let dashboard = f.service.personal(f.parent).await.unwrap();
        assert_eq!(dashboard.statistics.total_tasks, 2);
        assert_eq!(dashboard.statistics.completed_tasks, 1);
        assert_eq!(dashboard.statistics.overdue_tasks, 1);
        assert_eq!(dashboard.statistics.completion_rate, 50);
        // 1 pending + 0 events + 2 * 1 overdue
        assert_eq!(dashboard.statistics.workload_score, 3);
        assert_eq!(dashboard.statistics.workload_level, "light");
        assert_eq!(
            dashboard.priority_breakdown,
            PriorityBreakdown {
                high: 1,
                medium: 0,
                low: 0
            }
        );
        assert_eq!(dashboard.insights.len(), 2);
        assert_eq!(
            dashboard.recommendations,
            vec![
                "Focus on completing overdue tasks first".to_string(),
                "Prioritize high-importance tasks".to_string()
            ]
        );
        assert_eq!(dashboard.recent_tasks[0].title, "Late");

        assert!(matches!(
            f.service.personal(999).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_family_workload_balance() {
        let f = setup().await;
        let noon = local_noon_today();
        for i in 0..5 {
            f.tasks
                .create(&task(&format!("Chore {}", i), f.parent, None, 4), Some(f.parent))
                .await
                .unwrap();
        }
        f.tasks
            .create(&task("Late", f.parent, Some(noon - Duration::days(1)), 1), Some(f.parent))
            .await
            .unwrap();

        let workload = f.service.family_workload().await.unwrap();
        assert_eq!(workload.members.len(), 2);
        let heaviest = &workload.members[0];
        assert_eq!(heaviest.id, f.parent);
        // 6 active + 2 * 1 overdue
        assert_eq!(heaviest.workload_score, 8);
        assert_eq!(heaviest.workload_level, "heavy");
        assert_eq!(heaviest.availability_status, "overloaded");
        assert!(heaviest.needs_attention);
        assert_eq!(heaviest.high_priority_tasks, 1);

        assert!(!workload.balance.is_balanced);
        assert_eq!(workload.balance.average_workload, 4.0);
        assert_eq!(
            workload.balance.recommendations,
            vec![
                "Consider redistributing tasks from parent Example to balance workload".to_string(),
                "1 family member may be overloaded".to_string()
            ]
        );
        assert_eq!(workload.summary.total_active_tasks, 6);
        assert_eq!(workload.summary.members_needing_attention, 1);
    }
}
