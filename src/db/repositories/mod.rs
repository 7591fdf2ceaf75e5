//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the rows of one aggregate.

pub mod address;
pub mod checklist;
pub mod conflict;
pub mod event;
pub mod family_member;
pub mod family_note;
pub mod meal;
pub mod meal_learning;
pub mod notification;
pub mod preparation;
pub mod session;
pub mod task;
pub mod timeline;
pub mod user;

pub use address::{AddressRepository, BatchOutcome, SqlxAddressRepository};
pub use checklist::{ChecklistRepository, SqlxChecklistRepository, TemplateOrder};
pub use conflict::{ConflictCounts, ConflictRepository, SqlxConflictRepository};
pub use event::{EventRepository, SqlxEventRepository};
pub use family_member::{FamilyMemberRepository, SqlxFamilyMemberRepository};
pub use family_note::{FamilyNoteRepository, NewFamilyNote, SqlxFamilyNoteRepository};
pub use meal::{MealPlanRepository, SqlxMealPlanRepository};
pub use meal_learning::{MealLearningRepository, SqlxMealLearningRepository};
pub use notification::{NewNotification, NotificationRepository, SqlxNotificationRepository};
pub use preparation::{PreparationTimelineRepository, SqlxPreparationTimelineRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use task::{SqlxTaskRepository, TaskRepository};
pub use timeline::{
    AddedTaskAggregate, DayOfWeekAggregate, NewInsight, NewSuggestion, SeasonalAggregate,
    SkippedTaskAggregate, SqlxTimelineRepository, TimelineRepository, TimingAggregate,
};
pub use user::{SqlxUserRepository, UserRepository};

/// Whether `err` was caused by a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
    })
}
