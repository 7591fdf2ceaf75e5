//! Data models
//!
//! Database rows, request inputs and the small enums stored as TEXT columns.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Declare a fieldless enum stored as a lowercase string column.
///
/// Generates `as_str`, `Display`, `FromStr` (case-insensitive) and serde
/// support using the given wire names. Exactly one variant carries `#[default]`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($label:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", $label, s)),
                }
            }
        }
    };
}

mod address;
mod checklist;
mod conflict;
mod event;
mod family;
mod family_note;
mod meal;
mod notification;
mod preparation;
mod session;
mod task;
mod timeline;
mod user;

pub use address::{Address, AddressType, CreateAddressInput, UpdateAddressInput};
pub use checklist::{
    ChecklistInstance, ChecklistItem, ChecklistStatus, ChecklistTemplate,
    CreateChecklistInstanceInput, CreateChecklistTemplateInput,
};
pub use conflict::{
    Conflict, ConflictResolution, ConflictSeverity, ConflictStats, ConflictStatus, ConflictType,
    DetectedConflict, ResolutionAdvice, SeverityBreakdown,
};
pub use event::{
    AssignmentStatus, CreateEventInput, CreateRecurringEventInput, Event, EventRange,
    HandoffRecord, RecurrenceType, UpdateEventInput, UpdateRecurringEventInput,
};
pub use family::{CreateFamilyMemberInput, FamilyMember, MemberType, UpdateFamilyMemberInput};
pub use family_note::{
    CreateFamilyNoteInput, FamilyNote, NotePriority, NoteStats, NoteStatus, UpdateFamilyNoteInput,
};
pub use meal::{
    CreateMealPlanInput, Ingredient, IngredientPreference, IngredientSummary, MealCompletionInput,
    MealFeedbackInput, MealHistoryEntry, MealHistoryFilter, MealPattern, MealPatternType, MealPlan,
    MealType, MealTypeStat, UpdateMealPlanInput,
};
pub use notification::{
    Notification, NotificationPreferences, NotificationPriority, NotificationStats,
    PushSubscription, UpdateNotificationPreferencesInput,
};
pub use preparation::{PreparationTimeline, SimilarEventTimeline};
pub use session::Session;
pub use task::{CreateTaskInput, Task, TaskFilter, TaskStatus, UpdateTaskInput};
pub use timeline::{
    InsightType, PatternInsight, PatternStrength, PatternTypeStat, SuggestionCounts,
    SuggestionFrequency, SuggestionPreferences, SuggestionPriority, SuggestionStatus,
    SuggestionType, TimelineStats, TimelineSuggestion, UpdateSuggestionPreferencesInput,
    UsageRecordInput, UsageStats,
};
pub use user::{CreateUserInput, GoogleTokens, TelegramSettings, User};

/// Interpret a wall-clock time in the server's local time zone.
///
/// Times skipped by a DST jump fall back to reading the value as UTC.
pub fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// UTC bounds `[start, end)` of a calendar day in the server's local time zone.
pub fn local_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
    (
        local_to_utc(date.and_time(NaiveTime::MIN)),
        local_to_utc(next.and_time(NaiveTime::MIN)),
    )
}

/// Parse a JSON TEXT column, falling back to the type's default on malformed data.
pub(crate) fn parse_json_column<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_local_day_bounds_span_one_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let (start, end) = local_day_bounds(date);
        assert_eq!((end - start).num_hours(), 24);
        assert_eq!(start.with_timezone(&Local).date_naive(), date);
    }

    #[test]
    fn test_string_enum_roundtrip() {
        assert_eq!(MealType::from_str("Dinner").unwrap(), MealType::Dinner);
        assert_eq!(MealPatternType::IngredientCombo.as_str(), "ingredient-combo");
        assert_eq!(
            MealPatternType::from_str("meal-timing").unwrap(),
            MealPatternType::MealTiming
        );
        assert!(TaskStatus::from_str("done").is_err());
        assert_eq!(
            serde_json::to_string(&SuggestionStatus::PermanentlyDismissed).unwrap(),
            "\"permanently_dismissed\""
        );
    }

    #[test]
    fn test_parse_json_column_falls_back() {
        let parsed: Vec<String> = parse_json_column("not json");
        assert!(parsed.is_empty());
        let parsed: Vec<String> = parse_json_column(r#"["a","b"]"#);
        assert_eq!(parsed, vec!["a", "b"]);
    }
}
