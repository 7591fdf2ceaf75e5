//! Database migrations module
//!
//! All migrations are embedded directly in Rust code as SQL strings so the
//! server ships as a single binary. Each migration is applied once and recorded
//! in the `_migrations` table.
//!
//! JSON-valued columns are plain TEXT; they are parsed by the repositories.
//! Statements are split on `;`, so migration SQL must not contain semicolons
//! inside string literals.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::DynDatabasePool;

/// A versioned schema migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                full_name VARCHAR(255) NOT NULL DEFAULT '',
                telegram_id VARCHAR(32),
                telegram_chat_id VARCHAR(32),
                telegram_settings TEXT NOT NULL DEFAULT '{"notifications_enabled":true,"reminder_minutes":30}',
                preferences TEXT NOT NULL DEFAULT '{}',
                google_calendar_id VARCHAR(255),
                google_tokens TEXT NOT NULL DEFAULT '{}',
                last_sync_time TIMESTAMP,
                sync_enabled BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_telegram_id ON users(telegram_id);
            CREATE INDEX IF NOT EXISTS idx_users_telegram_chat_id ON users(telegram_chat_id);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_family_members",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS family_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                type VARCHAR(10) NOT NULL DEFAULT 'parent' CHECK (type IN ('parent', 'child', 'pet')),
                birth_date DATE,
                age INTEGER,
                avatar TEXT,
                color VARCHAR(16) NOT NULL DEFAULT '#3B82F6',
                dietary_preferences TEXT NOT NULL DEFAULT '{}',
                health_goals TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_events",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                google_event_id VARCHAR(255) UNIQUE,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                start_time TIMESTAMP NOT NULL,
                end_time TIMESTAMP NOT NULL,
                location TEXT,
                calendar_id VARCHAR(255),
                event_type VARCHAR(50),
                category VARCHAR(50) NOT NULL DEFAULT 'personal',
                priority INTEGER NOT NULL DEFAULT 3 CHECK (priority BETWEEN 1 AND 5),
                preparation_list TEXT NOT NULL DEFAULT '[]',
                resources TEXT NOT NULL DEFAULT '{}',
                notes TEXT,
                created_by INTEGER,
                assigned_to INTEGER,
                backup_assignee INTEGER,
                assignment_status VARCHAR(20) NOT NULL DEFAULT 'pending' CHECK (assignment_status IN ('pending', 'claimed', 'completed')),
                handoff_history TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (assigned_to) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (backup_assignee) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time);
            CREATE INDEX IF NOT EXISTS idx_events_assigned_to ON events(assigned_to);
        "#,
    },
    Migration {
        version: 5,
        name: "create_tasks",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                due_date TIMESTAMP,
                assigned_to INTEGER,
                family_member_id INTEGER,
                category VARCHAR(50),
                priority INTEGER NOT NULL DEFAULT 3 CHECK (priority BETWEEN 1 AND 5),
                status VARCHAR(20) NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'in_progress', 'completed')),
                checklist TEXT NOT NULL DEFAULT '[]',
                parent_event_id INTEGER,
                completed_at TIMESTAMP,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (assigned_to) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (family_member_id) REFERENCES family_members(id) ON DELETE SET NULL,
                FOREIGN KEY (parent_event_id) REFERENCES events(id) ON DELETE SET NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date);
            CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks(assigned_to);
        "#,
    },
    Migration {
        version: 6,
        name: "create_meal_plans",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS meal_plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date DATE NOT NULL,
                meal_type VARCHAR(10) NOT NULL CHECK (meal_type IN ('breakfast', 'lunch', 'dinner', 'snack')),
                title VARCHAR(255) NOT NULL,
                recipe_url TEXT,
                ingredients TEXT NOT NULL DEFAULT '[]',
                nutrition_info TEXT NOT NULL DEFAULT '{}',
                portions TEXT NOT NULL DEFAULT '{}',
                prep_time INTEGER,
                assigned_cook INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (assigned_cook) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_meal_plans_date ON meal_plans(date);
        "#,
    },
    Migration {
        version: 7,
        name: "create_meal_learning",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS meal_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                meal_plan_id INTEGER NOT NULL,
                date_served DATE NOT NULL,
                actually_eaten BOOLEAN NOT NULL DEFAULT 1,
                attendance TEXT NOT NULL DEFAULT '{}',
                rating INTEGER CHECK (rating BETWEEN 1 AND 5),
                prep_time_actual INTEGER,
                leftovers BOOLEAN NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (meal_plan_id) REFERENCES meal_plans(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS meal_feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                meal_plan_id INTEGER NOT NULL,
                family_member_id INTEGER NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                liked_ingredients TEXT NOT NULL DEFAULT '[]',
                disliked_ingredients TEXT NOT NULL DEFAULT '[]',
                comments TEXT,
                would_repeat BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (meal_plan_id) REFERENCES meal_plans(id) ON DELETE CASCADE,
                FOREIGN KEY (family_member_id) REFERENCES family_members(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS family_meal_preferences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                family_member_id INTEGER NOT NULL,
                ingredient VARCHAR(100) NOT NULL,
                preference_score INTEGER NOT NULL DEFAULT 0 CHECK (preference_score BETWEEN -100 AND 100),
                occurrence_count INTEGER NOT NULL DEFAULT 1,
                last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (family_member_id, ingredient),
                FOREIGN KEY (family_member_id) REFERENCES family_members(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS meal_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern_type VARCHAR(20) NOT NULL CHECK (pattern_type IN ('weekly', 'seasonal', 'event-based', 'ingredient-combo', 'meal-timing')),
                pattern_data TEXT NOT NULL,
                confidence_score REAL NOT NULL DEFAULT 0 CHECK (confidence_score BETWEEN 0 AND 1),
                observation_count INTEGER NOT NULL DEFAULT 1,
                last_observed TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_meal_history_date ON meal_history(date_served);
            CREATE INDEX IF NOT EXISTS idx_meal_feedback_member ON meal_feedback(family_member_id);
            CREATE INDEX IF NOT EXISTS idx_meal_patterns_type ON meal_patterns(pattern_type);
        "#,
    },
    Migration {
        version: 8,
        name: "create_checklists",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS checklist_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                category VARCHAR(50) NOT NULL,
                description TEXT,
                items TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS checklist_instances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id INTEGER,
                event_id INTEGER,
                title VARCHAR(255) NOT NULL,
                items TEXT NOT NULL DEFAULT '[]',
                completion_percentage REAL NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'archived')),
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP,
                FOREIGN KEY (template_id) REFERENCES checklist_templates(id) ON DELETE SET NULL,
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE SET NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checklist_instances_status ON checklist_instances(status);
        "#,
    },
    Migration {
        version: 9,
        name: "create_family_notes",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS family_notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                priority VARCHAR(10) NOT NULL DEFAULT 'normal' CHECK (priority IN ('low', 'normal', 'high', 'urgent')),
                category VARCHAR(50) NOT NULL DEFAULT 'general',
                tags TEXT NOT NULL DEFAULT '[]',
                visible_to TEXT NOT NULL DEFAULT '[]',
                expires_at TIMESTAMP,
                status VARCHAR(10) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'archived', 'deleted')),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_family_notes_status ON family_notes(status);
        "#,
    },
    Migration {
        version: 10,
        name: "create_family_addresses",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS family_addresses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                label VARCHAR(100) NOT NULL,
                address TEXT NOT NULL,
                type VARCHAR(10) NOT NULL DEFAULT 'other' CHECK (type IN ('home', 'work', 'school', 'other')),
                is_primary BOOLEAN NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, label),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 11,
        name: "create_notifications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type VARCHAR(50) NOT NULL,
                title VARCHAR(255) NOT NULL,
                message TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                sent_via VARCHAR(100),
                sent_at TIMESTAMP,
                read_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS notification_preferences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                channel_settings TEXT NOT NULL,
                time_preferences TEXT NOT NULL,
                priority_thresholds TEXT NOT NULL,
                quiet_hours TEXT NOT NULL,
                notification_types TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS push_subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                subscription_data TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                user_agent TEXT,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, endpoint),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
        "#,
    },
    Migration {
        version: 12,
        name: "create_timeline_learning",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS timeline_usage_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                event_id INTEGER,
                event_type VARCHAR(50),
                event_pattern VARCHAR(100),
                recurring_event_id VARCHAR(255),
                task_id VARCHAR(100) NOT NULL,
                task_text TEXT NOT NULL,
                task_category VARCHAR(50) NOT NULL DEFAULT 'preparation',
                original_time_offset INTEGER NOT NULL DEFAULT 0,
                actual_time_offset INTEGER,
                was_completed BOOLEAN NOT NULL DEFAULT 0,
                completion_time TIMESTAMP,
                was_skipped BOOLEAN NOT NULL DEFAULT 0,
                was_added_custom BOOLEAN NOT NULL DEFAULT 0,
                time_adjustment_minutes INTEGER NOT NULL DEFAULT 0,
                difficulty_rating INTEGER CHECK (difficulty_rating BETWEEN 1 AND 5),
                usefulness_rating INTEGER CHECK (usefulness_rating BETWEEN 1 AND 5),
                notes TEXT,
                day_of_week INTEGER NOT NULL,
                time_of_day VARCHAR(10) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS timeline_suggestions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                suggestion_type VARCHAR(30) NOT NULL CHECK (suggestion_type IN ('add_frequent_task', 'adjust_timing', 'remove_unused_task', 'template_improvement', 'seasonal_adjustment', 'recurring_pattern')),
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                suggestion_data TEXT NOT NULL DEFAULT '{}',
                confidence_score REAL NOT NULL DEFAULT 0,
                priority VARCHAR(10) NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high')),
                status VARCHAR(25) NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'shown', 'accepted', 'dismissed', 'permanently_dismissed')),
                event_pattern VARCHAR(100),
                shown_count INTEGER NOT NULL DEFAULT 0,
                responded_at TIMESTAMP,
                expires_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS user_suggestion_preferences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                suggestion_frequency VARCHAR(10) NOT NULL DEFAULT 'normal' CHECK (suggestion_frequency IN ('minimal', 'normal', 'frequent')),
                auto_apply_low_risk BOOLEAN NOT NULL DEFAULT 0,
                show_timing_suggestions BOOLEAN NOT NULL DEFAULT 1,
                show_task_suggestions BOOLEAN NOT NULL DEFAULT 1,
                show_template_suggestions BOOLEAN NOT NULL DEFAULT 1,
                dismissed_suggestion_types TEXT NOT NULL DEFAULT '[]',
                learning_mode BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS timeline_pattern_insights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                pattern_type VARCHAR(50) NOT NULL,
                pattern_name VARCHAR(255) NOT NULL,
                pattern_description TEXT NOT NULL,
                pattern_data TEXT NOT NULL DEFAULT '{}',
                confidence_score REAL NOT NULL DEFAULT 0,
                observation_count INTEGER NOT NULL DEFAULT 0,
                event_pattern VARCHAR(100),
                pattern_strength VARCHAR(10) NOT NULL DEFAULT 'medium' CHECK (pattern_strength IN ('weak', 'medium', 'strong')),
                first_observed TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_observed TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, pattern_name),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_usage_patterns_user ON timeline_usage_patterns(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_timeline_suggestions_user ON timeline_suggestions(user_id, status);
        "#,
    },
    Migration {
        version: 13,
        name: "add_suggestion_pattern_name",
        up_sqlite: r#"
            ALTER TABLE timeline_suggestions ADD COLUMN pattern_name VARCHAR(255);
            CREATE INDEX IF NOT EXISTS idx_timeline_suggestions_pattern ON timeline_suggestions(user_id, suggestion_type, pattern_name);
        "#,
    },
    Migration {
        version: 14,
        name: "create_conflicts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type VARCHAR(30) NOT NULL CHECK (type IN ('time_overlap', 'location_travel', 'resource_conflict', 'unassigned_critical')),
                severity VARCHAR(10) NOT NULL CHECK (severity IN ('low', 'medium', 'high', 'critical')),
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                affected_events TEXT NOT NULL DEFAULT '[]',
                affected_users TEXT NOT NULL DEFAULT '[]',
                affected_resources TEXT NOT NULL DEFAULT '[]',
                status VARCHAR(15) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'resolved', 'ignored', 'acknowledged')),
                resolution_suggestions TEXT NOT NULL DEFAULT '[]',
                resolution_actions TEXT NOT NULL DEFAULT '[]',
                resolution_data TEXT NOT NULL DEFAULT '{}',
                auto_generated BOOLEAN NOT NULL DEFAULT 1,
                detected_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                resolved_at TIMESTAMP,
                resolved_by INTEGER,
                metadata TEXT NOT NULL DEFAULT '{}',
                FOREIGN KEY (resolved_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts(status, detected_at);
            CREATE INDEX IF NOT EXISTS idx_conflicts_type_events ON conflicts(type, affected_events);
        "#,
    },
    Migration {
        version: 15,
        name: "add_event_recurrence",
        up_sqlite: r#"
            ALTER TABLE events ADD COLUMN is_recurring BOOLEAN NOT NULL DEFAULT 0;
            ALTER TABLE events ADD COLUMN recurrence_type VARCHAR(10) CHECK (recurrence_type IN ('daily', 'weekly', 'weekdays', 'custom'));
            ALTER TABLE events ADD COLUMN recurrence_days TEXT NOT NULL DEFAULT '[]';
            ALTER TABLE events ADD COLUMN recurrence_end_date DATE;
            ALTER TABLE events ADD COLUMN parent_recurring_id INTEGER REFERENCES events(id) ON DELETE SET NULL;
            ALTER TABLE events ADD COLUMN recurrence_instance_date DATE;
            CREATE INDEX IF NOT EXISTS idx_events_is_recurring ON events(is_recurring);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_recurrence_instance ON events(parent_recurring_id, recurrence_instance_date);
        "#,
    },
    Migration {
        version: 16,
        name: "create_preparation_timelines",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS preparation_timelines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL UNIQUE,
                timeline_data TEXT NOT NULL DEFAULT '[]',
                event_pattern VARCHAR(100),
                confidence INTEGER NOT NULL DEFAULT 100,
                completed_tasks TEXT NOT NULL DEFAULT '[]',
                template_id INTEGER,
                is_custom BOOLEAN NOT NULL DEFAULT 0,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE,
                FOREIGN KEY (template_id) REFERENCES checklist_templates(id) ON DELETE SET NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_preparation_timelines_template ON preparation_timelines(template_id);
        "#,
    },
];

/// Run all pending migrations
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool.sqlite())
        .await?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }

    Ok(records)
}

/// Apply a single migration inside a transaction
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.sqlite().begin().await?;

    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
