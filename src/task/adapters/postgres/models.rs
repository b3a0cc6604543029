//! Diesel row models for task persistence.

use super::schema::{environments, tasks, templates};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row for template records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = templates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TemplateRow {
    /// Template identifier.
    pub id: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Status tag.
    pub status: String,
    /// Hosting provider tag.
    pub vcs_provider: String,
    /// Repository id or path.
    pub repository: String,
    /// Default reference.
    pub reference: String,
    /// Clone address.
    pub repo_addr: String,
    /// Execution defaults payload.
    pub defaults: Value,
    /// Mirror scan flag.
    pub policy_enabled: bool,
}

/// Row for environment records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = environments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct EnvironmentRow {
    /// Environment identifier.
    pub id: uuid::Uuid,
    /// Template reference.
    pub template_id: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Archived flag.
    pub archived: bool,
    /// Lock flag.
    pub deploying: bool,
    /// Most recent task.
    pub last_task_id: Option<uuid::Uuid>,
    /// Auto-approval flag.
    pub auto_approval: bool,
    /// Pinned runner.
    pub runner_id: Option<String>,
    /// Step timeout override.
    pub step_timeout_secs: Option<i64>,
}

/// Row for task records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task type tag.
    pub task_type: String,
    /// Template reference.
    pub template_id: uuid::Uuid,
    /// Environment reference.
    pub environment_id: Option<uuid::Uuid>,
    /// Mirrored deploy task.
    pub mirror_of: Option<uuid::Uuid>,
    /// Steps payload.
    pub steps: Value,
    /// Status tag.
    pub status: String,
    /// Creator.
    pub creator: uuid::Uuid,
    /// Assigned runner.
    pub runner_id: Option<String>,
    /// Workspace inputs payload.
    pub snapshot: Value,
    /// Per-step timeout.
    pub step_timeout_secs: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Mutable columns written while a task executes.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskProgressRow {
    /// Steps payload.
    pub steps: Value,
    /// Status tag.
    pub status: String,
    /// Assigned runner.
    pub runner_id: Option<String>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
