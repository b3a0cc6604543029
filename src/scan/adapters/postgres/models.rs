//! Diesel row models for policy persistence.

use super::schema::{policies, policy_results};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row for policy records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = policies)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PolicyRow {
    /// Policy identifier.
    pub id: String,
    /// Policy group.
    pub group_id: String,
    /// Display name.
    pub name: String,
}

/// Row for policy result records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = policy_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PolicyResultRow {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Scan task.
    pub task_id: uuid::Uuid,
    /// Evaluated policy.
    pub policy_id: String,
    /// Policy group.
    pub policy_group_id: String,
    /// Verdict tag.
    pub status: String,
    /// Violation detail.
    pub violation: Option<Value>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Verdict change applied during reconciliation.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = policy_results)]
#[diesel(treat_none_as_null = true)]
pub struct PolicyVerdictRow {
    /// Verdict tag.
    pub status: String,
    /// Violation detail.
    pub violation: Option<Value>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}
