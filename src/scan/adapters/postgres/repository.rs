//! `PostgreSQL` implementations of the policy catalog and result ports.

use super::{
    models::{PolicyResultRow, PolicyRow, PolicyVerdictRow},
    schema::{policies, policy_bindings, policy_results, policy_suppressions},
};
use crate::scan::{
    domain::{
        Policy, PolicyId, PolicyResult, PolicyResultId, PolicyResultStatus, ReconcileSummary,
        ResultOutcome, ResultUpdate, ScanTarget,
    },
    ports::{
        PolicyCatalog, PolicyCatalogError, PolicyResultError, PolicyResultRepository,
        PolicyResultResult,
    },
};
use crate::task::{adapters::postgres::TaskPgPool, domain::TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::{HashMap, HashSet};

/// `PostgreSQL`-backed policy catalog.
#[derive(Debug, Clone)]
pub struct PostgresPolicyCatalog {
    pool: TaskPgPool,
}

impl PostgresPolicyCatalog {
    /// Creates a catalog from a connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T, PolicyCatalogError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, PolicyCatalogError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(PolicyCatalogError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(PolicyCatalogError::persistence)?
    }
}

#[async_trait]
impl PolicyCatalog for PostgresPolicyCatalog {
    async fn policies_for(&self, target: ScanTarget) -> Result<Vec<Policy>, PolicyCatalogError> {
        self.run_blocking(move |connection| {
            let rows: Vec<PolicyRow> = policies::table
                .inner_join(policy_bindings::table)
                .filter(policy_bindings::target_kind.eq(target.kind()))
                .filter(policy_bindings::target_id.eq(target.id()))
                .order(policies::id.asc())
                .select(PolicyRow::as_select())
                .load(connection)
                .map_err(PolicyCatalogError::persistence)?;
            Ok(rows
                .into_iter()
                .map(|row| Policy {
                    id: PolicyId::new(row.id),
                    group_id: row.group_id,
                    name: row.name,
                })
                .collect())
        })
        .await
    }

    async fn suppressed_for(
        &self,
        target: ScanTarget,
    ) -> Result<HashSet<PolicyId>, PolicyCatalogError> {
        self.run_blocking(move |connection| {
            let ids: Vec<String> = policy_suppressions::table
                .filter(policy_suppressions::target_kind.eq(target.kind()))
                .filter(policy_suppressions::target_id.eq(target.id()))
                .select(policy_suppressions::policy_id)
                .load(connection)
                .map_err(PolicyCatalogError::persistence)?;
            Ok(ids.into_iter().map(PolicyId::new).collect())
        })
        .await
    }
}

/// `PostgreSQL`-backed policy result repository.
#[derive(Debug, Clone)]
pub struct PostgresPolicyResultRepository {
    pool: TaskPgPool,
}

/// Error carried out of a Diesel transaction closure.
enum TxError {
    Db(DieselError),
    Repository(PolicyResultError),
}

impl From<DieselError> for TxError {
    fn from(err: DieselError) -> Self {
        Self::Db(err)
    }
}

impl From<PolicyResultError> for TxError {
    fn from(err: PolicyResultError) -> Self {
        Self::Repository(err)
    }
}

fn from_tx(err: TxError) -> PolicyResultError {
    match err {
        TxError::Db(db) => PolicyResultError::persistence(db),
        TxError::Repository(repository) => repository,
    }
}

impl PostgresPolicyResultRepository {
    /// Creates a repository from a connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> PolicyResultResult<T>
    where
        F: FnOnce(&mut PgConnection) -> PolicyResultResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(PolicyResultError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(PolicyResultError::persistence)?
    }
}

#[async_trait]
impl PolicyResultRepository for PostgresPolicyResultRepository {
    async fn seed(&self, task_id: TaskId, rows: &[PolicyResult]) -> PolicyResultResult<()> {
        let rows = rows
            .iter()
            .map(result_to_row)
            .collect::<PolicyResultResult<Vec<_>>>()?;
        self.run_blocking(move |connection| {
            connection
                .transaction::<_, TxError, _>(|tx| {
                    let existing: i64 = policy_results::table
                        .filter(policy_results::task_id.eq(task_id.into_inner()))
                        .count()
                        .get_result(tx)?;
                    if existing > 0 {
                        return Err(TxError::Repository(PolicyResultError::AlreadySeeded(
                            task_id,
                        )));
                    }
                    diesel::insert_into(policy_results::table)
                        .values(&rows)
                        .execute(tx)
                        .map_err(|err| match err {
                            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                                TxError::Repository(PolicyResultError::AlreadySeeded(task_id))
                            }
                            other => TxError::Db(other),
                        })?;
                    Ok(())
                })
                .map_err(from_tx)
        })
        .await
    }

    async fn reconcile(
        &self,
        task_id: TaskId,
        updates: &[ResultUpdate],
        now: DateTime<Utc>,
    ) -> PolicyResultResult<ReconcileSummary> {
        let updates = updates.to_vec();
        self.run_blocking(move |connection| {
            connection
                .transaction::<_, TxError, _>(|tx| {
                    let statuses: HashMap<String, String> = policy_results::table
                        .filter(policy_results::task_id.eq(task_id.into_inner()))
                        .select((policy_results::policy_id, policy_results::status))
                        .load::<(String, String)>(tx)?
                        .into_iter()
                        .collect();
                    for update in &updates {
                        let Some(status) = statuses.get(update.policy_id.as_str()) else {
                            return Err(TxError::Repository(PolicyResultError::MissingResult {
                                task_id,
                                policy_id: update.policy_id.clone(),
                            }));
                        };
                        if status == PolicyResultStatus::Suppressed.as_str() {
                            continue;
                        }
                        let verdict = verdict_row(&update.outcome, now)?;
                        diesel::update(
                            policy_results::table
                                .filter(policy_results::task_id.eq(task_id.into_inner()))
                                .filter(policy_results::policy_id.eq(update.policy_id.as_str())),
                        )
                        .set(&verdict)
                        .execute(tx)?;
                    }
                    diesel::update(
                        policy_results::table
                            .filter(policy_results::task_id.eq(task_id.into_inner()))
                            .filter(
                                policy_results::status.eq(PolicyResultStatus::Pending.as_str()),
                            ),
                    )
                    .set((
                        policy_results::status.eq(PolicyResultStatus::Failed.as_str()),
                        policy_results::updated_at.eq(now),
                    ))
                    .execute(tx)?;
                    let rows = load_rows(tx, task_id)?;
                    Ok(ReconcileSummary::of(&rows))
                })
                .map_err(from_tx)
        })
        .await
    }

    async fn find_by_task(&self, task_id: TaskId) -> PolicyResultResult<Vec<PolicyResult>> {
        self.run_blocking(move |connection| {
            load_rows(connection, task_id).map_err(from_tx)
        })
        .await
    }
}

fn load_rows(connection: &mut PgConnection, task_id: TaskId) -> Result<Vec<PolicyResult>, TxError> {
    let rows: Vec<PolicyResultRow> = policy_results::table
        .filter(policy_results::task_id.eq(task_id.into_inner()))
        .order(policy_results::policy_id.asc())
        .select(PolicyResultRow::as_select())
        .load(connection)?;
    rows.into_iter()
        .map(|row| row_to_result(row).map_err(TxError::Repository))
        .collect()
}

fn verdict_row(outcome: &ResultOutcome, now: DateTime<Utc>) -> Result<PolicyVerdictRow, TxError> {
    Ok(match outcome {
        ResultOutcome::Violated(violation) => PolicyVerdictRow {
            status: PolicyResultStatus::Violated.as_str().to_owned(),
            violation: Some(
                serde_json::to_value(violation.as_ref())
                    .map_err(|err| TxError::Repository(PolicyResultError::persistence(err)))?,
            ),
            updated_at: now,
        },
        ResultOutcome::Passed => PolicyVerdictRow {
            status: PolicyResultStatus::Passed.as_str().to_owned(),
            violation: None,
            updated_at: now,
        },
    })
}

fn result_to_row(result: &PolicyResult) -> PolicyResultResult<PolicyResultRow> {
    let violation = result
        .violation
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(PolicyResultError::persistence)?;
    Ok(PolicyResultRow {
        id: result.id.into_inner(),
        task_id: result.task_id.into_inner(),
        policy_id: result.policy_id.as_str().to_owned(),
        policy_group_id: result.policy_group_id.clone(),
        status: result.status.as_str().to_owned(),
        violation,
        updated_at: result.updated_at,
    })
}

fn row_to_result(row: PolicyResultRow) -> PolicyResultResult<PolicyResult> {
    let status = PolicyResultStatus::try_from(row.status.as_str())
        .map_err(PolicyResultError::persistence)?;
    let violation = row
        .violation
        .map(serde_json::from_value)
        .transpose()
        .map_err(PolicyResultError::persistence)?;
    Ok(PolicyResult {
        id: PolicyResultId::from_uuid(row.id),
        task_id: TaskId::from_uuid(row.task_id),
        policy_id: PolicyId::new(row.policy_id),
        policy_group_id: row.policy_group_id,
        status,
        violation,
        updated_at: row.updated_at,
    })
}
