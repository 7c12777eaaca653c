//! # PgStore
//!
//! Assignment storage backed by two PostgreSQL tables, see `migrations/`.
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use tracing::error;

use super::{fill_counts, AssignmentStore, ExclusiveTransaction};
use crate::error::{StoreError, StoreResult};
use crate::{
    Assignment, NewAssignment, PoolConfig, Settings, GROUPS_SETTING_KEY, TOTAL_SETTING_KEY,
};

/// Classify a sqlx error by what a caller can do about it.
fn classify(command: &str, error: sqlx::Error) -> StoreError {
    if is_conflict_error(&error) {
        return StoreError::conflict(command, error);
    }

    error!("{} query failed with: {}", command, error);
    StoreError::unavailable(command, error)
}

/// Errors after which re-running the whole assignment from the top is safe and likely to succeed.
fn is_conflict_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => match db_error.code() {
            // See: PostgreSQL SQLSTATE appendix
            // 55P03  lock_not_available (lock_timeout)
            // 40001  serialization_failure
            // 40P01  deadlock_detected
            // 23505  unique_violation, the token was inserted by someone else
            Some(code) => matches!(code.as_ref(), "55P03" | "40001" | "40P01" | "23505"),
            None => false,
        },
        _ => false,
    }
}

async fn read_settings<'c, E>(executor: E) -> StoreResult<Settings>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
SELECT key, value
FROM assignment_settings
WHERE key IN ($1, $2)
        "#,
    )
    .bind(TOTAL_SETTING_KEY)
    .bind(GROUPS_SETTING_KEY)
    .fetch_all(executor)
    .await
    .map_err(|error| classify("SELECT", error))?;

    let mut settings = Settings::new(0, 0);
    for (key, value) in rows {
        match key.as_str() {
            TOTAL_SETTING_KEY => settings.total = value,
            GROUPS_SETTING_KEY => settings.group_count = value,
            _ => {}
        }
    }
    Ok(settings)
}

async fn read_group_counts<'c, E>(executor: E, group_count: usize) -> StoreResult<Vec<i64>>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let rows: Vec<(i32, i64)> = sqlx::query_as(
        r#"
SELECT group_number, COUNT(*)
FROM group_assignments
GROUP BY group_number
        "#,
    )
    .fetch_all(executor)
    .await
    .map_err(|error| classify("SELECT", error))?;

    Ok(fill_counts(rows, group_count))
}

pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Connect a new pool. `lock_timeout` bounds how long an assignment waits for the writer lock.
    pub async fn new(config: &PoolConfig, lock_timeout: Duration) -> StoreResult<Self> {
        let pool = config
            .connect()
            .await
            .map_err(|error| StoreError::unavailable("CONNECT", error))?;

        Ok(Self::from_pool(pool, lock_timeout))
    }

    #[doc(hidden)] // Mostly for testing, but safe to expose
    pub fn from_pool(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::unavailable("MIGRATE", error))
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ExclusiveTransaction for PgTransaction {
    async fn find_group(&mut self, token: &str) -> StoreResult<Option<i32>> {
        sqlx::query_scalar("SELECT group_number FROM group_assignments WHERE token = $1")
            .bind(token)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|error| classify("SELECT", error))
    }

    async fn settings(&mut self) -> StoreResult<Settings> {
        read_settings(&mut *self.tx).await
    }

    async fn group_counts(&mut self, group_count: usize) -> StoreResult<Vec<i64>> {
        read_group_counts(&mut *self.tx, group_count).await
    }

    async fn insert(&mut self, assignment: NewAssignment) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO group_assignments
    (token, group_number, created_at)
VALUES
    ($1, $2, $3)
            "#,
        )
        .bind(&assignment.token)
        .bind(assignment.group)
        .bind(assignment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|error| classify("INSERT", error))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|error| classify("COMMIT", error))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|error| classify("ROLLBACK", error))
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn begin_exclusive(&self) -> StoreResult<Box<dyn ExclusiveTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| classify("BEGIN", error))?;

        // SET commands don't accept bind parameters. The value only lives until the end of this
        // transaction.
        let lock_ms = self.lock_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = '{lock_ms}ms'"))
            .execute(&mut *tx)
            .await
            .map_err(|error| classify("SET", error))?;

        // EXCLUSIVE conflicts with every writer and with itself, but not with plain SELECTs, so
        // status reads keep flowing while a decision is being made.
        sqlx::query("LOCK TABLE group_assignments IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|error| classify("LOCK", error))?;

        Ok(Box::new(PgTransaction { tx }))
    }

    async fn settings(&self) -> StoreResult<Settings> {
        read_settings(&self.pool).await
    }

    async fn update_settings(&self, settings: Settings) -> StoreResult<()> {
        // One statement, so both values change together.
        sqlx::query(
            r#"
INSERT INTO assignment_settings
    (key, value)
VALUES
    ($1, $2), ($3, $4)
ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(TOTAL_SETTING_KEY)
        .bind(settings.total)
        .bind(GROUPS_SETTING_KEY)
        .bind(settings.group_count)
        .execute(&self.pool)
        .await
        .map_err(|error| classify("UPSERT", error))?;

        Ok(())
    }

    async fn seed_settings(&self, defaults: Settings) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO assignment_settings
    (key, value)
VALUES
    ($1, $2), ($3, $4)
ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(TOTAL_SETTING_KEY)
        .bind(defaults.total)
        .bind(GROUPS_SETTING_KEY)
        .bind(defaults.group_count)
        .execute(&self.pool)
        .await
        .map_err(|error| classify("INSERT", error))?;

        Ok(())
    }

    async fn group_counts(&self, group_count: usize) -> StoreResult<Vec<i64>> {
        read_group_counts(&self.pool, group_count).await
    }

    async fn assigned_total(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM group_assignments")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| classify("SELECT", error))
    }

    async fn find_assignment(&self, token: &str) -> StoreResult<Option<Assignment>> {
        sqlx::query_as(
            r#"
SELECT token, group_number, created_at
FROM group_assignments
WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| classify("SELECT", error))
    }

    async fn reset_assignments(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM group_assignments")
            .execute(&self.pool)
            .await
            .map_err(|error| classify("DELETE", error))?;

        Ok(result.rows_affected())
    }
}
