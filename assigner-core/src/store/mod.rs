//! # Storage
//!
//! The engine only needs a handful of operations from durable storage: a settings record, a
//! token-keyed assignment table, and an exclusive transaction that serializes assignment
//! decisions. `PgStore` provides them on top of PostgreSQL, `MemoryStore` keeps everything in
//! process.
use async_trait::async_trait;

use crate::error::StoreResult;
use crate::{Assignment, NewAssignment, Settings};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// A write transaction holding the store's single writer lock.
///
/// Dropping a transaction without calling `commit` must roll it back.
#[async_trait]
pub trait ExclusiveTransaction: Send {
    /// Group number stored for `token`, if it was already assigned.
    async fn find_group(&mut self, token: &str) -> StoreResult<Option<i32>>;

    async fn settings(&mut self) -> StoreResult<Settings>;

    /// Committed assignments per group for groups `1..=group_count`.
    async fn group_counts(&mut self, group_count: usize) -> StoreResult<Vec<i64>>;

    /// Insert a new row. Must fail if `token` already exists.
    async fn insert(&mut self, assignment: NewAssignment) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Open a transaction that excludes every other writer until it commits or rolls back.
    /// Waiting for the lock is bounded, running out of time is a `StoreError::Conflict`.
    async fn begin_exclusive(&self) -> StoreResult<Box<dyn ExclusiveTransaction>>;

    async fn settings(&self) -> StoreResult<Settings>;

    /// Overwrite both settings atomically.
    async fn update_settings(&self, settings: Settings) -> StoreResult<()>;

    /// Write each setting only if it has no value yet.
    async fn seed_settings(&self, defaults: Settings) -> StoreResult<()>;

    /// Lock-free read of committed counts, may be slightly stale.
    async fn group_counts(&self, group_count: usize) -> StoreResult<Vec<i64>>;

    async fn assigned_total(&self) -> StoreResult<i64>;

    async fn find_assignment(&self, token: &str) -> StoreResult<Option<Assignment>>;

    /// Delete every assignment row and return how many were deleted.
    async fn reset_assignments(&self) -> StoreResult<u64>;
}

/// Turn `(group_number, count)` rows into a dense vector for groups `1..=group_count`.
/// Groups outside the range belong to an older, larger group count and are skipped.
pub fn fill_counts(
    rows: impl IntoIterator<Item = (i32, i64)>,
    group_count: usize,
) -> Vec<i64> {
    let mut counts = vec![0; group_count];
    for (group, count) in rows {
        let Ok(group) = usize::try_from(group) else {
            continue;
        };
        if (1..=group_count).contains(&group) {
            counts[group - 1] += count;
        }
    }
    counts
}
