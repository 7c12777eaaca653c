use std::sync::Arc;
use std::time::Duration;

use assigner_core::store::{AssignmentStore, ExclusiveTransaction};
use assigner_core::{
    Assigner, Assignment, MemoryStore, NewAssignment, Settings, StoreError,
};
use async_trait::async_trait;
use uuid::Uuid;

type StoreResult<T> = Result<T, StoreError>;

#[allow(dead_code)]
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(dead_code)]
pub fn memory_assigner(settings: Settings) -> (Arc<MemoryStore>, Arc<Assigner>) {
    let store = Arc::new(MemoryStore::with_settings(settings, LOCK_TIMEOUT));
    let assigner = Arc::new(Assigner::new(store.clone()));
    (store, assigner)
}

#[allow(dead_code)]
pub fn random_token() -> String {
    Uuid::new_v4().to_string()
}

/// Sorted copy of the per-group counts, for comparing distributions whose order depends on
/// random tie breaks.
#[allow(dead_code)]
pub fn sorted(mut counts: Vec<i64>) -> Vec<i64> {
    counts.sort_unstable();
    counts
}

/// Wraps a `MemoryStore` and fails every insert, to exercise the rollback path.
#[allow(dead_code)]
pub struct FailingInsertStore {
    pub inner: MemoryStore,
}

struct FailingInsertTransaction {
    inner: Box<dyn ExclusiveTransaction>,
}

#[async_trait]
impl ExclusiveTransaction for FailingInsertTransaction {
    async fn find_group(&mut self, token: &str) -> StoreResult<Option<i32>> {
        self.inner.find_group(token).await
    }

    async fn settings(&mut self) -> StoreResult<Settings> {
        self.inner.settings().await
    }

    async fn group_counts(&mut self, group_count: usize) -> StoreResult<Vec<i64>> {
        self.inner.group_counts(group_count).await
    }

    async fn insert(&mut self, assignment: NewAssignment) -> StoreResult<()> {
        // Let the row land in the transaction first, so a missing rollback would be visible.
        self.inner.insert(assignment).await?;
        Err(StoreError::unavailable("INSERT", "disk full"))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl AssignmentStore for FailingInsertStore {
    async fn begin_exclusive(&self) -> StoreResult<Box<dyn ExclusiveTransaction>> {
        let inner = self.inner.begin_exclusive().await?;
        Ok(Box::new(FailingInsertTransaction { inner }))
    }

    async fn settings(&self) -> StoreResult<Settings> {
        self.inner.settings().await
    }

    async fn update_settings(&self, settings: Settings) -> StoreResult<()> {
        self.inner.update_settings(settings).await
    }

    async fn seed_settings(&self, defaults: Settings) -> StoreResult<()> {
        self.inner.seed_settings(defaults).await
    }

    async fn group_counts(&self, group_count: usize) -> StoreResult<Vec<i64>> {
        self.inner.group_counts(group_count).await
    }

    async fn assigned_total(&self) -> StoreResult<i64> {
        self.inner.assigned_total().await
    }

    async fn find_assignment(&self, token: &str) -> StoreResult<Option<Assignment>> {
        self.inner.find_assignment(token).await
    }

    async fn reset_assignments(&self) -> StoreResult<u64> {
        self.inner.reset_assignments().await
    }
}
