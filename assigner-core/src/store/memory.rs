use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;

use super::{fill_counts, AssignmentStore, ExclusiveTransaction};
use crate::error::{StoreError, StoreResult};
use crate::{Assignment, NewAssignment, Settings};

#[derive(Debug, Default)]
struct MemoryState {
    total: Option<i64>,
    groups: Option<i64>,
    assignments: HashMap<String, Assignment>,
}

impl MemoryState {
    fn settings(&self) -> Settings {
        Settings::new(self.total.unwrap_or(0), self.groups.unwrap_or(0))
    }

    fn group_counts(&self, group_count: usize) -> Vec<i64> {
        let mut per_group: HashMap<i32, i64> = HashMap::new();
        for assignment in self.assignments.values() {
            *per_group.entry(assignment.group).or_default() += 1;
        }
        fill_counts(per_group, group_count)
    }
}

/// An in-process store. Nothing survives a restart.
///
/// Committed state sits behind a `RwLock` that is only ever held for the duration of a read or
/// a commit. Exclusive transactions additionally hold the writer mutex from begin to commit, so
/// decisions are serialized while plain reads keep going against the last committed state.
#[derive(Clone)]
pub struct MemoryStore {
    committed: Arc<RwLock<MemoryState>>,
    writer: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self::from_state(MemoryState::default(), lock_timeout)
    }

    pub fn with_settings(settings: Settings, lock_timeout: Duration) -> Self {
        let state = MemoryState {
            total: Some(settings.total),
            groups: Some(settings.group_count),
            assignments: HashMap::new(),
        };

        Self::from_state(state, lock_timeout)
    }

    fn from_state(state: MemoryState, lock_timeout: Duration) -> Self {
        Self {
            committed: Arc::new(RwLock::new(state)),
            writer: Arc::new(Mutex::new(())),
            lock_timeout,
        }
    }

    async fn lock_writer(&self, command: &str) -> StoreResult<OwnedMutexGuard<()>> {
        timeout(self.lock_timeout, self.writer.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::conflict(
                    command,
                    format!("lock not acquired within {:?}", self.lock_timeout),
                )
            })
    }
}

pub struct MemoryTransaction {
    _writer: OwnedMutexGuard<()>,
    committed: Arc<RwLock<MemoryState>>,
    // Inserts become visible to other callers on commit only.
    pending: Vec<Assignment>,
}

#[async_trait]
impl ExclusiveTransaction for MemoryTransaction {
    async fn find_group(&mut self, token: &str) -> StoreResult<Option<i32>> {
        if let Some(pending) = self.pending.iter().find(|a| a.token == token) {
            return Ok(Some(pending.group));
        }

        let state = self.committed.read().await;
        Ok(state.assignments.get(token).map(|a| a.group))
    }

    async fn settings(&mut self) -> StoreResult<Settings> {
        Ok(self.committed.read().await.settings())
    }

    async fn group_counts(&mut self, group_count: usize) -> StoreResult<Vec<i64>> {
        let mut counts = self.committed.read().await.group_counts(group_count);
        let pending = fill_counts(self.pending.iter().map(|a| (a.group, 1)), group_count);
        for (count, extra) in counts.iter_mut().zip(pending) {
            *count += extra;
        }
        Ok(counts)
    }

    async fn insert(&mut self, assignment: NewAssignment) -> StoreResult<()> {
        if self.find_group(&assignment.token).await?.is_some() {
            return Err(StoreError::conflict("INSERT", "token is already assigned"));
        }

        self.pending.push(assignment.into());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            _writer,
            committed,
            pending,
        } = *self;

        let mut state = committed.write().await;
        for assignment in pending {
            state.assignments.insert(assignment.token.clone(), assignment);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn begin_exclusive(&self) -> StoreResult<Box<dyn ExclusiveTransaction>> {
        let writer = self.lock_writer("BEGIN").await?;
        Ok(Box::new(MemoryTransaction {
            _writer: writer,
            committed: self.committed.clone(),
            pending: Vec::new(),
        }))
    }

    async fn settings(&self) -> StoreResult<Settings> {
        Ok(self.committed.read().await.settings())
    }

    async fn update_settings(&self, settings: Settings) -> StoreResult<()> {
        let mut state = self.committed.write().await;
        state.total = Some(settings.total);
        state.groups = Some(settings.group_count);
        Ok(())
    }

    async fn seed_settings(&self, defaults: Settings) -> StoreResult<()> {
        let mut state = self.committed.write().await;
        state.total.get_or_insert(defaults.total);
        state.groups.get_or_insert(defaults.group_count);
        Ok(())
    }

    async fn group_counts(&self, group_count: usize) -> StoreResult<Vec<i64>> {
        Ok(self.committed.read().await.group_counts(group_count))
    }

    async fn assigned_total(&self) -> StoreResult<i64> {
        let state = self.committed.read().await;
        Ok(state.assignments.len() as i64)
    }

    async fn find_assignment(&self, token: &str) -> StoreResult<Option<Assignment>> {
        Ok(self.committed.read().await.assignments.get(token).cloned())
    }

    async fn reset_assignments(&self) -> StoreResult<u64> {
        // Deleting waits for in-flight decisions, like DELETE behind the table lock in postgres.
        let _writer = self.lock_writer("DELETE").await?;
        let mut state = self.committed.write().await;
        let deleted = state.assignments.len() as u64;
        state.assignments.clear();
        Ok(deleted)
    }
}
