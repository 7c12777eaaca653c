//! # Assigner
//!
//! Hands out groups to tokens. Every decision runs inside one exclusive store transaction:
//! look up the token, and only if it is new read the settings and counts, pick a group and
//! insert it. Two concurrent callers can therefore never both see a group as the emptiest one,
//! and a token can never end up with two rows.
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::metrics_consts::{
    ASSIGNMENTS_CREATED, ASSIGNMENTS_REUSED, ASSIGNMENT_DURATION, ASSIGNMENT_ERRORS,
    ASSIGNMENT_RETRIES,
};
use crate::{
    choose_group, compute_capacities, AssignError, Assignment, AssignmentStore,
    ExclusiveTransaction, GroupStatus, NewAssignment, OsTieBreaker, RetryPolicy, Status,
    TieBreaker,
};

enum Outcome {
    Existing(i32),
    Created(i32),
}

pub struct Assigner {
    store: Arc<dyn AssignmentStore>,
    tie_breaker: Arc<dyn TieBreaker>,
}

impl Assigner {
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        Self::with_tie_breaker(store, Arc::new(OsTieBreaker))
    }

    pub fn with_tie_breaker(
        store: Arc<dyn AssignmentStore>,
        tie_breaker: Arc<dyn TieBreaker>,
    ) -> Self {
        Self { store, tie_breaker }
    }

    /// Return the 1-based group for `token`, assigning one if the token is new.
    ///
    /// Calling this again with the same token always returns the same group, regardless of
    /// settings changes in between. Nothing is persisted unless the call succeeds.
    pub async fn assign(&self, token: &str) -> Result<u32, AssignError> {
        let start = Instant::now();
        let result = self.assign_once(token).await;
        metrics::histogram!(ASSIGNMENT_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(group) => debug!(group, "assigned token"),
            Err(error) => {
                metrics::counter!(ASSIGNMENT_ERRORS, "kind" => error.kind()).increment(1);
            }
        }

        result
    }

    /// Like `assign`, but re-runs the whole call on `TransactionConflict` following `policy`.
    /// Other errors are returned right away.
    pub async fn assign_with_retry(
        &self,
        token: &str,
        policy: &RetryPolicy,
    ) -> Result<u32, AssignError> {
        let mut attempt = 0;
        loop {
            match self.assign(token).await {
                Err(error) if error.is_retryable() && policy.should_retry(attempt) => {
                    let wait = policy.time_until_next_retry(attempt);
                    warn!(attempt, ?wait, "assignment conflicted, retrying: {}", error);
                    metrics::counter!(ASSIGNMENT_RETRIES).increment(1);

                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn assign_once(&self, token: &str) -> Result<u32, AssignError> {
        let mut tx = self.store.begin_exclusive().await?;

        let outcome = match self.decide(tx.as_mut(), token).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    // The store discards the transaction anyway once the connection drops it.
                    warn!("rollback after failed assignment also failed: {}", rollback_error);
                }
                return Err(error);
            }
        };

        tx.commit().await?;

        match outcome {
            Outcome::Existing(group) => {
                metrics::counter!(ASSIGNMENTS_REUSED).increment(1);
                group_number(group)
            }
            Outcome::Created(group) => {
                metrics::counter!(ASSIGNMENTS_CREATED, "group" => group.to_string()).increment(1);
                group_number(group)
            }
        }
    }

    async fn decide(
        &self,
        tx: &mut dyn ExclusiveTransaction,
        token: &str,
    ) -> Result<Outcome, AssignError> {
        if let Some(group) = tx.find_group(token).await? {
            return Ok(Outcome::Existing(group));
        }

        let settings = tx.settings().await?;
        let capacities = compute_capacities(settings.total, settings.group_count)?;
        let counts = tx.group_counts(capacities.len()).await?;

        let invalid = || AssignError::InvalidConfiguration {
            total: settings.total,
            group_count: settings.group_count,
        };
        let index = choose_group(&counts, &capacities, self.tie_breaker.as_ref())
            .ok_or_else(invalid)?;
        let group = i32::try_from(index + 1).map_err(|_| invalid())?;

        // Tokens can be session secrets, keep them out of the logs.
        debug!(group, ?counts, ?capacities, "picked group for new token");
        tx.insert(NewAssignment::new(token, group)).await?;

        Ok(Outcome::Created(group))
    }

    /// Read the stored assignment for `token` without creating one.
    pub async fn lookup(&self, token: &str) -> Result<Option<Assignment>, AssignError> {
        Ok(self.store.find_assignment(token).await?)
    }

    /// Per-group view of the current settings and committed counts.
    /// Does not take the writer lock, so it can trail in-flight assignments slightly.
    pub async fn status(&self) -> Result<Status, AssignError> {
        let settings = self.store.settings().await?;
        let capacities = compute_capacities(settings.total, settings.group_count)?;
        let counts = self.store.group_counts(capacities.len()).await?;
        let assigned_total = self.store.assigned_total().await?;

        let per_group = capacities
            .iter()
            .zip(&counts)
            .enumerate()
            .map(|(index, (capacity, assigned))| GroupStatus {
                group: (index + 1) as u32,
                assigned: *assigned,
                capacity: *capacity,
                remaining: capacity - assigned,
            })
            .collect();

        Ok(Status {
            per_group,
            total: settings.total,
            group_count: settings.group_count,
            assigned_total,
        })
    }
}

fn group_number(group: i32) -> Result<u32, AssignError> {
    u32::try_from(group)
        .map_err(|_| AssignError::StorageUnavailable(format!("stored group {group} is invalid")))
}
