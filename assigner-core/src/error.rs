use thiserror::Error;

use crate::MAX_GROUP_COUNT;

/// Enumeration of errors returned by a storage adapter.
/// Adapters classify their native failures into one of these so the coordinator can decide
/// whether a caller may retry.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{command} could not complete due to a conflicting transaction: {reason}")]
    Conflict { command: String, reason: String },
    #[error("{command} failed with: {reason}")]
    Unavailable { command: String, reason: String },
}

impl StoreError {
    pub fn conflict(command: &str, reason: impl ToString) -> Self {
        StoreError::Conflict {
            command: command.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub fn unavailable(command: &str, reason: impl ToString) -> Self {
        StoreError::Unavailable {
            command: command.to_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Enumeration of errors surfaced by the assignment engine.
#[derive(Error, Debug)]
pub enum AssignError {
    /// Settings hold a total or group count below 1, or more than `MAX_GROUP_COUNT` groups. A human
    /// has to fix the settings, so callers should not retry.
    #[error(
        "invalid configuration: total={total}, groups={group_count} (both must be at least 1, groups at most {})",
        MAX_GROUP_COUNT
    )]
    InvalidConfiguration { total: i64, group_count: i64 },
    /// The exclusive transaction could not be acquired or was aborted by the store. Retrying the
    /// whole call is safe.
    #[error("transaction conflict, please retry: {0}")]
    TransactionConflict(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl AssignError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssignError::TransactionConflict(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AssignError::InvalidConfiguration { .. } => "invalid_configuration",
            AssignError::TransactionConflict(_) => "transaction_conflict",
            AssignError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<StoreError> for AssignError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => AssignError::TransactionConflict(error.to_string()),
            StoreError::Unavailable { .. } => AssignError::StorageUnavailable(error.to_string()),
        }
    }
}
