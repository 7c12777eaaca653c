use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AssignError;

/// Largest group count the engine accepts. Every decision allocates per-group vectors, so the
/// bound has to hold before anything is sized from a stored value.
pub const MAX_GROUP_COUNT: i64 = 10_000;

/// The singleton configuration every assignment decision is made against.
/// Values are kept as stored; a missing key reads as 0 and is rejected by `validate`, as is a
/// group count above `MAX_GROUP_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub total: i64,
    #[serde(rename = "groups")]
    pub group_count: i64,
}

impl Settings {
    pub fn new(total: i64, group_count: i64) -> Self {
        Self { total, group_count }
    }

    pub fn validate(&self) -> Result<(), AssignError> {
        if self.total < 1 || !(1..=MAX_GROUP_COUNT).contains(&self.group_count) {
            return Err(AssignError::InvalidConfiguration {
                total: self.total,
                group_count: self.group_count,
            });
        }
        Ok(())
    }

    /// Number of groups as a vector length. Only meaningful after `validate`.
    pub fn groups(&self) -> usize {
        usize::try_from(self.group_count).unwrap_or(0)
    }
}

/// A committed assignment row. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub token: String,
    #[sqlx(rename = "group_number")]
    pub group: i32,
    pub created_at: DateTime<Utc>,
}

/// An assignment to be inserted by the coordinator.
/// We take ownership when inserting to make sure a decision is only persisted once.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub token: String,
    pub group: i32,
    pub created_at: DateTime<Utc>,
}

impl NewAssignment {
    pub fn new(token: &str, group: i32) -> Self {
        Self {
            token: token.to_owned(),
            group,
            created_at: Utc::now(),
        }
    }
}

impl From<NewAssignment> for Assignment {
    fn from(new: NewAssignment) -> Self {
        Self {
            token: new.token,
            group: new.group,
            created_at: new.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatus {
    pub group: u32,
    pub assigned: i64,
    pub capacity: i64,
    /// Negative when the group is overbooked.
    pub remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub per_group: Vec<GroupStatus>,
    pub total: i64,
    pub group_count: i64,
    /// Every stored row, including rows made under a since-reduced group count.
    pub assigned_total: i64,
}
