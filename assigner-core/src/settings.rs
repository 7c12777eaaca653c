use std::sync::Arc;

use tracing::info;

use crate::metrics_consts::{ASSIGNMENTS_RESET, SETTINGS_UPDATED};
use crate::{AssignError, AssignmentStore, Settings};

/// Administrative access to the settings record and the assignment set.
///
/// Updating settings never touches existing assignments: rows made under an older group count
/// keep their group, and only new tokens see the new capacities.
pub struct SettingsManager {
    store: Arc<dyn AssignmentStore>,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<Settings, AssignError> {
        Ok(self.store.settings().await?)
    }

    pub async fn update(&self, total: i64, group_count: i64) -> Result<Settings, AssignError> {
        let settings = Settings::new(total, group_count);
        settings.validate()?;

        self.store.update_settings(settings).await?;
        metrics::counter!(SETTINGS_UPDATED).increment(1);
        info!(total, group_count, "updated assignment settings");

        Ok(settings)
    }

    /// Store `defaults` for every setting that has no value yet.
    pub async fn seed_defaults(&self, defaults: Settings) -> Result<(), AssignError> {
        defaults.validate()?;
        Ok(self.store.seed_settings(defaults).await?)
    }

    /// Delete every assignment. Irreversible; settings are left as they are.
    pub async fn reset_assignments(&self) -> Result<u64, AssignError> {
        let deleted = self.store.reset_assignments().await?;
        metrics::counter!(ASSIGNMENTS_RESET).increment(1);
        info!(deleted, "reset all assignments");

        Ok(deleted)
    }
}
