// Modules stay private and the public parts are re-exported here, so internals can be renamed or
// moved without touching the public API

// Pure allocation math
mod capacity;
pub use capacity::compute_capacities;

mod selector;
pub use selector::choose_group;
pub use selector::FixedTieBreaker;
pub use selector::OsTieBreaker;
pub use selector::SeededTieBreaker;
pub use selector::TieBreaker;

// Types
mod types;
pub use types::Assignment;
pub use types::GroupStatus;
pub use types::NewAssignment;
pub use types::Settings;
pub use types::Status;
pub use types::MAX_GROUP_COUNT;

// Errors
mod error;
// Errors surfaced to callers of the engine - misconfiguration, lock conflicts, storage outages
pub use error::AssignError;
// Errors raised by a storage adapter, before they are classified for callers
pub use error::StoreError;

// Storage
pub mod store;
pub use store::AssignmentStore;
pub use store::ExclusiveTransaction;
pub use store::MemoryStore;
pub use store::PgStore;

// Coordinator
mod assigner;
pub use assigner::Assigner;

// Settings
mod settings;
pub use settings::SettingsManager;

// Retries
mod retry;
pub use retry::RetryPolicy;

// Config
mod config;
pub use config::PoolConfig;

mod metrics_consts;

pub const TOTAL_SETTING_KEY: &str = "total";
pub const GROUPS_SETTING_KEY: &str = "groups";
