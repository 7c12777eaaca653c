// Labeled with the group number the participant landed in.
pub const ASSIGNMENTS_CREATED: &str = "assignments_created_total";
// Requests answered from an existing assignment.
pub const ASSIGNMENTS_REUSED: &str = "assignments_reused_total";
// Labeled with the error kind.
pub const ASSIGNMENT_ERRORS: &str = "assignment_errors_total";
pub const ASSIGNMENT_RETRIES: &str = "assignment_retries_total";
// Wall time of one assign call in seconds, including the wait for the writer lock.
pub const ASSIGNMENT_DURATION: &str = "assignment_duration_seconds";
pub const ASSIGNMENTS_RESET: &str = "assignments_reset_total";
pub const SETTINGS_UPDATED: &str = "assignment_settings_updated_total";
