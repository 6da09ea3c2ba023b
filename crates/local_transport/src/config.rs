//! Transport configuration types and defaults.

use serde::{Deserialize, Serialize};

/// Default length of a listener's accept queue.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 100;

/// What the registry does when a listener is created under a name that is
/// already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The new listener replaces the old entry; the old listener keeps
    /// running but can no longer be found by name.
    #[default]
    Replace,
    /// Registration fails with `AlreadyRegistered`.
    Reject,
}

/// Settings shared by every listener created through one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum number of connectors waiting to be accepted per listener
    pub backlog_capacity: usize,

    /// Handling of duplicate listener names
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            duplicate_policy: DuplicatePolicy::Replace,
        }
    }
}
