//! Reconciliation engine configuration.

use roster_core::repository::DirectoryScope;
use serde::{Deserialize, Serialize};

/// Placeholder role id used when the default role is missing and the
/// engine runs read-only.
pub const READ_ONLY_ROLE_ID: &str = "read-only";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Target domain, ownership marker and optional parent group.
    pub scope: DirectoryScope,
    /// Role that expresses group membership.
    pub default_role: String,
    /// Create `default_role` at start-up if the directory lacks it.
    pub create_default_role: bool,
    /// Compute and report changes without mutating any backend.
    pub read_only: bool,
    /// Converge upstream quota declarations for changed groups.
    pub support_quotas: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scope: DirectoryScope::default(),
            default_role: "_member_".into(),
            create_default_role: false,
            read_only: false,
            support_quotas: false,
        }
    }
}
