//! Group domain model.
//!
//! Groups are the resource-scoping containers (projects) of the directory.
//! Membership is not stored on the record itself; it is derived from role
//! assignments when a snapshot is taken.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub directory_id: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Soft-delete tombstone; a scratched group is always disabled.
    pub scratched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Full replacement field set for a group update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGroup {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub scratched: bool,
}

impl UpdateGroup {
    pub fn scratch(group: &Group) -> Self {
        Self {
            name: group.name.clone(),
            description: group.description.clone(),
            enabled: false,
            scratched: true,
        }
    }

    pub fn apply_to(&self, group: &mut Group) {
        group.name = self.name.clone();
        group.description = self.description.clone();
        group.scratched = self.scratched;
        group.enabled = self.enabled && !self.scratched;
    }
}
