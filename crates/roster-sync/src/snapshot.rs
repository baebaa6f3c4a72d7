//! In-memory mirror of the directory for one reconciliation pass.
//!
//! Built from scratch at the start of every pass and owned exclusively by
//! the engine running that pass. Entities are keyed by `external_id`;
//! group membership is the set of member `external_id`s holding the
//! default role on the group.

use std::collections::{BTreeSet, HashMap};

use roster_core::error::RosterResult;
use roster_core::models::group::Group;
use roster_core::models::identity::Identity;
use roster_core::repository::{DirectoryBackend, DirectoryScope};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    pub group: Group,
    pub members: BTreeSet<String>,
}

#[derive(Debug, Default, Clone)]
pub struct DirectorySnapshot {
    identities: HashMap<String, Identity>,
    groups: HashMap<String, GroupState>,
    /// directory_id -> external_id
    identity_index: HashMap<String, String>,
}

impl DirectorySnapshot {
    /// Read identities, groups and default-role grants from the directory.
    ///
    /// Grants to identities outside the scope are ignored.
    pub async fn load<D: DirectoryBackend>(
        backend: &D,
        scope: &DirectoryScope,
        role_id: &str,
    ) -> RosterResult<Self> {
        let mut snapshot = Self::default();

        for identity in backend.list_identities(scope).await? {
            snapshot.insert_identity(identity);
        }

        for group in backend.list_groups(scope).await? {
            let mut members = BTreeSet::new();
            for assignment in backend.list_role_assignments(&group.directory_id).await? {
                if assignment.role_id != role_id {
                    continue;
                }
                match snapshot.identity_index.get(&assignment.identity_id) {
                    Some(external_id) => {
                        members.insert(external_id.clone());
                    }
                    None => debug!(
                        group = %group.external_id,
                        identity_id = %assignment.identity_id,
                        "Ignoring grant to identity outside scope"
                    ),
                }
            }
            snapshot.insert_group(GroupState { group, members });
        }

        debug!(
            identities = snapshot.identities.len(),
            groups = snapshot.groups.len(),
            "Directory snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn identity(&self, external_id: &str) -> Option<&Identity> {
        self.identities.get(external_id)
    }

    pub fn identity_mut(&mut self, external_id: &str) -> Option<&mut Identity> {
        self.identities.get_mut(external_id)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn group(&self, external_id: &str) -> Option<&GroupState> {
        self.groups.get(external_id)
    }

    pub fn group_mut(&mut self, external_id: &str) -> Option<&mut GroupState> {
        self.groups.get_mut(external_id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupState> {
        self.groups.values()
    }

    /// External id of the identity with the given directory id.
    pub fn identity_external_id(&self, directory_id: &str) -> Option<&str> {
        self.identity_index.get(directory_id).map(String::as_str)
    }

    pub fn insert_identity(&mut self, identity: Identity) {
        if self.identities.contains_key(&identity.external_id) {
            warn!(
                external_id = %identity.external_id,
                directory_id = %identity.directory_id,
                "Duplicate identity in directory, keeping first"
            );
            return;
        }
        self.identity_index
            .insert(identity.directory_id.clone(), identity.external_id.clone());
        self.identities.insert(identity.external_id.clone(), identity);
    }

    pub fn insert_group(&mut self, state: GroupState) {
        if self.groups.contains_key(&state.group.external_id) {
            warn!(
                external_id = %state.group.external_id,
                directory_id = %state.group.directory_id,
                "Duplicate group in directory, keeping first"
            );
            return;
        }
        self.groups.insert(state.group.external_id.clone(), state);
    }

    /// External ids of active identities, sorted.
    pub fn active_identity_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .identities
            .values()
            .filter(|i| !i.deleted)
            .map(|i| i.external_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// External ids of active groups, sorted.
    pub fn active_group_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .groups
            .values()
            .filter(|g| !g.group.scratched)
            .map(|g| g.group.external_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(external_id: &str, directory_id: &str, deleted: bool) -> Identity {
        Identity {
            directory_id: directory_id.into(),
            external_id: external_id.into(),
            display_name: external_id.into(),
            secondary_name: None,
            email: None,
            public_key: None,
            enabled: !deleted,
            deleted,
        }
    }

    #[test]
    fn index_maps_directory_ids() {
        let mut snapshot = DirectorySnapshot::default();
        snapshot.insert_identity(identity("1", "d-1", false));
        assert_eq!(snapshot.identity_external_id("d-1"), Some("1"));
        assert_eq!(snapshot.identity_external_id("d-2"), None);
    }

    #[test]
    fn duplicates_keep_first() {
        let mut snapshot = DirectorySnapshot::default();
        snapshot.insert_identity(identity("1", "d-1", false));
        snapshot.insert_identity(identity("1", "d-9", false));
        assert_eq!(snapshot.identity("1").unwrap().directory_id, "d-1");
        assert_eq!(snapshot.identity_external_id("d-9"), None);
    }

    #[test]
    fn active_ids_skip_tombstones() {
        let mut snapshot = DirectorySnapshot::default();
        snapshot.insert_identity(identity("2", "d-2", false));
        snapshot.insert_identity(identity("1", "d-1", false));
        snapshot.insert_identity(identity("3", "d-3", true));
        assert_eq!(snapshot.active_identity_ids(), vec!["1", "2"]);
    }
}
