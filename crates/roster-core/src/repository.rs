//! Backend trait definitions.
//!
//! The directory (identities, groups, role grants) and each quota domain
//! are external systems of record. All calls are single request/response
//! operations; transports enforce their own timeouts and report failures
//! as [`RosterError::Backend`](crate::error::RosterError::Backend).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RosterResult;
use crate::models::{
    group::{CreateGroup, Group, UpdateGroup},
    identity::{CreateIdentity, Identity, UpdateIdentity},
    quota::QuotaReading,
    role::{Role, RoleAssignment},
};

/// Which part of the directory the reconciler owns.
///
/// Backends only list entities inside `domain` that carry `marker`, so
/// entities managed by other tooling are invisible to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryScope {
    pub domain: String,
    pub marker: String,
    /// Parent for newly created groups in nested setups.
    pub parent_group_id: Option<String>,
}

impl Default for DirectoryScope {
    fn default() -> Self {
        Self {
            domain: "default".into(),
            marker: "roster".into(),
            parent_group_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

pub trait IdentityRepository: Send + Sync {
    /// All non-terminated identities in scope, tombstoned ones included.
    fn list_identities(
        &self,
        scope: &DirectoryScope,
    ) -> impl Future<Output = RosterResult<Vec<Identity>>> + Send;
    fn create_identity(
        &self,
        scope: &DirectoryScope,
        input: CreateIdentity,
    ) -> impl Future<Output = RosterResult<Identity>> + Send;
    fn update_identity(
        &self,
        directory_id: &str,
        input: UpdateIdentity,
    ) -> impl Future<Output = RosterResult<Identity>> + Send;
    /// Hard delete; also drops the identity's role grants.
    fn delete_identity(&self, directory_id: &str) -> impl Future<Output = RosterResult<()>> + Send;
}

pub trait GroupRepository: Send + Sync {
    fn list_groups(
        &self,
        scope: &DirectoryScope,
    ) -> impl Future<Output = RosterResult<Vec<Group>>> + Send;
    fn create_group(
        &self,
        scope: &DirectoryScope,
        input: CreateGroup,
    ) -> impl Future<Output = RosterResult<Group>> + Send;
    fn update_group(
        &self,
        directory_id: &str,
        input: UpdateGroup,
    ) -> impl Future<Output = RosterResult<Group>> + Send;
    /// Hard delete; also drops all role grants on the group.
    fn delete_group(&self, directory_id: &str) -> impl Future<Output = RosterResult<()>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn list_roles(&self) -> impl Future<Output = RosterResult<Vec<Role>>> + Send;
    fn create_role(&self, name: &str) -> impl Future<Output = RosterResult<Role>> + Send;

    /// Grant `role_id` to an identity on a group. Granting twice is a no-op.
    fn grant_role(
        &self,
        role_id: &str,
        identity_id: &str,
        group_id: &str,
    ) -> impl Future<Output = RosterResult<()>> + Send;

    /// Revoke exactly `role_id`; other roles on the pair are untouched.
    fn revoke_role(
        &self,
        role_id: &str,
        identity_id: &str,
        group_id: &str,
    ) -> impl Future<Output = RosterResult<()>> + Send;

    fn list_role_assignments(
        &self,
        group_id: &str,
    ) -> impl Future<Output = RosterResult<Vec<RoleAssignment>>> + Send;
}

/// Everything the reconciliation engine needs from the directory.
pub trait DirectoryBackend: IdentityRepository + GroupRepository + RoleRepository {}

impl<T> DirectoryBackend for T where T: IdentityRepository + GroupRepository + RoleRepository {}

// ---------------------------------------------------------------------------
// Quota domains
// ---------------------------------------------------------------------------

/// Native quota API of one quota domain.
pub trait QuotaBackend: Send + Sync {
    /// All quotas of the domain for a group, with usage detail.
    fn get_quotas(
        &self,
        group_id: &str,
    ) -> impl Future<Output = RosterResult<HashMap<String, QuotaReading>>> + Send;

    fn update_quota(
        &self,
        group_id: &str,
        name: &str,
        value: i64,
    ) -> impl Future<Output = RosterResult<()>> + Send;
}
