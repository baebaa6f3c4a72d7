//! The directory reconciliation engine.
//!
//! A pass loads a fresh [`DirectorySnapshot`], walks the upstream
//! identities and groups in feed order, and issues the minimal set of
//! create / update / membership / soft-delete calls needed to make the
//! directory match. Entities absent from the feed are only tombstoned;
//! hard removal happens in [`SyncEngine::terminate_soft_deleted`].
//!
//! Errors that concern a single entity are collected in the
//! [`SyncReport`] and the pass moves on. Any other error (a failing
//! backend) aborts the pass; rerunning it converges to the same state.

use std::collections::{BTreeSet, HashSet};

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::feed::{FeedGroup, FeedIdentity};
use roster_core::models::group::{CreateGroup, Group, UpdateGroup};
use roster_core::models::identity::{CreateIdentity, Identity, UpdateIdentity};
use roster_core::repository::{DirectoryBackend, QuotaBackend};
use roster_quota::QuotaFactory;
use tracing::{debug, info, warn};

use crate::config::{READ_ONLY_ROLE_ID, SyncConfig};
use crate::report::{Change, EntityKind, GroupQuotaReport, SyncReport};
use crate::snapshot::{DirectorySnapshot, GroupState};

/// Directory id prefix for entities "created" by a read-only pass.
const PLANNED_ID_PREFIX: &str = "planned:";

pub struct SyncEngine<D, Q>
where
    D: DirectoryBackend,
    Q: QuotaBackend + Clone,
{
    directory: D,
    quotas: Option<QuotaFactory<Q>>,
    config: SyncConfig,
    role_id: String,
}

impl<D, Q> SyncEngine<D, Q>
where
    D: DirectoryBackend,
    Q: QuotaBackend + Clone,
{
    /// Build an engine, resolving the default membership role.
    ///
    /// A missing role is created when `create_default_role` is set. In
    /// read-only mode nothing is created and a placeholder id stands in.
    pub async fn connect(
        directory: D,
        quotas: Option<QuotaFactory<Q>>,
        config: SyncConfig,
    ) -> RosterResult<Self> {
        let role_id = resolve_default_role(&directory, &config).await?;

        if config.support_quotas && quotas.is_none() {
            warn!("Quota support enabled without quota connections; quotas will be ignored");
        }

        info!(
            domain = %config.scope.domain,
            marker = %config.scope.marker,
            role = %config.default_role,
            role_id = %role_id,
            read_only = config.read_only,
            "Reconciliation engine ready"
        );

        Ok(Self {
            directory,
            quotas,
            config,
            role_id,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub async fn snapshot(&self) -> RosterResult<DirectorySnapshot> {
        DirectorySnapshot::load(&self.directory, &self.config.scope, &self.role_id).await
    }

    /// Run one reconciliation pass.
    pub async fn reconcile(
        &self,
        identities: &[FeedIdentity],
        groups: &[FeedGroup],
    ) -> RosterResult<SyncReport> {
        let mut report = SyncReport::begin(self.config.read_only);
        let mut snapshot = self.snapshot().await?;

        info!(
            identities = identities.len(),
            groups = groups.len(),
            read_only = self.config.read_only,
            "Reconciliation pass started"
        );

        let mut seen_identities = HashSet::with_capacity(identities.len());
        for record in identities {
            if !seen_identities.insert(record.external_id.as_str()) {
                let error = RosterError::validation("duplicate external id in feed");
                report.fail(EntityKind::Identity, &record.external_id, &error);
                continue;
            }
            let result = self.sync_identity(&mut snapshot, record).await;
            if let Some(change) = absorb(&mut report, EntityKind::Identity, &record.external_id, result)? {
                report.identities.record(change);
            }
        }

        for external_id in snapshot.active_identity_ids() {
            if seen_identities.contains(external_id.as_str()) {
                continue;
            }
            let result = self.soft_delete_identity(&mut snapshot, &external_id).await;
            if let Some(change) = absorb(&mut report, EntityKind::Identity, &external_id, result)? {
                report.identities.record(change);
            }
        }

        let mut seen_groups = HashSet::with_capacity(groups.len());
        for record in groups {
            if !seen_groups.insert(record.external_id.as_str()) {
                let error = RosterError::validation("duplicate external id in feed");
                report.fail(EntityKind::Group, &record.external_id, &error);
                continue;
            }
            let result = self.sync_group(&mut snapshot, record, &mut report).await;
            let Some(change) = absorb(&mut report, EntityKind::Group, &record.external_id, result)?
            else {
                continue;
            };
            report.groups.record(change);

            if let Some(quotas) = self.converge_quotas(&snapshot, record).await {
                report.quotas.push(quotas);
            }
        }

        for external_id in snapshot.active_group_ids() {
            if seen_groups.contains(external_id.as_str()) {
                continue;
            }
            let result = self.scratch_group(&mut snapshot, &external_id).await;
            if let Some(change) = absorb(&mut report, EntityKind::Group, &external_id, result)? {
                report.groups.record(change);
            }
        }

        let report = report.finish();
        info!(
            mutations = report.mutations(),
            failures = report.failures.len(),
            read_only = report.read_only,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Identities
    // -----------------------------------------------------------------------

    async fn sync_identity(
        &self,
        snapshot: &mut DirectorySnapshot,
        record: &FeedIdentity,
    ) -> RosterResult<Change> {
        if record.external_id.trim().is_empty() {
            return Err(RosterError::validation("identity without external id"));
        }

        let Some(current) = snapshot.identity(&record.external_id).cloned() else {
            let identity = self.create_identity(record).await?;
            snapshot.insert_identity(identity);
            return Ok(Change::Created);
        };

        let desired = UpdateIdentity {
            display_name: record.display_name.clone(),
            secondary_name: record.secondary_name.clone(),
            email: record.email.clone(),
            public_key: record.public_key.clone(),
            enabled: record.enabled,
            deleted: false,
        };
        if identity_matches(&current, &desired) {
            return Ok(Change::Unchanged);
        }

        let change = if current.deleted {
            Change::Revived
        } else {
            Change::Updated
        };
        self.update_identity(snapshot, &current, desired, change).await?;
        Ok(change)
    }

    async fn create_identity(&self, record: &FeedIdentity) -> RosterResult<Identity> {
        let input = CreateIdentity {
            external_id: record.external_id.clone(),
            display_name: record.display_name.clone(),
            secondary_name: record.secondary_name.clone(),
            email: record.email.clone(),
            public_key: record.public_key.clone(),
            enabled: record.enabled,
        };

        let identity = if self.config.read_only {
            Identity {
                directory_id: planned_id(&input.external_id),
                external_id: input.external_id,
                display_name: input.display_name,
                secondary_name: input.secondary_name,
                email: input.email,
                public_key: input.public_key,
                enabled: input.enabled,
                deleted: false,
            }
        } else {
            self.directory
                .create_identity(&self.config.scope, input)
                .await?
        };

        info!(
            target: "roster::report",
            external_id = %identity.external_id,
            directory_id = %identity.directory_id,
            enabled = identity.enabled,
            read_only = self.config.read_only,
            "Identity created"
        );
        Ok(identity)
    }

    async fn update_identity(
        &self,
        snapshot: &mut DirectorySnapshot,
        current: &Identity,
        desired: UpdateIdentity,
        change: Change,
    ) -> RosterResult<()> {
        if !self.config.read_only {
            self.directory
                .update_identity(&current.directory_id, desired.clone())
                .await?;
        }
        if let Some(cached) = snapshot.identity_mut(&current.external_id) {
            desired.apply_to(cached);
        }

        info!(
            target: "roster::report",
            external_id = %current.external_id,
            directory_id = %current.directory_id,
            change = ?change,
            enabled = desired.enabled && !desired.deleted,
            deleted = desired.deleted,
            read_only = self.config.read_only,
            "Identity updated"
        );
        Ok(())
    }

    async fn soft_delete_identity(
        &self,
        snapshot: &mut DirectorySnapshot,
        external_id: &str,
    ) -> RosterResult<Change> {
        let current = snapshot
            .identity(external_id)
            .cloned()
            .ok_or_else(|| RosterError::not_found("identity", external_id))?;
        if current.deleted {
            return Ok(Change::Unchanged);
        }
        let tombstone = UpdateIdentity::tombstone(&current);
        self.update_identity(snapshot, &current, tombstone, Change::SoftDeleted)
            .await?;
        Ok(Change::SoftDeleted)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    async fn sync_group(
        &self,
        snapshot: &mut DirectorySnapshot,
        record: &FeedGroup,
        report: &mut SyncReport,
    ) -> RosterResult<Change> {
        if record.external_id.trim().is_empty() {
            return Err(RosterError::validation("group without external id"));
        }

        let mut change = match snapshot.group(&record.external_id).cloned() {
            None => {
                let group = self.create_group(record).await?;
                snapshot.insert_group(GroupState {
                    group,
                    members: BTreeSet::new(),
                });
                Change::Created
            }
            Some(current) => {
                let desired = UpdateGroup {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    enabled: true,
                    scratched: false,
                };
                if group_matches(&current.group, &desired) {
                    Change::Unchanged
                } else {
                    let change = if current.group.scratched {
                        Change::Revived
                    } else {
                        Change::Updated
                    };
                    self.update_group(snapshot, &current.group, desired, change)
                        .await?;
                    change
                }
            }
        };

        let members = desired_members(snapshot, record);
        if self
            .sync_members(snapshot, &record.external_id, &members, report)
            .await?
            && change == Change::Unchanged
        {
            change = Change::Updated;
        }
        Ok(change)
    }

    async fn create_group(&self, record: &FeedGroup) -> RosterResult<Group> {
        let input = CreateGroup {
            external_id: record.external_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            enabled: true,
        };

        let group = if self.config.read_only {
            Group {
                directory_id: planned_id(&input.external_id),
                external_id: input.external_id,
                name: input.name,
                description: input.description,
                enabled: input.enabled,
                scratched: false,
            }
        } else {
            self.directory.create_group(&self.config.scope, input).await?
        };

        info!(
            target: "roster::report",
            external_id = %group.external_id,
            directory_id = %group.directory_id,
            name = %group.name,
            parent = ?self.config.scope.parent_group_id,
            read_only = self.config.read_only,
            "Group created"
        );
        Ok(group)
    }

    async fn update_group(
        &self,
        snapshot: &mut DirectorySnapshot,
        current: &Group,
        desired: UpdateGroup,
        change: Change,
    ) -> RosterResult<()> {
        if !self.config.read_only {
            self.directory
                .update_group(&current.directory_id, desired.clone())
                .await?;
        }
        if let Some(cached) = snapshot.group_mut(&current.external_id) {
            desired.apply_to(&mut cached.group);
        }

        info!(
            target: "roster::report",
            external_id = %current.external_id,
            directory_id = %current.directory_id,
            change = ?change,
            scratched = desired.scratched,
            read_only = self.config.read_only,
            "Group updated"
        );
        Ok(())
    }

    async fn scratch_group(
        &self,
        snapshot: &mut DirectorySnapshot,
        external_id: &str,
    ) -> RosterResult<Change> {
        let current = snapshot
            .group(external_id)
            .map(|state| state.group.clone())
            .ok_or_else(|| RosterError::not_found("group", external_id))?;
        if current.scratched {
            return Ok(Change::Unchanged);
        }
        let tombstone = UpdateGroup::scratch(&current);
        self.update_group(snapshot, &current, tombstone, Change::SoftDeleted)
            .await?;
        Ok(Change::SoftDeleted)
    }

    /// Make the group's member set equal `desired`. Returns whether any
    /// grant or revoke was issued.
    async fn sync_members(
        &self,
        snapshot: &mut DirectorySnapshot,
        group_id: &str,
        desired: &BTreeSet<String>,
        report: &mut SyncReport,
    ) -> RosterResult<bool> {
        let current = snapshot
            .group(group_id)
            .map(|state| state.members.clone())
            .ok_or_else(|| RosterError::not_found("group", group_id))?;

        let removed: Vec<_> = current.difference(desired).cloned().collect();
        let added: Vec<_> = desired.difference(&current).cloned().collect();
        let mut changed = false;

        for identity_id in &removed {
            let result = self.remove_member(snapshot, group_id, identity_id).await;
            let label = format!("{group_id}/{identity_id}");
            if absorb(report, EntityKind::Membership, label, result)?.is_some() {
                report.memberships.revoked += 1;
                changed = true;
            }
        }
        for identity_id in &added {
            let result = self.add_member(snapshot, group_id, identity_id).await;
            let label = format!("{group_id}/{identity_id}");
            if absorb(report, EntityKind::Membership, label, result)?.is_some() {
                report.memberships.granted += 1;
                changed = true;
            }
        }

        Ok(changed)
    }

    /// Grant the default role. Both sides must be active members of the
    /// snapshot; nothing is sent to the backend otherwise.
    pub async fn add_member(
        &self,
        snapshot: &mut DirectorySnapshot,
        group_id: &str,
        identity_id: &str,
    ) -> RosterResult<()> {
        let group = snapshot
            .group(group_id)
            .filter(|state| !state.group.scratched)
            .ok_or_else(|| RosterError::not_found("group", group_id))?;
        let identity = snapshot
            .identity(identity_id)
            .filter(|identity| !identity.deleted)
            .ok_or_else(|| RosterError::not_found("identity", identity_id))?;

        if group.members.contains(identity_id) {
            return Ok(());
        }

        let group_directory_id = group.group.directory_id.clone();
        if !self.config.read_only {
            self.directory
                .grant_role(&self.role_id, &identity.directory_id, &group_directory_id)
                .await?;
        }
        if let Some(state) = snapshot.group_mut(group_id) {
            state.members.insert(identity_id.to_string());
        }

        info!(
            target: "roster::report",
            group = group_id,
            identity = identity_id,
            read_only = self.config.read_only,
            "Member added"
        );
        Ok(())
    }

    /// Revoke the default role. Other roles the identity holds on the group
    /// are left alone.
    pub async fn remove_member(
        &self,
        snapshot: &mut DirectorySnapshot,
        group_id: &str,
        identity_id: &str,
    ) -> RosterResult<()> {
        let group = snapshot
            .group(group_id)
            .ok_or_else(|| RosterError::not_found("group", group_id))?;
        let identity = snapshot
            .identity(identity_id)
            .ok_or_else(|| RosterError::not_found("identity", identity_id))?;

        if !group.members.contains(identity_id) {
            return Ok(());
        }

        let group_directory_id = group.group.directory_id.clone();
        if !self.config.read_only {
            self.directory
                .revoke_role(&self.role_id, &identity.directory_id, &group_directory_id)
                .await?;
        }
        if let Some(state) = snapshot.group_mut(group_id) {
            state.members.remove(identity_id);
        }

        info!(
            target: "roster::report",
            group = group_id,
            identity = identity_id,
            read_only = self.config.read_only,
            "Member removed"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Quotas
    // -----------------------------------------------------------------------

    async fn converge_quotas(
        &self,
        snapshot: &DirectorySnapshot,
        record: &FeedGroup,
    ) -> Option<GroupQuotaReport> {
        if !self.config.support_quotas || record.quotas.is_empty() {
            return None;
        }
        let factory = self.quotas.as_ref()?;
        let state = snapshot.group(&record.external_id)?;

        debug!(
            group = %record.external_id,
            fields = record.quotas.len(),
            "Converging quotas"
        );
        let manager = factory.get_manager(&state.group.directory_id);
        let changes = manager.converge(&record.quotas, self.config.read_only).await;

        Some(GroupQuotaReport {
            group: record.external_id.clone(),
            changes,
        })
    }

    // -----------------------------------------------------------------------
    // Termination
    // -----------------------------------------------------------------------

    /// Hard-remove every tombstoned group and identity in scope.
    ///
    /// Never run as part of [`reconcile`](Self::reconcile); callers invoke it
    /// explicitly.
    pub async fn terminate_soft_deleted(&self) -> RosterResult<SyncReport> {
        let mut report = SyncReport::begin(self.config.read_only);

        for group in self.directory.list_groups(&self.config.scope).await? {
            if !group.scratched {
                continue;
            }
            let result = self.terminate_group_record(&group).await;
            if absorb(&mut report, EntityKind::Group, &group.external_id, result)?.is_some() {
                report.groups.record(Change::Terminated);
            }
        }

        for identity in self.directory.list_identities(&self.config.scope).await? {
            if !identity.deleted {
                continue;
            }
            let result = self.terminate_identity_record(&identity).await;
            if absorb(&mut report, EntityKind::Identity, &identity.external_id, result)?.is_some() {
                report.identities.record(Change::Terminated);
            }
        }

        let report = report.finish();
        info!(
            groups = report.groups.terminated,
            identities = report.identities.terminated,
            read_only = report.read_only,
            "Termination sweep finished"
        );
        Ok(report)
    }

    /// Hard-remove one identity. It must have been soft-deleted first.
    pub async fn terminate_identity(&self, external_id: &str) -> RosterResult<()> {
        let identity = self
            .directory
            .list_identities(&self.config.scope)
            .await?
            .into_iter()
            .find(|identity| identity.external_id == external_id)
            .ok_or_else(|| RosterError::not_found("identity", external_id))?;
        self.terminate_identity_record(&identity).await
    }

    /// Hard-remove one group. It must have been scratched first.
    pub async fn terminate_group(&self, external_id: &str) -> RosterResult<()> {
        let group = self
            .directory
            .list_groups(&self.config.scope)
            .await?
            .into_iter()
            .find(|group| group.external_id == external_id)
            .ok_or_else(|| RosterError::not_found("group", external_id))?;
        self.terminate_group_record(&group).await
    }

    async fn terminate_identity_record(&self, identity: &Identity) -> RosterResult<()> {
        if !identity.deleted {
            return Err(RosterError::Precondition {
                entity: "identity".into(),
                id: identity.external_id.clone(),
                reason: "identity is not soft-deleted".into(),
            });
        }
        if !self.config.read_only {
            self.directory.delete_identity(&identity.directory_id).await?;
        }
        info!(
            target: "roster::report",
            external_id = %identity.external_id,
            directory_id = %identity.directory_id,
            read_only = self.config.read_only,
            "Identity terminated"
        );
        Ok(())
    }

    async fn terminate_group_record(&self, group: &Group) -> RosterResult<()> {
        if !group.scratched {
            return Err(RosterError::Precondition {
                entity: "group".into(),
                id: group.external_id.clone(),
                reason: "group is not scratched".into(),
            });
        }
        if !self.config.read_only {
            self.directory.delete_group(&group.directory_id).await?;
        }
        info!(
            target: "roster::report",
            external_id = %group.external_id,
            directory_id = %group.directory_id,
            read_only = self.config.read_only,
            "Group terminated"
        );
        Ok(())
    }
}

/// Listed members minus soft-deleted identities. Unknown ids are kept so the
/// grant attempt reports them.
fn desired_members(snapshot: &DirectorySnapshot, record: &FeedGroup) -> BTreeSet<String> {
    record
        .members
        .iter()
        .filter(|id| {
            let tombstoned = snapshot.identity(id).is_some_and(|identity| identity.deleted);
            if tombstoned {
                debug!(
                    group = %record.external_id,
                    identity = %id,
                    "Soft-deleted identity is not a member"
                );
            }
            !tombstoned
        })
        .cloned()
        .collect()
}

async fn resolve_default_role<D: DirectoryBackend>(
    directory: &D,
    config: &SyncConfig,
) -> RosterResult<String> {
    let existing = directory
        .list_roles()
        .await?
        .into_iter()
        .find(|role| role.name == config.default_role);
    if let Some(role) = existing {
        return Ok(role.id);
    }

    if !config.create_default_role {
        return Err(RosterError::not_found("role", &config.default_role));
    }

    if config.read_only {
        warn!(
            role = %config.default_role,
            "Default role missing; not created in read-only mode"
        );
        return Ok(READ_ONLY_ROLE_ID.to_string());
    }

    let role = directory.create_role(&config.default_role).await?;
    info!(
        target: "roster::report",
        role = %role.name,
        role_id = %role.id,
        "Default role created"
    );
    Ok(role.id)
}

/// Record entity-scoped errors in the report and continue; anything else
/// aborts the pass.
fn absorb<T>(
    report: &mut SyncReport,
    kind: EntityKind,
    external_id: impl Into<String>,
    result: RosterResult<T>,
) -> RosterResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_entity_scoped() => {
            report.fail(kind, external_id, &e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn planned_id(external_id: &str) -> String {
    format!("{PLANNED_ID_PREFIX}{external_id}")
}

fn identity_matches(current: &Identity, desired: &UpdateIdentity) -> bool {
    current.display_name == desired.display_name
        && current.secondary_name == desired.secondary_name
        && current.email == desired.email
        && current.public_key == desired.public_key
        && current.enabled == desired.enabled
        && current.deleted == desired.deleted
}

fn group_matches(current: &Group, desired: &UpdateGroup) -> bool {
    current.name == desired.name
        && current.description == desired.description
        && current.enabled == desired.enabled
        && current.scratched == desired.scratched
}
