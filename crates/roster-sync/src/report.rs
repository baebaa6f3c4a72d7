//! Per-pass change report.

use std::fmt;

use chrono::{DateTime, Utc};
use roster_core::error::RosterError;
use roster_quota::QuotaChange;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Identity,
    Group,
    Membership,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "identity",
            Self::Group => "group",
            Self::Membership => "membership",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub created: usize,
    pub updated: usize,
    pub revived: usize,
    pub unchanged: usize,
    pub soft_deleted: usize,
    pub terminated: usize,
}

/// What a pass did to a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Revived,
    Unchanged,
    SoftDeleted,
    Terminated,
}

impl Change {
    pub fn is_mutation(self) -> bool {
        self != Self::Unchanged
    }
}

impl EntityCounts {
    pub fn record(&mut self, change: Change) {
        let counter = match change {
            Change::Created => &mut self.created,
            Change::Updated => &mut self.updated,
            Change::Revived => &mut self.revived,
            Change::Unchanged => &mut self.unchanged,
            Change::SoftDeleted => &mut self.soft_deleted,
            Change::Terminated => &mut self.terminated,
        };
        *counter += 1;
    }

    /// Number of backend mutations these counts stand for.
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.revived + self.soft_deleted + self.terminated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipCounts {
    pub granted: usize,
    pub revoked: usize,
}

/// An entity that could not be processed. The pass continued without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: EntityKind,
    pub external_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupQuotaReport {
    pub group: String,
    pub changes: Vec<QuotaChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// No backend mutation was issued; counts describe what would change.
    pub read_only: bool,
    pub identities: EntityCounts,
    pub groups: EntityCounts,
    pub memberships: MembershipCounts,
    pub quotas: Vec<GroupQuotaReport>,
    pub failures: Vec<Failure>,
}

impl SyncReport {
    pub fn begin(read_only: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            read_only,
            identities: EntityCounts::default(),
            groups: EntityCounts::default(),
            memberships: MembershipCounts::default(),
            quotas: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn fail(&mut self, kind: EntityKind, external_id: impl Into<String>, error: &RosterError) {
        let external_id = external_id.into();
        warn!(
            target: "roster::report",
            %kind,
            external_id = %external_id,
            error = %error,
            "Entity not reconciled"
        );
        self.failures.push(Failure {
            kind,
            external_id,
            reason: error.to_string(),
        });
    }

    /// Directory mutations issued (or planned, when read-only) by the pass.
    /// Quota writes are reported separately.
    pub fn mutations(&self) -> usize {
        self.identities.mutations()
            + self.groups.mutations()
            + self.memberships.granted
            + self.memberships.revoked
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self
                .quotas
                .iter()
                .all(|q| q.changes.iter().all(|c| !c.outcome.is_rejected()))
    }
}
