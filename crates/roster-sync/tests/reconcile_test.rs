//! Reconciliation passes against the in-memory SurrealDB directory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::feed::{FeedGroup, FeedIdentity, UpstreamQuota};
use roster_core::models::group::{CreateGroup, Group, UpdateGroup};
use roster_core::models::identity::{CreateIdentity, Identity, UpdateIdentity};
use roster_core::models::quota::QuotaDomain;
use roster_core::models::role::{Role, RoleAssignment};
use roster_core::repository::{
    DirectoryScope, GroupRepository, IdentityRepository, QuotaBackend, RoleRepository,
};
use roster_db::{SurrealDirectory, SurrealQuotaBackend};
use roster_quota::{QuotaConnections, QuotaFactory, QuotaOutcome};
use roster_sync::{EntityKind, SyncConfig, SyncEngine};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

/// Directory wrapper counting every mutating call.
#[derive(Clone)]
struct Counting {
    inner: SurrealDirectory<Db>,
    writes: Arc<AtomicUsize>,
}

impl Counting {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl IdentityRepository for Counting {
    async fn list_identities(&self, scope: &DirectoryScope) -> RosterResult<Vec<Identity>> {
        self.inner.list_identities(scope).await
    }
    async fn create_identity(
        &self,
        scope: &DirectoryScope,
        input: CreateIdentity,
    ) -> RosterResult<Identity> {
        self.bump();
        self.inner.create_identity(scope, input).await
    }
    async fn update_identity(&self, id: &str, input: UpdateIdentity) -> RosterResult<Identity> {
        self.bump();
        self.inner.update_identity(id, input).await
    }
    async fn delete_identity(&self, id: &str) -> RosterResult<()> {
        self.bump();
        self.inner.delete_identity(id).await
    }
}

impl GroupRepository for Counting {
    async fn list_groups(&self, scope: &DirectoryScope) -> RosterResult<Vec<Group>> {
        self.inner.list_groups(scope).await
    }
    async fn create_group(&self, scope: &DirectoryScope, input: CreateGroup) -> RosterResult<Group> {
        self.bump();
        self.inner.create_group(scope, input).await
    }
    async fn update_group(&self, id: &str, input: UpdateGroup) -> RosterResult<Group> {
        self.bump();
        self.inner.update_group(id, input).await
    }
    async fn delete_group(&self, id: &str) -> RosterResult<()> {
        self.bump();
        self.inner.delete_group(id).await
    }
}

impl RoleRepository for Counting {
    async fn list_roles(&self) -> RosterResult<Vec<Role>> {
        self.inner.list_roles().await
    }
    async fn create_role(&self, name: &str) -> RosterResult<Role> {
        self.bump();
        self.inner.create_role(name).await
    }
    async fn grant_role(&self, role: &str, identity: &str, group: &str) -> RosterResult<()> {
        self.bump();
        self.inner.grant_role(role, identity, group).await
    }
    async fn revoke_role(&self, role: &str, identity: &str, group: &str) -> RosterResult<()> {
        self.bump();
        self.inner.revoke_role(role, identity, group).await
    }
    async fn list_role_assignments(&self, group: &str) -> RosterResult<Vec<RoleAssignment>> {
        self.inner.list_role_assignments(group).await
    }
}

type Engine = SyncEngine<Counting, SurrealQuotaBackend<Db>>;

struct Harness {
    db: Surreal<Db>,
    directory: Counting,
}

impl Harness {
    async fn new() -> Self {
        let db = Surreal::new::<Mem>(()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        roster_db::run_migrations(&db).await.unwrap();
        let directory = Counting {
            inner: SurrealDirectory::new(db.clone()),
            writes: Arc::new(AtomicUsize::new(0)),
        };
        Self { db, directory }
    }

    fn quota(&self, domain: QuotaDomain) -> SurrealQuotaBackend<Db> {
        SurrealQuotaBackend::new(self.db.clone(), domain)
    }

    fn factory(&self) -> QuotaFactory<SurrealQuotaBackend<Db>> {
        QuotaFactory::new(QuotaConnections {
            compute: self.quota(QuotaDomain::Compute),
            block_storage: self.quota(QuotaDomain::BlockStorage),
            network: self.quota(QuotaDomain::Network),
        })
    }

    async fn engine(&self, config: SyncConfig) -> Engine {
        SyncEngine::connect(self.directory.clone(), Some(self.factory()), config)
            .await
            .unwrap()
    }

    async fn identities(&self) -> BTreeMap<String, Identity> {
        self.directory
            .list_identities(&DirectoryScope::default())
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.external_id.clone(), i))
            .collect()
    }

    async fn group(&self, external_id: &str) -> Option<Group> {
        self.directory
            .list_groups(&DirectoryScope::default())
            .await
            .unwrap()
            .into_iter()
            .find(|g| g.external_id == external_id)
    }

    async fn members(&self, engine: &Engine, group: &str) -> BTreeSet<String> {
        engine
            .snapshot()
            .await
            .unwrap()
            .group(group)
            .map(|state| state.members.clone())
            .unwrap_or_default()
    }
}

fn config() -> SyncConfig {
    SyncConfig {
        create_default_role: true,
        support_quotas: true,
        ..SyncConfig::default()
    }
}

fn person(id: &str, enabled: bool) -> FeedIdentity {
    FeedIdentity {
        external_id: id.into(),
        display_name: format!("{id}@example.org"),
        secondary_name: None,
        email: Some(format!("{id}@example.org")),
        public_key: None,
        enabled,
    }
}

fn project(id: &str, members: &[&str]) -> FeedGroup {
    FeedGroup {
        external_id: id.into(),
        name: format!("project-{id}"),
        description: None,
        members: members.iter().map(|m| m.to_string()).collect(),
        quotas: BTreeMap::new(),
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn omitted_identity_is_soft_deleted() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    let report = engine
        .reconcile(&[person("1", true), person("2", false)], &[])
        .await
        .unwrap();
    assert_eq!(report.identities.created, 2);

    let before = h.identities().await;
    assert!(!before["2"].enabled);

    let report = engine.reconcile(&[person("1", true)], &[]).await.unwrap();
    assert_eq!(report.identities.soft_deleted, 1);
    assert_eq!(report.identities.unchanged, 1);

    let after = h.identities().await;
    assert!(after["2"].deleted);
    assert!(!after["2"].enabled);
    assert_eq!(after["1"], before["1"]);
}

#[tokio::test]
async fn membership_follows_symmetric_difference() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;
    let people = [person("1", true), person("2", true), person("3", true)];

    engine
        .reconcile(&people, &[project("g1", &["1", "2"])])
        .await
        .unwrap();
    assert_eq!(h.members(&engine, "g1").await, set(&["1", "2"]));

    let report = engine
        .reconcile(&people, &[project("g1", &["2", "3"])])
        .await
        .unwrap();
    assert_eq!(report.memberships.granted, 1);
    assert_eq!(report.memberships.revoked, 1);
    assert_eq!(report.groups.updated, 1);
    assert_eq!(h.members(&engine, "g1").await, set(&["2", "3"]));
}

#[tokio::test]
async fn member_order_is_irrelevant() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;
    let people = [person("a", true), person("b", true), person("c", true)];

    engine
        .reconcile(&people, &[project("g1", &["a", "b", "c"])])
        .await
        .unwrap();
    let report = engine
        .reconcile(&people, &[project("g1", &["c", "a", "b"])])
        .await
        .unwrap();

    assert_eq!(report.mutations(), 0);
    assert_eq!(report.groups.unchanged, 1);
}

#[tokio::test]
async fn membership_round_trip_restores_set() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;
    let people = [
        person("a", true),
        person("b", true),
        person("c", true),
        person("d", true),
    ];

    engine
        .reconcile(&people, &[project("g1", &["a", "b", "c"])])
        .await
        .unwrap();
    engine
        .reconcile(&people, &[project("g1", &["b", "c", "d"])])
        .await
        .unwrap();
    engine
        .reconcile(&people, &[project("g1", &["c", "b", "a"])])
        .await
        .unwrap();

    assert_eq!(h.members(&engine, "g1").await, set(&["a", "b", "c"]));
}

#[tokio::test]
async fn second_pass_issues_no_mutations() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;
    let people = [person("1", true), person("2", true), person("3", false)];
    let mut g2 = project("g2", &["3"]);
    g2.description = Some("second".into());
    g2.quotas = BTreeMap::from([(UpstreamQuota::CoresLimit, 32)]);
    let groups = [project("g1", &["1", "2"]), g2];

    let first = engine.reconcile(&people, &groups).await.unwrap();
    assert!(first.mutations() > 0);
    assert!(first.is_clean());

    let writes = h.directory.writes();
    let second = engine.reconcile(&people, &groups).await.unwrap();
    assert_eq!(second.mutations(), 0);
    assert!(
        second
            .quotas
            .iter()
            .flat_map(|q| &q.changes)
            .all(|c| !c.outcome.is_applied())
    );
    assert_eq!(h.directory.writes(), writes);
}

#[tokio::test]
async fn tombstone_invariant_holds_after_removal() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine
        .reconcile(
            &[person("1", true), person("2", true)],
            &[project("g1", &["1"]), project("g2", &["2"])],
        )
        .await
        .unwrap();
    engine.reconcile(&[], &[]).await.unwrap();

    for identity in h.identities().await.values() {
        assert!(identity.deleted);
        assert!(!identity.enabled);
    }
    for id in ["g1", "g2"] {
        let group = h.group(id).await.unwrap();
        assert!(group.scratched);
        assert!(!group.enabled);
    }
}

#[tokio::test]
async fn reappearing_entities_are_revived() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine
        .reconcile(&[person("1", true)], &[project("g1", &[])])
        .await
        .unwrap();
    engine.reconcile(&[], &[]).await.unwrap();

    let report = engine
        .reconcile(&[person("1", true)], &[project("g1", &["1"])])
        .await
        .unwrap();
    assert_eq!(report.identities.revived, 1);
    assert_eq!(report.groups.revived, 1);
    assert_eq!(report.memberships.granted, 1);

    let identity = &h.identities().await["1"];
    assert!(identity.enabled && !identity.deleted);
    let group = h.group("g1").await.unwrap();
    assert!(group.enabled && !group.scratched);
}

#[tokio::test]
async fn unknown_member_is_reported_and_pass_continues() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    let report = engine
        .reconcile(
            &[person("1", true)],
            &[project("g1", &["1", "ghost"]), project("g2", &["1"])],
        )
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, EntityKind::Membership);
    assert!(report.failures[0].external_id.contains("ghost"));
    assert_eq!(report.groups.created, 2);
    assert_eq!(h.members(&engine, "g1").await, set(&["1"]));
    assert_eq!(h.members(&engine, "g2").await, set(&["1"]));
}

#[tokio::test]
async fn duplicate_feed_records_are_reported() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    let report = engine
        .reconcile(&[person("1", true), person("1", false)], &[])
        .await
        .unwrap();

    assert_eq!(report.identities.created, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, EntityKind::Identity);
}

#[tokio::test]
async fn terminate_requires_scratched_group() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine
        .reconcile(&[], &[project("g1", &[])])
        .await
        .unwrap();
    let err = engine.terminate_group("g1").await.unwrap_err();
    assert!(matches!(err, RosterError::Precondition { .. }));

    engine.reconcile(&[], &[]).await.unwrap();
    engine.terminate_group("g1").await.unwrap();
    assert!(h.group("g1").await.is_none());

    assert!(matches!(
        engine.terminate_group("g1").await,
        Err(RosterError::NotFound { .. })
    ));
}

#[tokio::test]
async fn terminate_requires_deleted_identity() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine.reconcile(&[person("1", true)], &[]).await.unwrap();
    assert!(matches!(
        engine.terminate_identity("1").await,
        Err(RosterError::Precondition { .. })
    ));

    engine.reconcile(&[], &[]).await.unwrap();
    engine.terminate_identity("1").await.unwrap();
    assert!(h.identities().await.is_empty());
}

#[tokio::test]
async fn sweep_removes_only_tombstones() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine
        .reconcile(
            &[person("1", true), person("2", true)],
            &[project("g1", &["1", "2"]), project("g2", &["2"])],
        )
        .await
        .unwrap();
    engine
        .reconcile(&[person("1", true)], &[project("g1", &["1"])])
        .await
        .unwrap();

    let sweep = engine.terminate_soft_deleted().await.unwrap();
    assert_eq!(sweep.identities.terminated, 1);
    assert_eq!(sweep.groups.terminated, 1);

    let identities = h.identities().await;
    assert_eq!(identities.keys().collect::<Vec<_>>(), vec!["1"]);
    assert!(h.group("g2").await.is_none());
    assert_eq!(h.members(&engine, "g1").await, set(&["1"]));
}

#[tokio::test]
async fn reconcile_never_terminates() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine.reconcile(&[person("1", true)], &[]).await.unwrap();
    engine.reconcile(&[], &[]).await.unwrap();
    engine.reconcile(&[], &[]).await.unwrap();

    assert!(h.identities().await["1"].deleted);
}

#[tokio::test]
async fn read_only_pass_reports_without_writing() {
    let h = Harness::new().await;
    // Create the role up front so the read-only engine can resolve it.
    h.directory.inner.create_role("_member_").await.unwrap();
    let engine = h
        .engine(SyncConfig {
            read_only: true,
            ..config()
        })
        .await;

    let mut group = project("g1", &["1"]);
    group.quotas = BTreeMap::from([(UpstreamQuota::NumberOfVms, 20)]);
    let report = engine
        .reconcile(&[person("1", true)], &[group])
        .await
        .unwrap();

    assert!(report.read_only);
    assert_eq!(report.identities.created, 1);
    assert_eq!(report.groups.created, 1);
    assert_eq!(report.memberships.granted, 1);
    assert!(report.failures.is_empty());
    assert_eq!(h.directory.writes(), 0);
    assert!(h.identities().await.is_empty());
    assert_eq!(
        report.quotas[0].changes[0].outcome,
        QuotaOutcome::skipped(roster_quota::SkipReason::ReadOnly)
    );
}

#[tokio::test]
async fn missing_role_fails_unless_creation_allowed() {
    let h = Harness::new().await;

    let err = SyncEngine::connect(
        h.directory.clone(),
        Some(h.factory()),
        SyncConfig::default(),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, RosterError::NotFound { ref entity, .. } if entity == "role"));

    let read_only = h
        .engine(SyncConfig {
            read_only: true,
            ..config()
        })
        .await;
    assert_eq!(read_only.role_id(), roster_sync::config::READ_ONLY_ROLE_ID);
    assert!(h.directory.list_roles().await.unwrap().is_empty());

    let engine = h.engine(config()).await;
    let roles = h.directory.list_roles().await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].id, engine.role_id());
    assert_eq!(roles[0].name, "_member_");
}

#[tokio::test]
async fn quotas_converge_for_listed_groups() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    let mut group = project("g1", &[]);
    group.quotas = BTreeMap::from([
        (UpstreamQuota::RamLimit, 64),
        (UpstreamQuota::VolumeLimit, 500),
        (UpstreamQuota::RamPerVm, 8),
    ]);
    let report = engine.reconcile(&[], &[group]).await.unwrap();
    assert_eq!(report.quotas.len(), 1);

    let directory_id = h.group("g1").await.unwrap().directory_id;
    let compute = h.quota(QuotaDomain::Compute).get_quotas(&directory_id).await.unwrap();
    let storage = h
        .quota(QuotaDomain::BlockStorage)
        .get_quotas(&directory_id)
        .await
        .unwrap();
    assert_eq!(compute["ram"].limit, 65_536);
    assert_eq!(storage["gigabytes"].limit, 500);
}

#[tokio::test]
async fn quota_raise_reaches_unchanged_group() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;
    let people = [person("1", true)];

    let mut group = project("g1", &["1"]);
    group.quotas = BTreeMap::from([(UpstreamQuota::CoresLimit, 30)]);
    engine.reconcile(&people, &[group.clone()]).await.unwrap();

    group.quotas = BTreeMap::from([(UpstreamQuota::CoresLimit, 64)]);
    let report = engine.reconcile(&people, &[group]).await.unwrap();

    assert_eq!(report.groups.unchanged, 1);
    assert_eq!(report.mutations(), 0);
    assert!(report.quotas[0].changes[0].outcome.is_applied());

    let directory_id = h.group("g1").await.unwrap().directory_id;
    let compute = h.quota(QuotaDomain::Compute).get_quotas(&directory_id).await.unwrap();
    assert_eq!(compute["cores"].limit, 64);
}

#[tokio::test]
async fn soft_deleted_identity_loses_membership() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine
        .reconcile(
            &[person("1", true), person("2", true)],
            &[project("g1", &["1", "2"])],
        )
        .await
        .unwrap();

    // "2" leaves the identity feed but is still listed on the group.
    let report = engine
        .reconcile(&[person("1", true)], &[project("g1", &["1", "2"])])
        .await
        .unwrap();

    assert_eq!(report.identities.soft_deleted, 1);
    assert_eq!(report.memberships.revoked, 1);
    assert!(report.failures.is_empty());
    assert!(h.identities().await["2"].deleted);
    assert_eq!(h.members(&engine, "g1").await, set(&["1"]));

    let again = engine
        .reconcile(&[person("1", true)], &[project("g1", &["1", "2"])])
        .await
        .unwrap();
    assert_eq!(again.mutations(), 0);

    // Revival restores the grant.
    let revived = engine
        .reconcile(
            &[person("1", true), person("2", true)],
            &[project("g1", &["1", "2"])],
        )
        .await
        .unwrap();
    assert_eq!(revived.identities.revived, 1);
    assert_eq!(revived.memberships.granted, 1);
    assert_eq!(h.members(&engine, "g1").await, set(&["1", "2"]));
}

#[tokio::test]
async fn quota_conflict_does_not_block_group() {
    let h = Harness::new().await;
    let engine = h.engine(config()).await;

    engine
        .reconcile(&[person("1", true)], &[project("g1", &[])])
        .await
        .unwrap();
    let directory_id = h.group("g1").await.unwrap().directory_id;
    h.quota(QuotaDomain::Compute)
        .record_usage(&directory_id, "cores", 12, 0)
        .await
        .unwrap();

    let mut group = project("g1", &["1"]);
    group.quotas = BTreeMap::from([
        (UpstreamQuota::CoresLimit, 10),
        (UpstreamQuota::NumberOfVms, 4),
    ]);
    let report = engine.reconcile(&[person("1", true)], &[group]).await.unwrap();

    assert_eq!(report.memberships.granted, 1);
    let changes = &report.quotas[0].changes;
    let cores = changes
        .iter()
        .find(|c| c.upstream == UpstreamQuota::CoresLimit)
        .unwrap();
    assert!(cores.outcome.is_rejected());
    let vms = changes
        .iter()
        .find(|c| c.upstream == UpstreamQuota::NumberOfVms)
        .unwrap();
    assert!(vms.outcome.is_applied());
    assert!(!report.is_clean());

    let compute = h.quota(QuotaDomain::Compute).get_quotas(&directory_id).await.unwrap();
    assert_eq!(compute["cores"].limit, 20);
    assert_eq!(compute["instances"].limit, 4);
    assert_eq!(h.members(&engine, "g1").await, set(&["1"]));
}
