//! Per-group quota access across all quota domains.

use std::collections::BTreeMap;

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::feed::UpstreamQuota;
use roster_core::models::quota::QuotaDomain;
use roster_core::repository::QuotaBackend;
use tracing::{debug, info, warn};

use crate::component::QuotaComponent;
use crate::outcome::{QuotaChange, QuotaOutcome, SkipReason};
use crate::upstream::{self, Resolved};

/// Known quota names and the domain that owns each.
///
/// Names mapped to `None` are recognised but have no owning domain; they
/// always pass checks and are never written.
static QUOTA_TABLE: &[(&str, Option<QuotaDomain>)] = &[
    ("cores", Some(QuotaDomain::Compute)),
    ("fixed_ips", Some(QuotaDomain::Compute)),
    ("floating_ips", Some(QuotaDomain::Compute)),
    ("injected_file_content_bytes", Some(QuotaDomain::Compute)),
    ("injected_file_path_bytes", Some(QuotaDomain::Compute)),
    ("injected_files", Some(QuotaDomain::Compute)),
    ("instances", Some(QuotaDomain::Compute)),
    ("key_pairs", Some(QuotaDomain::Compute)),
    ("metadata_items", Some(QuotaDomain::Compute)),
    ("ram", Some(QuotaDomain::Compute)),
    ("security_group_rules", Some(QuotaDomain::Compute)),
    ("security_groups", Some(QuotaDomain::Compute)),
    ("server_group_members", Some(QuotaDomain::Compute)),
    ("server_groups", Some(QuotaDomain::Compute)),
    ("backup_gigabytes", Some(QuotaDomain::BlockStorage)),
    ("backups", Some(QuotaDomain::BlockStorage)),
    ("gigabytes", Some(QuotaDomain::BlockStorage)),
    ("groups", Some(QuotaDomain::BlockStorage)),
    ("per_volume_gigabytes", Some(QuotaDomain::BlockStorage)),
    ("snapshots", Some(QuotaDomain::BlockStorage)),
    ("volumes", Some(QuotaDomain::BlockStorage)),
    ("floatingip", Some(QuotaDomain::Network)),
    ("network", Some(QuotaDomain::Network)),
    ("port", Some(QuotaDomain::Network)),
    ("rbac_policy", Some(QuotaDomain::Network)),
    ("router", Some(QuotaDomain::Network)),
    ("security_group", Some(QuotaDomain::Network)),
    ("security_group_rule", Some(QuotaDomain::Network)),
    ("subnet", Some(QuotaDomain::Network)),
    ("subnetpool", Some(QuotaDomain::Network)),
    ("object_storage", None),
    ("special_purpose_hardware", None),
];

/// Owning domain of a quota name; `Ok(None)` for recognised names without
/// an owner, `Err` for names not in the table.
pub fn quota_domain(name: &str) -> RosterResult<Option<QuotaDomain>> {
    QUOTA_TABLE
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, domain)| *domain)
        .ok_or_else(|| RosterError::validation(format!("quota name {name} is invalid")))
}

/// Quota names owned by `domain`.
pub fn quota_names(domain: QuotaDomain) -> impl Iterator<Item = &'static str> {
    QUOTA_TABLE
        .iter()
        .filter(move |(_, owner)| *owner == Some(domain))
        .map(|(name, _)| *name)
}

/// Quota access for one group. Built fresh per group and pass by
/// [`QuotaFactory`](crate::QuotaFactory); never shared between passes.
pub struct QuotaManager<B: QuotaBackend> {
    group_id: String,
    compute: QuotaComponent<B>,
    block_storage: QuotaComponent<B>,
    network: QuotaComponent<B>,
}

impl<B: QuotaBackend> QuotaManager<B> {
    pub fn new(group_id: impl Into<String>, compute: B, block_storage: B, network: B) -> Self {
        let group_id = group_id.into();
        Self {
            compute: QuotaComponent::new(QuotaDomain::Compute, group_id.clone(), compute),
            block_storage: QuotaComponent::new(
                QuotaDomain::BlockStorage,
                group_id.clone(),
                block_storage,
            ),
            network: QuotaComponent::new(QuotaDomain::Network, group_id.clone(), network),
            group_id,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn component(&self, domain: QuotaDomain) -> &QuotaComponent<B> {
        match domain {
            QuotaDomain::Compute => &self.compute,
            QuotaDomain::BlockStorage => &self.block_storage,
            QuotaDomain::Network => &self.network,
        }
    }

    fn component_for(&self, name: &str) -> RosterResult<Option<&QuotaComponent<B>>> {
        Ok(quota_domain(name)?.map(|domain| self.component(domain)))
    }

    /// Current limit, `None` for names without an owning domain.
    pub async fn get_current_quota(&self, name: &str) -> RosterResult<Option<i64>> {
        match self.component_for(name)? {
            Some(component) => component.get_value(name).await.map(Some),
            None => Ok(None),
        }
    }

    /// Current usage including reservations, `None` for names without an
    /// owning domain.
    pub async fn get_current_in_use(&self, name: &str) -> RosterResult<Option<i64>> {
        match self.component_for(name)? {
            Some(component) => component.get_in_use(name, true).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn check_value(&self, name: &str, value: Option<i64>) -> RosterResult<bool> {
        match self.component_for(name)? {
            Some(component) => component.check_value(name, value).await,
            None => Ok(true),
        }
    }

    /// Set a quota. Fails with [`RosterError::QuotaConflict`] when the value
    /// is below current usage.
    pub async fn set_value(&self, name: &str, value: Option<i64>) -> RosterResult<QuotaOutcome> {
        let Some(component) = self.component_for(name)? else {
            return Ok(QuotaOutcome::skipped(SkipReason::NotManaged));
        };
        match value {
            Some(value) => component.set_quota(name, value).await,
            None => Ok(QuotaOutcome::skipped(SkipReason::NoValue)),
        }
    }

    pub async fn flush(&self) {
        for domain in QuotaDomain::ALL {
            self.component(domain).flush().await;
        }
    }

    /// Bring the group's quotas in line with the upstream declaration.
    ///
    /// Every field is handled independently: a rejected or failing field
    /// never stops the remaining ones. With `read_only` set, accepted
    /// changes are reported as skipped instead of written.
    pub async fn converge(
        &self,
        quotas: &BTreeMap<UpstreamQuota, i64>,
        read_only: bool,
    ) -> Vec<QuotaChange> {
        let mut changes = Vec::with_capacity(quotas.len());

        for (upstream, resolved) in upstream::resolve(quotas) {
            let change = match resolved {
                Ok(Resolved::Quota {
                    upstream,
                    name,
                    value,
                }) => QuotaChange {
                    upstream,
                    quota: Some(name),
                    outcome: self.converge_one(name, value, read_only).await,
                },
                Ok(Resolved::Skipped { upstream, reason }) => {
                    debug!(
                        group_id = %self.group_id,
                        upstream = ?upstream,
                        %reason,
                        "Skipping upstream quota"
                    );
                    QuotaChange {
                        upstream,
                        quota: None,
                        outcome: QuotaOutcome::skipped(reason),
                    }
                }
                Err(e) => QuotaChange {
                    upstream,
                    quota: None,
                    outcome: QuotaOutcome::Rejected {
                        reason: e.to_string(),
                    },
                },
            };

            if let QuotaOutcome::Rejected { reason } = &change.outcome {
                warn!(
                    group_id = %self.group_id,
                    upstream = ?change.upstream,
                    quota = change.quota,
                    %reason,
                    "Quota not converged"
                );
            }
            changes.push(change);
        }

        changes
    }

    async fn converge_one(&self, name: &str, value: i64, read_only: bool) -> QuotaOutcome {
        if read_only {
            return self.plan_one(name, value).await;
        }
        match self.set_value(name, Some(value)).await {
            Ok(outcome) => outcome,
            Err(e) => QuotaOutcome::Rejected {
                reason: e.to_string(),
            },
        }
    }

    async fn plan_one(&self, name: &str, value: i64) -> QuotaOutcome {
        let planned = async {
            if !self.check_value(name, Some(value)).await? {
                let in_use = self.get_current_in_use(name).await?.unwrap_or_default();
                return Err(RosterError::QuotaConflict {
                    name: name.to_string(),
                    value,
                    in_use,
                });
            }
            let current = self.get_current_quota(name).await?;
            if current.is_none_or(|current| current == value) {
                return Ok(QuotaOutcome::skipped(SkipReason::Unchanged));
            }
            info!(
                group_id = %self.group_id,
                quota = name,
                current = ?current,
                value,
                "Would update quota (read-only)"
            );
            Ok(QuotaOutcome::skipped(SkipReason::ReadOnly))
        };

        match planned.await {
            Ok(outcome) => outcome,
            Err(e) => QuotaOutcome::Rejected {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve_to_domains() {
        assert_eq!(quota_domain("cores").unwrap(), Some(QuotaDomain::Compute));
        assert_eq!(
            quota_domain("gigabytes").unwrap(),
            Some(QuotaDomain::BlockStorage)
        );
        assert_eq!(quota_domain("router").unwrap(), Some(QuotaDomain::Network));
    }

    #[test]
    fn unowned_names_are_recognised() {
        assert_eq!(quota_domain("object_storage").unwrap(), None);
    }

    #[test]
    fn unknown_names_are_invalid() {
        assert!(matches!(
            quota_domain("bananas"),
            Err(RosterError::Validation { .. })
        ));
    }

    #[test]
    fn every_upstream_target_is_in_the_table() {
        use crate::upstream::{QuotaTarget, target};

        for upstream in [
            UpstreamQuota::VolumeLimit,
            UpstreamQuota::VolumeCounter,
            UpstreamQuota::NumberOfVms,
            UpstreamQuota::RamLimit,
            UpstreamQuota::CoresLimit,
            UpstreamQuota::ObjectStorage,
            UpstreamQuota::SpecialPurposeHardware,
        ] {
            let QuotaTarget::Backend { name, .. } = target(upstream) else {
                panic!("{upstream:?} should map to a backend quota");
            };
            assert!(quota_domain(name).is_ok(), "{name} missing from table");
        }
    }

    #[test]
    fn domain_name_lists_are_disjoint() {
        let compute: Vec<_> = quota_names(QuotaDomain::Compute).collect();
        let network: Vec<_> = quota_names(QuotaDomain::Network).collect();
        assert!(compute.contains(&"ram"));
        assert!(network.contains(&"port"));
        assert!(compute.iter().all(|n| !network.contains(n)));
    }
}
