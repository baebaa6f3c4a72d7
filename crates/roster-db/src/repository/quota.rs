//! SurrealDB implementation of [`QuotaBackend`].
//!
//! One backend instance serves one quota domain. Groups without explicit
//! rows see the domain's default limits; rows override them per name.

use std::collections::HashMap;

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::quota::{QuotaDomain, QuotaReading, validate_quota_value};
use roster_core::repository::QuotaBackend;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;

use crate::error::DbError;

/// Default limits applied to every group, per domain.
pub fn default_limits(domain: QuotaDomain) -> &'static [(&'static str, i64)] {
    match domain {
        QuotaDomain::Compute => &[
            ("cores", 20),
            ("fixed_ips", -1),
            ("floating_ips", 10),
            ("injected_file_content_bytes", 10_240),
            ("injected_file_path_bytes", 255),
            ("injected_files", 5),
            ("instances", 10),
            ("key_pairs", 100),
            ("metadata_items", 128),
            ("ram", 51_200),
            ("security_group_rules", 20),
            ("security_groups", 10),
            ("server_group_members", 10),
            ("server_groups", 10),
        ],
        QuotaDomain::BlockStorage => &[
            ("backup_gigabytes", 1_000),
            ("backups", 10),
            ("gigabytes", 1_000),
            ("groups", 10),
            ("per_volume_gigabytes", -1),
            ("snapshots", 10),
            ("volumes", 10),
        ],
        QuotaDomain::Network => &[
            ("floatingip", 50),
            ("network", 100),
            ("port", 500),
            ("rbac_policy", 10),
            ("router", 10),
            ("security_group", 10),
            ("security_group_rule", 100),
            ("subnet", 100),
            ("subnetpool", -1),
        ],
    }
}

#[derive(Debug, SurrealValue)]
struct QuotaRow {
    name: String,
    quota_limit: i64,
    in_use: i64,
    reserved: i64,
}

#[derive(Clone)]
pub struct SurrealQuotaBackend<C: Connection> {
    db: Surreal<C>,
    domain: QuotaDomain,
}

impl<C: Connection> SurrealQuotaBackend<C> {
    pub fn new(db: Surreal<C>, domain: QuotaDomain) -> Self {
        Self { db, domain }
    }

    pub fn domain(&self) -> QuotaDomain {
        self.domain
    }

    fn record_key(&self, group_id: &str, name: &str) -> String {
        format!("{group_id}/{}/{name}", self.domain)
    }

    async fn known_reading(&self, group_id: &str, name: &str) -> RosterResult<QuotaReading> {
        self.get_quotas(group_id)
            .await?
            .remove(name)
            .ok_or_else(|| {
                RosterError::validation(format!("unknown quota {name} in domain {}", self.domain))
            })
    }

    /// Record resource consumption for a group. Used by tooling and tests
    /// standing in for the resource services that normally report usage.
    pub async fn record_usage(
        &self,
        group_id: &str,
        name: &str,
        in_use: i64,
        reserved: i64,
    ) -> RosterResult<()> {
        let current = self.known_reading(group_id, name).await?;

        self.db
            .query(
                "UPSERT type::record('quota', $key) SET \
                 group_id = $group_id, domain = $domain, name = $name, \
                 quota_limit = $quota_limit, in_use = $in_use, reserved = $reserved",
            )
            .bind(("key", self.record_key(group_id, name)))
            .bind(("group_id", group_id.to_string()))
            .bind(("domain", self.domain.as_str()))
            .bind(("name", name.to_string()))
            .bind(("quota_limit", current.limit))
            .bind(("in_use", in_use))
            .bind(("reserved", reserved))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }
}

impl<C: Connection> QuotaBackend for SurrealQuotaBackend<C> {
    async fn get_quotas(&self, group_id: &str) -> RosterResult<HashMap<String, QuotaReading>> {
        let mut quotas: HashMap<String, QuotaReading> = default_limits(self.domain)
            .iter()
            .map(|&(name, limit)| (name.to_string(), QuotaReading::new(limit, 0, 0)))
            .collect();

        let mut result = self
            .db
            .query(
                "SELECT name, quota_limit, in_use, reserved FROM quota \
                 WHERE group_id = $group_id AND domain = $domain",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("domain", self.domain.as_str()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<QuotaRow> = result.take(0).map_err(DbError::from)?;
        for row in rows {
            quotas.insert(
                row.name,
                QuotaReading::new(row.quota_limit, row.in_use, row.reserved),
            );
        }

        debug!(
            domain = %self.domain,
            group_id,
            count = quotas.len(),
            "Quotas read"
        );
        Ok(quotas)
    }

    async fn update_quota(&self, group_id: &str, name: &str, value: i64) -> RosterResult<()> {
        let value = validate_quota_value(value)?;
        let current = self.known_reading(group_id, name).await?;

        self.db
            .query(
                "UPSERT type::record('quota', $key) SET \
                 group_id = $group_id, domain = $domain, name = $name, \
                 quota_limit = $quota_limit, in_use = $in_use, reserved = $reserved",
            )
            .bind(("key", self.record_key(group_id, name)))
            .bind(("group_id", group_id.to_string()))
            .bind(("domain", self.domain.as_str()))
            .bind(("name", name.to_string()))
            .bind(("quota_limit", value))
            .bind(("in_use", current.in_use))
            .bind(("reserved", current.reserved))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }
}
