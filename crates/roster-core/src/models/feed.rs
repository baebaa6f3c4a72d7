//! Canonical upstream records.
//!
//! Feed adapters translate whatever export format they read into these
//! fixed-shape records; the reconciliation engine never sees raw feed data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedIdentity {
    pub external_id: String,
    pub display_name: String,
    pub secondary_name: Option<String>,
    pub email: Option<String>,
    pub public_key: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedGroup {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Member external ids in feed order; compared as a set.
    pub members: Vec<String>,
    /// Upstream quota fields present on the record.
    #[serde(default)]
    pub quotas: BTreeMap<UpstreamQuota, i64>,
}

/// Quota fields the upstream feed may declare on a group.
///
/// Several of these have no backend equivalent or are deprecated aliases;
/// the quota crate owns the mapping onto backend quota names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamQuota {
    /// Block storage in GiB.
    VolumeLimit,
    /// Deprecated alias of `VolumeLimit`.
    DiskSpace,
    /// Number of volumes.
    VolumeCounter,
    NumberOfVms,
    /// RAM in GiB.
    RamLimit,
    /// Deprecated per-VM RAM cap.
    RamPerVm,
    CoresLimit,
    /// Deprecated alias of `CoresLimit`.
    NumberOfCpus,
    FloatingIps,
    Snapshots,
    ObjectStorage,
    SpecialPurposeHardware,
}
