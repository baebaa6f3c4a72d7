//! Mapping of upstream feed quota fields onto backend quota names.
//!
//! Upstream limits are expressed in feed units; `factor` converts them to
//! backend units (RAM is declared in GiB and enforced in MiB). Deprecated
//! upstream fields resolve to their canonical field and are only honoured
//! when the canonical field is absent from the record.

use std::collections::BTreeMap;

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::feed::UpstreamQuota;
use roster_core::models::quota::{UNLIMITED, validate_quota_value};

use crate::outcome::SkipReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaTarget {
    Backend { name: &'static str, factor: i64 },
    AliasOf(UpstreamQuota),
    Unsupported,
}

pub fn target(quota: UpstreamQuota) -> QuotaTarget {
    use UpstreamQuota::*;

    match quota {
        VolumeLimit => QuotaTarget::Backend {
            name: "gigabytes",
            factor: 1,
        },
        DiskSpace => QuotaTarget::AliasOf(VolumeLimit),
        VolumeCounter => QuotaTarget::Backend {
            name: "volumes",
            factor: 1,
        },
        NumberOfVms => QuotaTarget::Backend {
            name: "instances",
            factor: 1,
        },
        RamLimit => QuotaTarget::Backend {
            name: "ram",
            factor: 1024,
        },
        CoresLimit => QuotaTarget::Backend {
            name: "cores",
            factor: 1,
        },
        NumberOfCpus => QuotaTarget::AliasOf(CoresLimit),
        ObjectStorage => QuotaTarget::Backend {
            name: "object_storage",
            factor: 1,
        },
        SpecialPurposeHardware => QuotaTarget::Backend {
            name: "special_purpose_hardware",
            factor: 1,
        },
        RamPerVm | FloatingIps | Snapshots => QuotaTarget::Unsupported,
    }
}

/// One upstream field after mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Quota {
        upstream: UpstreamQuota,
        name: &'static str,
        value: i64,
    },
    Skipped {
        upstream: UpstreamQuota,
        reason: SkipReason,
    },
}

/// Scale an upstream value into backend units, keeping the unlimited
/// sentinel intact.
pub fn scale(value: i64, factor: i64) -> RosterResult<i64> {
    let value = validate_quota_value(value)?;
    if value == UNLIMITED {
        return Ok(UNLIMITED);
    }
    value.checked_mul(factor).ok_or_else(|| {
        RosterError::validation(format!("quota value {value} overflows when scaled by {factor}"))
    })
}

/// Resolve every upstream field of a group record.
///
/// Returns per-field results in a stable order; invalid values are
/// reported as errors for that field only.
pub fn resolve(
    quotas: &BTreeMap<UpstreamQuota, i64>,
) -> Vec<(UpstreamQuota, RosterResult<Resolved>)> {
    quotas
        .iter()
        .map(|(&upstream, &value)| (upstream, resolve_one(quotas, upstream, value)))
        .collect()
}

fn resolve_one(
    quotas: &BTreeMap<UpstreamQuota, i64>,
    upstream: UpstreamQuota,
    value: i64,
) -> RosterResult<Resolved> {
    let mapped = match target(upstream) {
        QuotaTarget::AliasOf(canonical) if quotas.contains_key(&canonical) => {
            return Ok(Resolved::Skipped {
                upstream,
                reason: SkipReason::Superseded,
            });
        }
        QuotaTarget::AliasOf(canonical) => target(canonical),
        other => other,
    };

    match mapped {
        QuotaTarget::Backend { name, factor } => Ok(Resolved::Quota {
            upstream,
            name,
            value: scale(value, factor)?,
        }),
        _ => Ok(Resolved::Skipped {
            upstream,
            reason: SkipReason::Unsupported,
        }),
    }
}
