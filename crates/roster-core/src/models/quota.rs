//! Quota vocabulary shared by the quota engine and its backends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RosterError, RosterResult};

/// Sentinel limit meaning "no limit".
pub const UNLIMITED: i64 = -1;

/// The independently owned resource-limit subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDomain {
    Compute,
    BlockStorage,
    Network,
}

impl QuotaDomain {
    pub const ALL: [QuotaDomain; 3] = [Self::Compute, Self::BlockStorage, Self::Network];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::BlockStorage => "block_storage",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for QuotaDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One quota as reported by its owning domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaReading {
    /// Current limit, [`UNLIMITED`] for no limit.
    pub limit: i64,
    pub in_use: i64,
    pub reserved: i64,
}

impl QuotaReading {
    pub fn new(limit: i64, in_use: i64, reserved: i64) -> Self {
        Self {
            limit,
            in_use,
            reserved,
        }
    }

    /// Lowest limit that still covers current consumption.
    pub fn floor(&self, consider_reserved: bool) -> i64 {
        if consider_reserved {
            self.in_use + self.reserved
        } else {
            self.in_use
        }
    }
}

/// Reject negative quota values other than [`UNLIMITED`].
pub fn validate_quota_value(value: i64) -> RosterResult<i64> {
    if value < UNLIMITED {
        return Err(RosterError::validation(format!(
            "quota value {value} is negative and not the unlimited sentinel"
        )));
    }
    Ok(value)
}

/// Convert an externally supplied quota value.
pub fn parse_quota_value(raw: &str) -> RosterResult<i64> {
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| RosterError::validation(format!("invalid quota value '{raw}': {e}")))?;
    validate_quota_value(value)
}
