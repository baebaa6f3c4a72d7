//! Outcome of a single quota write or convergence step.

use std::fmt;

use roster_core::models::feed::UpstreamQuota;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No value was supplied.
    NoValue,
    /// The requested value already equals the current limit.
    Unchanged,
    /// The quota name is recognised but no domain owns it.
    NotManaged,
    /// Upstream field without a backend equivalent.
    Unsupported,
    /// Deprecated upstream alias shadowed by its canonical field.
    Superseded,
    /// The write was accepted but suppressed by read-only mode.
    ReadOnly,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoValue => "no value",
            Self::Unchanged => "unchanged",
            Self::NotManaged => "not managed",
            Self::Unsupported => "unsupported",
            Self::Superseded => "superseded by canonical field",
            Self::ReadOnly => "read-only",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuotaOutcome {
    Applied { previous: i64, value: i64 },
    Skipped { reason: SkipReason },
    Rejected { reason: String },
}

impl QuotaOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Result of converging one upstream quota field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaChange {
    pub upstream: UpstreamQuota,
    /// Backend quota name, if the field maps to one.
    pub quota: Option<&'static str>,
    pub outcome: QuotaOutcome,
}
