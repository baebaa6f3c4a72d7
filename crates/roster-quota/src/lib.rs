//! Roster Quota: uniform get/check/set access to quotas owned by several
//! independent quota domains.
//!
//! - [`QuotaComponent`]: one domain's quotas for one group, cached
//! - [`QuotaManager`]: name-to-domain dispatch over the three components
//! - [`QuotaFactory`]: builds a fresh manager per group
//! - [`upstream`]: maps upstream feed quota fields onto backend quotas

pub mod component;
pub mod factory;
pub mod manager;
pub mod outcome;
pub mod upstream;

pub use component::QuotaComponent;
pub use factory::{QuotaConnections, QuotaFactory};
pub use manager::{QuotaManager, quota_domain};
pub use outcome::{QuotaChange, QuotaOutcome, SkipReason};
