//! Cached access to the quotas of one domain for one group.
//!
//! The cache is filled with a single bulk query on first use and kept
//! until [`QuotaComponent::flush`] is called. A successful write updates
//! only the written entry. The cache cell is guarded by an async mutex
//! held across the backend query, so concurrent readers wait for the
//! first load instead of issuing their own.

use std::collections::HashMap;

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::quota::{QuotaDomain, QuotaReading, UNLIMITED};
use roster_core::repository::QuotaBackend;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::outcome::{QuotaOutcome, SkipReason};

type QuotaCache = Option<HashMap<String, QuotaReading>>;

pub struct QuotaComponent<B: QuotaBackend> {
    domain: QuotaDomain,
    group_id: String,
    backend: B,
    cache: Mutex<QuotaCache>,
}

impl<B: QuotaBackend> QuotaComponent<B> {
    pub fn new(domain: QuotaDomain, group_id: impl Into<String>, backend: B) -> Self {
        Self {
            domain,
            group_id: group_id.into(),
            backend,
            cache: Mutex::new(None),
        }
    }

    pub fn domain(&self) -> QuotaDomain {
        self.domain
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Current limit of `name`.
    pub async fn get_value(&self, name: &str) -> RosterResult<i64> {
        let cache = self.load().await?;
        Ok(self.lookup(&cache, name)?.limit)
    }

    /// Resources currently consumed under `name`, optionally counting
    /// reservations.
    pub async fn get_in_use(&self, name: &str, consider_reserved: bool) -> RosterResult<i64> {
        let cache = self.load().await?;
        Ok(self.lookup(&cache, name)?.floor(consider_reserved))
    }

    /// Whether `value` is acceptable as the new limit of `name`.
    ///
    /// Unknown names are an error even when `value` is `None`.
    pub async fn check_value(&self, name: &str, value: Option<i64>) -> RosterResult<bool> {
        let cache = self.load().await?;
        let reading = self.lookup(&cache, name)?;
        Ok(accepts(&reading, value, true))
    }

    /// Set `name` to `value` if the usage floor allows it.
    ///
    /// Issues at most one backend write; a value equal to the cached limit
    /// is reported as unchanged without contacting the backend.
    pub async fn set_quota(&self, name: &str, value: i64) -> RosterResult<QuotaOutcome> {
        let mut cache = self.load().await?;
        let reading = self.lookup(&cache, name)?;

        debug!(
            domain = %self.domain,
            group_id = %self.group_id,
            quota = name,
            value,
            "Attempting quota update"
        );

        if !accepts(&reading, Some(value), true) {
            return Err(RosterError::QuotaConflict {
                name: name.to_string(),
                value,
                in_use: reading.floor(true),
            });
        }

        if reading.limit == value {
            return Ok(QuotaOutcome::skipped(SkipReason::Unchanged));
        }

        self.backend
            .update_quota(&self.group_id, name, value)
            .await?;

        if let Some(entry) = cache.as_mut().and_then(|quotas| quotas.get_mut(name)) {
            entry.limit = value;
        }

        info!(
            target: "roster::report",
            domain = %self.domain,
            group_id = %self.group_id,
            quota = name,
            previous = reading.limit,
            value,
            "Quota updated"
        );

        Ok(QuotaOutcome::Applied {
            previous: reading.limit,
            value,
        })
    }

    /// Drop the cache; the next read reloads all quotas of the domain.
    pub async fn flush(&self) {
        *self.cache.lock().await = None;
    }

    async fn load(&self) -> RosterResult<MutexGuard<'_, QuotaCache>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            let quotas = self.backend.get_quotas(&self.group_id).await?;
            debug!(
                domain = %self.domain,
                group_id = %self.group_id,
                count = quotas.len(),
                "Loaded quotas"
            );
            *cache = Some(quotas);
        }
        Ok(cache)
    }

    fn lookup(&self, cache: &QuotaCache, name: &str) -> RosterResult<QuotaReading> {
        cache
            .as_ref()
            .and_then(|quotas| quotas.get(name))
            .copied()
            .ok_or_else(|| {
                RosterError::validation(format!("unknown quota {name} in domain {}", self.domain))
            })
    }
}

/// The acceptance rule for a new limit.
///
/// `None` and the unlimited sentinel are always accepted, raising a limit is
/// always accepted, and lowering it is accepted down to current usage.
pub fn accepts(reading: &QuotaReading, value: Option<i64>, consider_reserved: bool) -> bool {
    match value {
        None => true,
        Some(UNLIMITED) => true,
        Some(v) if v > reading.limit => true,
        Some(v) => v >= reading.floor(consider_reserved),
    }
}
