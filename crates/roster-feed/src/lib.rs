//! Roster Feed: adapters from upstream export formats to the canonical
//! [`FeedIdentity`](roster_core::models::feed::FeedIdentity) and
//! [`FeedGroup`](roster_core::models::feed::FeedGroup) records.
//!
//! Two JSON formats are understood: a SCIM export and the compute-center
//! portal export. Records missing mandatory fields are skipped and counted,
//! never fatal.

pub mod error;
pub mod options;
pub mod portal;
pub mod scim;
mod value;

use std::path::Path;

use roster_core::models::feed::{FeedGroup, FeedIdentity};
use serde_json::Value;
use tracing::info;

pub use error::FeedError;
pub use options::{FeedFormat, FeedOptions};

/// Records extracted from one feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    /// Entries dropped for missing mandatory fields.
    pub skipped: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// A complete upstream delivery: users plus groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub identities: Parsed<FeedIdentity>,
    pub groups: Parsed<FeedGroup>,
}

pub fn parse_identities(
    format: FeedFormat,
    document: &Value,
    options: &FeedOptions,
) -> Result<Parsed<FeedIdentity>, FeedError> {
    match format {
        FeedFormat::Scim => scim::parse_users(document, options),
        FeedFormat::Portal => portal::parse_users(document, options),
    }
}

pub fn parse_groups(format: FeedFormat, document: &Value) -> Result<Parsed<FeedGroup>, FeedError> {
    match format {
        FeedFormat::Scim => scim::parse_groups(document),
        FeedFormat::Portal => portal::parse_groups(document),
    }
}

/// Read and parse a users file and a groups file.
pub fn load(
    format: FeedFormat,
    users_path: &Path,
    groups_path: &Path,
    options: &FeedOptions,
) -> Result<FeedSnapshot, FeedError> {
    info!(
        %format,
        users = %users_path.display(),
        groups = %groups_path.display(),
        "Importing feed"
    );

    let users = value::read_json(users_path)?;
    let groups = value::read_json(groups_path)?;

    let snapshot = FeedSnapshot {
        identities: parse_identities(format, &users, options)?,
        groups: parse_groups(format, &groups)?,
    };

    info!(
        identities = snapshot.identities.records.len(),
        skipped_identities = snapshot.identities.skipped,
        groups = snapshot.groups.records.len(),
        skipped_groups = snapshot.groups.skipped,
        "Feed parsed"
    );
    Ok(snapshot)
}
