//! SCIM export.
//!
//! Users: `{id, login, status, mail?, displayName?}`.
//! Groups: `{id, name, members: [{userId}]}`.

use roster_core::models::feed::{FeedGroup, FeedIdentity};
use serde_json::Value;
use tracing::debug;

use crate::error::FeedError;
use crate::options::FeedOptions;
use crate::value::{entries, is_valid_status, member_ids, scalar, text};
use crate::Parsed;

pub fn parse_users(document: &Value, options: &FeedOptions) -> Result<Parsed<FeedIdentity>, FeedError> {
    let mut parsed = Parsed::default();

    for entry in entries(document, "users")? {
        match entry.as_object().and_then(|user| user_record(user, options)) {
            Some(record) => parsed.records.push(record),
            None => {
                debug!(entry = %entry, "Skipping SCIM user without id, login or status");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}

fn user_record(user: &serde_json::Map<String, Value>, options: &FeedOptions) -> Option<FeedIdentity> {
    let external_id = scalar(user, "id")?;
    let login = scalar(user, "login")?;
    let enabled = is_valid_status(user)?;

    Some(FeedIdentity {
        external_id,
        display_name: login,
        secondary_name: options
            .store_secondary_name
            .then(|| text(user, "displayName"))
            .flatten(),
        email: options.store_email.then(|| text(user, "mail")).flatten(),
        public_key: None,
        enabled,
    })
}

pub fn parse_groups(document: &Value) -> Result<Parsed<FeedGroup>, FeedError> {
    let mut parsed = Parsed::default();

    for entry in entries(document, "groups")? {
        match entry.as_object().and_then(group_record) {
            Some(record) => parsed.records.push(record),
            None => {
                debug!(entry = %entry, "Skipping SCIM group without id, name or members");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}

fn group_record(group: &serde_json::Map<String, Value>) -> Option<FeedGroup> {
    Some(FeedGroup {
        external_id: scalar(group, "id")?,
        name: scalar(group, "name")?,
        description: None,
        members: member_ids(group, "members", "userId")?,
        quotas: Default::default(),
    })
}
