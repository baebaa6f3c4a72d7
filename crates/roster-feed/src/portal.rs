//! Compute-center export of the project portal.
//!
//! Users carry their persistent login in `login-namespace:elixir-persistent`
//! and optionally a readable login, a preferred mail address and a list of
//! SSH public keys. Groups list members under `denbiProjectMembers` and
//! declare quotas as top-level fields.

use std::collections::BTreeMap;

use roster_core::models::feed::{FeedGroup, FeedIdentity, UpstreamQuota};
use roster_core::models::quota::parse_quota_value;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::options::FeedOptions;
use crate::value::{entries, is_valid_status, member_ids, scalar, text};
use crate::Parsed;

const PERSISTENT_LOGIN: &str = "login-namespace:elixir-persistent";
const READABLE_LOGIN: &str = "login-namespace:elixir";

/// Portal quota field names.
const QUOTA_FIELDS: &[(&str, UpstreamQuota)] = &[
    ("denbiProjectDiskSpace", UpstreamQuota::DiskSpace),
    ("denbiProjectVolumeLimit", UpstreamQuota::VolumeLimit),
    ("denbiProjectVolumeCounter", UpstreamQuota::VolumeCounter),
    ("denbiProjectRamPerVm", UpstreamQuota::RamPerVm),
    ("denbiProjectObjectStorage", UpstreamQuota::ObjectStorage),
    (
        "denbiProjectSpecialPurposeHardware",
        UpstreamQuota::SpecialPurposeHardware,
    ),
    ("denbiProjectNumberOfVms", UpstreamQuota::NumberOfVms),
    ("denbiRAMLimit", UpstreamQuota::RamLimit),
    ("denbiProjectNumberOfCpus", UpstreamQuota::NumberOfCpus),
    ("denbiCoresLimit", UpstreamQuota::CoresLimit),
    ("denbiNrOfFloatingIPs", UpstreamQuota::FloatingIps),
    ("denbiProjectNumberOfSnapshots", UpstreamQuota::Snapshots),
];

pub fn parse_users(document: &Value, options: &FeedOptions) -> Result<Parsed<FeedIdentity>, FeedError> {
    let mut parsed = Parsed::default();

    for entry in entries(document, "users")? {
        match entry.as_object().and_then(|user| user_record(user, options)) {
            Some(record) => parsed.records.push(record),
            None => {
                debug!(entry = %entry, "Skipping portal user without id, login or status");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}

fn user_record(user: &Map<String, Value>, options: &FeedOptions) -> Option<FeedIdentity> {
    let external_id = scalar(user, "id")?;
    let login = scalar(user, PERSISTENT_LOGIN)?;
    let enabled = is_valid_status(user)?;

    let public_key = if options.store_public_key {
        public_key(user, options, &external_id)
    } else {
        None
    };

    Some(FeedIdentity {
        external_id,
        display_name: login,
        secondary_name: options
            .store_secondary_name
            .then(|| text(user, READABLE_LOGIN))
            .flatten(),
        email: options
            .store_email
            .then(|| text(user, "preferredMail"))
            .flatten(),
        public_key,
        enabled,
    })
}

/// First listed key that is not blocklisted.
fn public_key(user: &Map<String, Value>, options: &FeedOptions, external_id: &str) -> Option<String> {
    let keys: Vec<&str> = match user.get("sshPublicKey")? {
        Value::String(key) => vec![key.as_str()],
        Value::Array(keys) => keys.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };

    let mut chosen = None;
    for key in keys {
        if options.is_blocked(key) {
            warn!(external_id, "Ignoring blocklisted public key");
            continue;
        }
        chosen.get_or_insert_with(|| key.trim().to_string());
    }
    chosen
}

pub fn parse_groups(document: &Value) -> Result<Parsed<FeedGroup>, FeedError> {
    let mut parsed = Parsed::default();

    for entry in entries(document, "groups")? {
        match entry.as_object().and_then(group_record) {
            Some(record) => parsed.records.push(record),
            None => {
                debug!(entry = %entry, "Skipping portal group without id, name or members");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}

fn group_record(group: &Map<String, Value>) -> Option<FeedGroup> {
    let external_id = scalar(group, "id")?;
    let name = scalar(group, "name")?;
    let members = member_ids(group, "denbiProjectMembers", "id")?;
    let quotas = quotas(group, &external_id);

    Some(FeedGroup {
        external_id,
        name,
        description: text(group, "description"),
        members,
        quotas,
    })
}

/// Quota fields present on the group. Malformed values are dropped with a
/// warning; the rest of the record still applies.
fn quotas(group: &Map<String, Value>, external_id: &str) -> BTreeMap<UpstreamQuota, i64> {
    let mut quotas = BTreeMap::new();

    for &(field, quota) in QUOTA_FIELDS {
        let raw = match group.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        match parse_quota_value(&raw) {
            Ok(value) => {
                quotas.insert(quota, value);
            }
            Err(e) => warn!(group = external_id, field, error = %e, "Dropping quota field"),
        }
    }
    quotas
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn blocklisted_keys_are_skipped() {
        let options = FeedOptions {
            public_key_blocklist: vec!["ssh-rsa LEAKED".into()],
            ..FeedOptions::default()
        };
        let user = json!({
            "id": 1,
            "login-namespace:elixir-persistent": "a@elixir",
            "status": "VALID",
            "sshPublicKey": ["ssh-rsa LEAKED ", "ssh-ed25519 GOOD"],
        });
        let record = user_record(user.as_object().unwrap(), &options).unwrap();
        assert_eq!(record.public_key.as_deref(), Some("ssh-ed25519 GOOD"));
    }

    #[test]
    fn float_quota_values_are_dropped() {
        let group = json!({ "denbiCoresLimit": 2.5, "denbiRAMLimit": "64" });
        let quotas = quotas(group.as_object().unwrap(), "g1");
        assert_eq!(quotas, BTreeMap::from([(UpstreamQuota::RamLimit, 64)]));
    }
}
