use std::collections::BTreeMap;
use std::fs;

use roster_core::models::feed::UpstreamQuota;
use roster_feed::{FeedError, FeedFormat, FeedOptions, parse_groups, parse_identities};
use serde_json::json;

#[test]
fn scim_users_keep_mandatory_fields_and_count_skips() {
    let users = json!([
        { "id": "1", "login": "alice", "status": "VALID", "mail": "alice@example.org" },
        { "id": "2", "login": "bob", "status": "DISABLED" },
        { "id": "3", "status": "VALID" },
        { "login": "nobody", "status": "VALID" },
        "not an object",
    ]);

    let parsed = parse_identities(FeedFormat::Scim, &users, &FeedOptions::default()).unwrap();

    assert_eq!(parsed.skipped, 3);
    assert_eq!(parsed.records.len(), 2);

    let alice = &parsed.records[0];
    assert_eq!(alice.external_id, "1");
    assert_eq!(alice.display_name, "alice");
    assert_eq!(alice.email.as_deref(), Some("alice@example.org"));
    assert!(alice.enabled);
    assert!(alice.public_key.is_none());

    assert!(!parsed.records[1].enabled);
}

#[test]
fn scim_email_is_dropped_when_disabled() {
    let users = json!([{ "id": "1", "login": "alice", "status": "VALID", "mail": "a@b" }]);
    let options = FeedOptions {
        store_email: false,
        ..FeedOptions::default()
    };

    let parsed = parse_identities(FeedFormat::Scim, &users, &options).unwrap();
    assert!(parsed.records[0].email.is_none());
}

#[test]
fn scim_groups_read_member_user_ids() {
    let groups = json!([
        { "id": "g1", "name": "project", "members": [{ "userId": "1" }, { "userId": 2 }] },
        { "id": "g2", "name": "no members key" },
        { "id": "g3", "name": "empty", "members": [] },
    ]);

    let parsed = parse_groups(FeedFormat::Scim, &groups).unwrap();

    assert_eq!(parsed.skipped, 1);
    assert_eq!(parsed.records[0].members, vec!["1", "2"]);
    assert!(parsed.records[0].quotas.is_empty());
    assert!(parsed.records[1].members.is_empty());
}

#[test]
fn portal_users_map_logins_mail_and_keys() {
    let users = json!([
        {
            "id": 42,
            "login-namespace:elixir-persistent": "abc@elixir-europe.org",
            "login-namespace:elixir": "alice",
            "preferredMail": "alice@example.org",
            "status": "VALID",
            "sshPublicKey": ["ssh-ed25519 AAAA first", "ssh-rsa BBBB second"],
        },
        { "id": 43, "status": "VALID" },
    ]);

    let parsed = parse_identities(FeedFormat::Portal, &users, &FeedOptions::default()).unwrap();

    assert_eq!(parsed.skipped, 1);
    let alice = &parsed.records[0];
    assert_eq!(alice.external_id, "42");
    assert_eq!(alice.display_name, "abc@elixir-europe.org");
    assert_eq!(alice.secondary_name.as_deref(), Some("alice"));
    assert_eq!(alice.email.as_deref(), Some("alice@example.org"));
    assert_eq!(alice.public_key.as_deref(), Some("ssh-ed25519 AAAA first"));
}

#[test]
fn portal_options_suppress_optional_fields() {
    let users = json!([{
        "id": 1,
        "login-namespace:elixir-persistent": "p@elixir",
        "login-namespace:elixir": "p",
        "preferredMail": "p@example.org",
        "status": "VALID",
        "sshPublicKey": ["ssh-ed25519 KEY"],
    }]);
    let options = FeedOptions {
        store_email: false,
        store_secondary_name: false,
        store_public_key: false,
        public_key_blocklist: Vec::new(),
    };

    let record = &parse_identities(FeedFormat::Portal, &users, &options)
        .unwrap()
        .records[0];
    assert!(record.email.is_none());
    assert!(record.secondary_name.is_none());
    assert!(record.public_key.is_none());
}

#[test]
fn portal_only_blocklisted_keys_leave_no_key() {
    let users = json!([{
        "id": 1,
        "login-namespace:elixir-persistent": "p@elixir",
        "status": "VALID",
        "sshPublicKey": ["ssh-rsa COMPROMISED"],
    }]);
    let options = FeedOptions {
        public_key_blocklist: vec!["ssh-rsa COMPROMISED".into()],
        ..FeedOptions::default()
    };

    let parsed = parse_identities(FeedFormat::Portal, &users, &options).unwrap();
    assert_eq!(parsed.records.len(), 1);
    assert!(parsed.records[0].public_key.is_none());
}

#[test]
fn portal_groups_carry_description_members_and_quotas() {
    let groups = json!([{
        "id": 9,
        "name": "genomics",
        "description": "Sequencing pipeline",
        "denbiProjectMembers": [{ "id": 1, "email": "x" }, { "id": "2" }],
        "denbiCoresLimit": 32,
        "denbiRAMLimit": "64",
        "denbiProjectVolumeLimit": 500,
        "denbiProjectNumberOfVms": null,
        "denbiNrOfFloatingIPs": "lots",
    }]);

    let parsed = parse_groups(FeedFormat::Portal, &groups).unwrap();
    let group = &parsed.records[0];

    assert_eq!(group.external_id, "9");
    assert_eq!(group.description.as_deref(), Some("Sequencing pipeline"));
    assert_eq!(group.members, vec!["1", "2"]);
    assert_eq!(
        group.quotas,
        BTreeMap::from([
            (UpstreamQuota::VolumeLimit, 500),
            (UpstreamQuota::RamLimit, 64),
            (UpstreamQuota::CoresLimit, 32),
        ])
    );
}

#[test]
fn portal_negative_quota_below_unlimited_is_dropped() {
    let groups = json!([{
        "id": 1,
        "name": "p",
        "denbiProjectMembers": [],
        "denbiCoresLimit": -5,
        "denbiProjectNumberOfVms": -1,
    }]);

    let group = &parse_groups(FeedFormat::Portal, &groups).unwrap().records[0];
    assert_eq!(
        group.quotas,
        BTreeMap::from([(UpstreamQuota::NumberOfVms, -1)])
    );
}

#[test]
fn format_names_parse() {
    assert_eq!("scim".parse::<FeedFormat>().unwrap(), FeedFormat::Scim);
    assert_eq!("portal".parse::<FeedFormat>().unwrap(), FeedFormat::Portal);
    assert!(matches!(
        "ldap".parse::<FeedFormat>(),
        Err(FeedError::UnknownFormat(name)) if name == "ldap"
    ));
}

#[test]
fn object_documents_are_rejected() {
    let err = parse_identities(FeedFormat::Portal, &json!({}), &FeedOptions::default())
        .unwrap_err();
    assert!(matches!(err, FeedError::Shape(_)));
}

#[test]
fn load_reads_both_files() {
    let dir = std::env::temp_dir().join(format!("roster-feed-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let users = dir.join("users.json");
    let groups = dir.join("groups.json");
    fs::write(&users, r#"[{"id":"1","login":"a","status":"VALID"}]"#).unwrap();
    fs::write(&groups, r#"[{"id":"g","name":"g","members":[{"userId":"1"}]}]"#).unwrap();

    let snapshot = roster_feed::load(FeedFormat::Scim, &users, &groups, &FeedOptions::default())
        .unwrap();
    assert_eq!(snapshot.identities.records.len(), 1);
    assert_eq!(snapshot.groups.records[0].members, vec!["1"]);

    let missing = roster_feed::load(
        FeedFormat::Scim,
        &dir.join("absent.json"),
        &groups,
        &FeedOptions::default(),
    );
    assert!(matches!(missing, Err(FeedError::Io { .. })));

    fs::remove_dir_all(&dir).unwrap();
}
