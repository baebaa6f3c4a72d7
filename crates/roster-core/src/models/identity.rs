//! Identity domain model.

use serde::{Deserialize, Serialize};

/// A directory principal owned by the reconciler.
///
/// `deleted` is the soft-delete tombstone: a deleted identity is always
/// disabled and stays in the directory until it is explicitly terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Backend-assigned id, opaque and immutable.
    pub directory_id: String,
    /// Stable upstream key used to correlate passes.
    pub external_id: String,
    pub display_name: String,
    pub secondary_name: Option<String>,
    pub email: Option<String>,
    /// Opaque credential blob (e.g. an SSH public key).
    pub public_key: Option<String>,
    pub enabled: bool,
    pub deleted: bool,
}

impl Identity {
    pub fn is_tombstoned(&self) -> bool {
        self.deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdentity {
    pub external_id: String,
    pub display_name: String,
    pub secondary_name: Option<String>,
    pub email: Option<String>,
    pub public_key: Option<String>,
    pub enabled: bool,
}

/// Full replacement field set for an identity update.
///
/// Every field is written on each update; optional fields set to `None`
/// are cleared in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateIdentity {
    pub display_name: String,
    pub secondary_name: Option<String>,
    pub email: Option<String>,
    pub public_key: Option<String>,
    pub enabled: bool,
    pub deleted: bool,
}

impl UpdateIdentity {
    /// The field set that tombstones `identity`, keeping everything else.
    pub fn tombstone(identity: &Identity) -> Self {
        Self {
            display_name: identity.display_name.clone(),
            secondary_name: identity.secondary_name.clone(),
            email: identity.email.clone(),
            public_key: identity.public_key.clone(),
            enabled: false,
            deleted: true,
        }
    }

    /// Apply this field set to a cached record.
    pub fn apply_to(&self, identity: &mut Identity) {
        identity.display_name = self.display_name.clone();
        identity.secondary_name = self.secondary_name.clone();
        identity.email = self.email.clone();
        identity.public_key = self.public_key.clone();
        identity.deleted = self.deleted;
        identity.enabled = self.enabled && !self.deleted;
    }
}
