//! Feed adapter configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    #[default]
    Scim,
    /// Compute-center export of the project portal.
    Portal,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scim => "scim",
            Self::Portal => "portal",
        })
    }
}

impl FromStr for FeedFormat {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scim" => Ok(Self::Scim),
            "portal" => Ok(Self::Portal),
            other => Err(FeedError::UnknownFormat(other.to_string())),
        }
    }
}

/// Which optional identity fields are propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedOptions {
    pub store_email: bool,
    pub store_secondary_name: bool,
    pub store_public_key: bool,
    /// Public keys that must never be propagated, compared after trimming.
    pub public_key_blocklist: Vec<String>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            store_email: true,
            store_secondary_name: true,
            store_public_key: true,
            public_key_blocklist: Vec::new(),
        }
    }
}

impl FeedOptions {
    pub fn is_blocked(&self, key: &str) -> bool {
        let key = key.trim();
        self.public_key_blocklist.iter().any(|blocked| blocked.trim() == key)
    }
}
