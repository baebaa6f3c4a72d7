//! SurrealDB implementations of the `roster-core` backend traits.

mod group;
mod identity;
mod quota;
mod role;

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

pub use quota::{SurrealQuotaBackend, default_limits};

/// The local directory: identities, groups and role grants.
#[derive(Clone)]
pub struct SurrealDirectory<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDirectory<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

/// Row struct for existence checks.
#[derive(Debug, SurrealValue)]
struct IdRow {
    #[allow(dead_code)]
    record_id: String,
}
