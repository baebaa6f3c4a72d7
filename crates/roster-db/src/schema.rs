//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. Record ids are UUID strings. Every identity
//! and group carries the domain and ownership marker it was created
//! under, so listings never leak entities managed by other tooling.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Identities
-- =======================================================================
DEFINE TABLE identity SCHEMAFULL;
DEFINE FIELD domain ON TABLE identity TYPE string;
DEFINE FIELD marker ON TABLE identity TYPE string;
DEFINE FIELD external_id ON TABLE identity TYPE string;
DEFINE FIELD display_name ON TABLE identity TYPE string;
DEFINE FIELD secondary_name ON TABLE identity TYPE option<string>;
DEFINE FIELD email ON TABLE identity TYPE option<string>;
DEFINE FIELD public_key ON TABLE identity TYPE option<string>;
DEFINE FIELD enabled ON TABLE identity TYPE bool DEFAULT true;
DEFINE FIELD deleted ON TABLE identity TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE identity TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE identity TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_identity_domain_external ON TABLE identity \
    COLUMNS domain, external_id UNIQUE;

-- =======================================================================
-- Groups (projects)
-- =======================================================================
DEFINE TABLE directory_group SCHEMAFULL;
DEFINE FIELD domain ON TABLE directory_group TYPE string;
DEFINE FIELD marker ON TABLE directory_group TYPE string;
DEFINE FIELD parent_id ON TABLE directory_group TYPE option<string>;
DEFINE FIELD external_id ON TABLE directory_group TYPE string;
DEFINE FIELD name ON TABLE directory_group TYPE string;
DEFINE FIELD description ON TABLE directory_group TYPE option<string>;
DEFINE FIELD enabled ON TABLE directory_group TYPE bool DEFAULT true;
DEFINE FIELD scratched ON TABLE directory_group TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE directory_group TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE directory_group TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_group_domain_external ON TABLE directory_group \
    COLUMNS domain, external_id UNIQUE;

-- =======================================================================
-- Roles
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE INDEX idx_role_name ON TABLE role COLUMNS name UNIQUE;

-- Identity -> Role grant, scoped to one group
DEFINE TABLE has_role TYPE RELATION SCHEMAFULL;
DEFINE FIELD group_id ON TABLE has_role TYPE string;

-- =======================================================================
-- Quotas (one row per group, quota domain and quota name)
-- =======================================================================
DEFINE TABLE quota SCHEMAFULL;
DEFINE FIELD group_id ON TABLE quota TYPE string;
DEFINE FIELD domain ON TABLE quota TYPE string \
    ASSERT $value IN ['compute', 'block_storage', 'network'];
DEFINE FIELD name ON TABLE quota TYPE string;
DEFINE FIELD quota_limit ON TABLE quota TYPE int;
DEFINE FIELD in_use ON TABLE quota TYPE int DEFAULT 0;
DEFINE FIELD reserved ON TABLE quota TYPE int DEFAULT 0;
DEFINE INDEX idx_quota_group_domain_name ON TABLE quota \
    COLUMNS group_id, domain, name UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
