//! SurrealDB implementation of [`IdentityRepository`].

use roster_core::error::RosterResult;
use roster_core::models::identity::{CreateIdentity, Identity, UpdateIdentity};
use roster_core::repository::{DirectoryScope, IdentityRepository};
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::SurrealDirectory;
use crate::error::DbError;

/// DB-side row struct for queries where the id is already known.
#[derive(Debug, SurrealValue)]
struct IdentityRow {
    external_id: String,
    display_name: String,
    secondary_name: Option<String>,
    email: Option<String>,
    public_key: Option<String>,
    enabled: bool,
    deleted: bool,
}

impl IdentityRow {
    fn into_identity(self, directory_id: String) -> Identity {
        Identity {
            directory_id,
            external_id: self.external_id,
            display_name: self.display_name,
            secondary_name: self.secondary_name,
            email: self.email,
            public_key: self.public_key,
            enabled: self.enabled,
            deleted: self.deleted,
        }
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct IdentityRowWithId {
    record_id: String,
    external_id: String,
    display_name: String,
    secondary_name: Option<String>,
    email: Option<String>,
    public_key: Option<String>,
    enabled: bool,
    deleted: bool,
}

impl From<IdentityRowWithId> for Identity {
    fn from(row: IdentityRowWithId) -> Self {
        Identity {
            directory_id: row.record_id,
            external_id: row.external_id,
            display_name: row.display_name,
            secondary_name: row.secondary_name,
            email: row.email,
            public_key: row.public_key,
            enabled: row.enabled,
            deleted: row.deleted,
        }
    }
}

impl<C: Connection> IdentityRepository for SurrealDirectory<C> {
    async fn list_identities(&self, scope: &DirectoryScope) -> RosterResult<Vec<Identity>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM identity \
                 WHERE domain = $domain AND marker = $marker \
                 ORDER BY external_id ASC",
            )
            .bind(("domain", scope.domain.clone()))
            .bind(("marker", scope.marker.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    async fn create_identity(
        &self,
        scope: &DirectoryScope,
        input: CreateIdentity,
    ) -> RosterResult<Identity> {
        let id = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('identity', $id) SET \
                 domain = $domain, marker = $marker, \
                 external_id = $external_id, display_name = $display_name, \
                 secondary_name = $secondary_name, email = $email, \
                 public_key = $public_key, enabled = $enabled, deleted = false",
            )
            .bind(("id", id.clone()))
            .bind(("domain", scope.domain.clone()))
            .bind(("marker", scope.marker.clone()))
            .bind(("external_id", input.external_id))
            .bind(("display_name", input.display_name))
            .bind(("secondary_name", input.secondary_name))
            .bind(("email", input.email))
            .bind(("public_key", input.public_key))
            .bind(("enabled", input.enabled))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: id.clone(),
        })?;

        Ok(row.into_identity(id))
    }

    async fn update_identity(
        &self,
        directory_id: &str,
        input: UpdateIdentity,
    ) -> RosterResult<Identity> {
        let result = self
            .db
            .query(
                "UPDATE type::record('identity', $id) SET \
                 display_name = $display_name, secondary_name = $secondary_name, \
                 email = $email, public_key = $public_key, \
                 enabled = $enabled, deleted = $deleted, \
                 updated_at = time::now()",
            )
            .bind(("id", directory_id.to_string()))
            .bind(("display_name", input.display_name))
            .bind(("secondary_name", input.secondary_name))
            .bind(("email", input.email))
            .bind(("public_key", input.public_key))
            .bind(("enabled", input.enabled && !input.deleted))
            .bind(("deleted", input.deleted))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: directory_id.to_string(),
        })?;

        Ok(row.into_identity(directory_id.to_string()))
    }

    async fn delete_identity(&self, directory_id: &str) -> RosterResult<()> {
        // Grants first, then the identity itself.
        let mut result = self
            .db
            .query(
                "DELETE has_role WHERE in = type::record('identity', $id); \
                 DELETE type::record('identity', $id) RETURN BEFORE;",
            )
            .bind(("id", directory_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRow> = result.take(1).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "identity".into(),
                id: directory_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
