//! SurrealDB implementation of [`RoleRepository`].
//!
//! A grant is a `has_role` edge from an identity to a role carrying the
//! group it applies to.

use roster_core::error::RosterResult;
use roster_core::models::role::{Role, RoleAssignment};
use roster_core::repository::RoleRepository;
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{IdRow, SurrealDirectory};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    name: String,
}

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    identity_id: String,
    role_id: String,
    group_id: String,
}

impl<C: Connection> SurrealDirectory<C> {
    /// Fail with `NotFound` unless identity, group and role all exist.
    async fn check_grant_parties(
        &self,
        role_id: &str,
        identity_id: &str,
        group_id: &str,
    ) -> Result<(), DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id FROM type::record('identity', $identity_id); \
                 SELECT meta::id(id) AS record_id FROM type::record('directory_group', $group_id); \
                 SELECT meta::id(id) AS record_id FROM type::record('role', $role_id);",
            )
            .bind(("identity_id", identity_id.to_string()))
            .bind(("group_id", group_id.to_string()))
            .bind(("role_id", role_id.to_string()))
            .await?;

        for (index, (entity, id)) in [
            ("identity", identity_id),
            ("group", group_id),
            ("role", role_id),
        ]
        .into_iter()
        .enumerate()
        {
            let rows: Vec<IdRow> = result.take(index)?;
            if rows.is_empty() {
                return Err(DbError::NotFound {
                    entity: entity.into(),
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<C: Connection> RoleRepository for SurrealDirectory<C> {
    async fn list_roles(&self) -> RosterResult<Vec<Role>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, name FROM role ORDER BY name ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| Role {
                id: row.record_id,
                name: row.name,
            })
            .collect())
    }

    async fn create_role(&self, name: &str) -> RosterResult<Role> {
        let id = Uuid::new_v4().to_string();

        self.db
            .query("CREATE type::record('role', $id) SET name = $name")
            .bind(("id", id.clone()))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(Role {
            id,
            name: name.to_string(),
        })
    }

    async fn grant_role(&self, role_id: &str, identity_id: &str, group_id: &str) -> RosterResult<()> {
        self.check_grant_parties(role_id, identity_id, group_id)
            .await?;

        // Replace any existing edge so a repeated grant stays a single edge.
        self.db
            .query(
                "LET $from = type::record('identity', $identity_id); \
                 LET $to = type::record('role', $role_id); \
                 DELETE has_role WHERE in = $from AND out = $to AND group_id = $group_id; \
                 RELATE $from -> has_role -> $to SET group_id = $group_id;",
            )
            .bind(("identity_id", identity_id.to_string()))
            .bind(("role_id", role_id.to_string()))
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn revoke_role(
        &self,
        role_id: &str,
        identity_id: &str,
        group_id: &str,
    ) -> RosterResult<()> {
        self.db
            .query(
                "DELETE has_role WHERE \
                 in = type::record('identity', $identity_id) AND \
                 out = type::record('role', $role_id) AND \
                 group_id = $group_id",
            )
            .bind(("identity_id", identity_id.to_string()))
            .bind(("role_id", role_id.to_string()))
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list_role_assignments(&self, group_id: &str) -> RosterResult<Vec<RoleAssignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(in) AS identity_id, meta::id(out) AS role_id, group_id \
                 FROM has_role WHERE group_id = $group_id",
            )
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| RoleAssignment {
                role_id: row.role_id,
                identity_id: row.identity_id,
                group_id: row.group_id,
            })
            .collect())
    }
}
