//! SurrealDB implementation of [`GroupRepository`].

use roster_core::error::RosterResult;
use roster_core::models::group::{CreateGroup, Group, UpdateGroup};
use roster_core::repository::{DirectoryScope, GroupRepository};
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::SurrealDirectory;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct GroupRow {
    external_id: String,
    name: String,
    description: Option<String>,
    enabled: bool,
    scratched: bool,
}

impl GroupRow {
    fn into_group(self, directory_id: String) -> Group {
        Group {
            directory_id,
            external_id: self.external_id,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            scratched: self.scratched,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct GroupRowWithId {
    record_id: String,
    external_id: String,
    name: String,
    description: Option<String>,
    enabled: bool,
    scratched: bool,
}

impl From<GroupRowWithId> for Group {
    fn from(row: GroupRowWithId) -> Self {
        Group {
            directory_id: row.record_id,
            external_id: row.external_id,
            name: row.name,
            description: row.description,
            enabled: row.enabled,
            scratched: row.scratched,
        }
    }
}

impl<C: Connection> GroupRepository for SurrealDirectory<C> {
    async fn list_groups(&self, scope: &DirectoryScope) -> RosterResult<Vec<Group>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM directory_group \
                 WHERE domain = $domain AND marker = $marker \
                 ORDER BY external_id ASC",
            )
            .bind(("domain", scope.domain.clone()))
            .bind(("marker", scope.marker.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn create_group(&self, scope: &DirectoryScope, input: CreateGroup) -> RosterResult<Group> {
        let id = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('directory_group', $id) SET \
                 domain = $domain, marker = $marker, parent_id = $parent_id, \
                 external_id = $external_id, name = $name, \
                 description = $description, enabled = $enabled, \
                 scratched = false",
            )
            .bind(("id", id.clone()))
            .bind(("domain", scope.domain.clone()))
            .bind(("marker", scope.marker.clone()))
            .bind(("parent_id", scope.parent_group_id.clone()))
            .bind(("external_id", input.external_id))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("enabled", input.enabled))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: id.clone(),
        })?;

        Ok(row.into_group(id))
    }

    async fn update_group(&self, directory_id: &str, input: UpdateGroup) -> RosterResult<Group> {
        let result = self
            .db
            .query(
                "UPDATE type::record('directory_group', $id) SET \
                 name = $name, description = $description, \
                 enabled = $enabled, scratched = $scratched, \
                 updated_at = time::now()",
            )
            .bind(("id", directory_id.to_string()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("enabled", input.enabled && !input.scratched))
            .bind(("scratched", input.scratched))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: directory_id.to_string(),
        })?;

        Ok(row.into_group(directory_id.to_string()))
    }

    async fn delete_group(&self, directory_id: &str) -> RosterResult<()> {
        let mut result = self
            .db
            .query(
                "DELETE has_role WHERE group_id = $id; \
                 DELETE quota WHERE group_id = $id; \
                 DELETE type::record('directory_group', $id) RETURN BEFORE;",
            )
            .bind(("id", directory_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRow> = result.take(2).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "group".into(),
                id: directory_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
