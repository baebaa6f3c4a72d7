//! Remote SurrealDB connection used by the driving process.

use std::fmt;

use roster_core::models::quota::QuotaDomain;
use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::repository::{SurrealDirectory, SurrealQuotaBackend};
use crate::schema::run_migrations;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// `host:port` of the WebSocket endpoint.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "roster".into(),
            database: "directory".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated client with the schema brought up to date, handing out
/// the directory and per-domain quota backends that share it.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Opening directory store"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        run_migrations(&db).await?;
        info!("Directory store ready");

        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }

    pub fn directory(&self) -> SurrealDirectory<Client> {
        SurrealDirectory::new(self.db.clone())
    }

    pub fn quota_backend(&self, domain: QuotaDomain) -> SurrealQuotaBackend<Client> {
        SurrealQuotaBackend::new(self.db.clone(), domain)
    }
}
