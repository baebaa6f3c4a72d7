//! Roster Database: SurrealDB connection management and the local
//! implementations of the directory and quota backends.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - [`SurrealDirectory`] and [`SurrealQuotaBackend`]

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{SurrealDirectory, SurrealQuotaBackend};
pub use schema::{run_migrations, schema_v1};
