//! Roster Sync: reconciles an upstream identity/group snapshot against the
//! directory backend.
//!
//! - [`SyncEngine`]: diff, create, update, soft-delete and terminate
//! - [`DirectorySnapshot`]: the per-pass mirror of the directory
//! - [`PropagationQueue`]: serialises passes behind a single worker

pub mod config;
pub mod engine;
pub mod report;
pub mod snapshot;
pub mod worker;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use report::{Change, EntityKind, Failure, SyncReport};
pub use snapshot::{DirectorySnapshot, GroupState};
pub use worker::{PropagationQueue, SyncJob};
