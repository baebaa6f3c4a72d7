//! Error types for the roster system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    /// An operation referenced an entity absent from the current snapshot.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// The entity exists but is not in the state the operation requires,
    /// e.g. terminating a group that was never scratched.
    #[error("Precondition failed for {entity} {id}: {reason}")]
    Precondition {
        entity: String,
        id: String,
        reason: String,
    },

    /// A quota would be lowered below the resources currently consumed.
    #[error("Quota conflict: {name} = {value} is below current usage of {in_use}")]
    QuotaConflict {
        name: String,
        value: i64,
        in_use: i64,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Transport or storage failure reported by a backend.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RosterError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Errors that concern a single entity and must not abort a whole
    /// reconciliation pass.
    pub fn is_entity_scoped(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Precondition { .. }
                | Self::QuotaConflict { .. }
                | Self::Validation { .. }
        )
    }
}

pub type RosterResult<T> = Result<T, RosterError>;
