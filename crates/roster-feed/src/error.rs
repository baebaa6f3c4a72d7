//! Feed-specific error types and conversions.

use std::path::PathBuf;

use roster_core::error::RosterError;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but is not shaped like the expected export.
    #[error("Unexpected document shape: {0}")]
    Shape(String),

    #[error("Unknown feed format: {0}")]
    UnknownFormat(String),
}

impl From<FeedError> for RosterError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Io { .. } => RosterError::Internal(err.to_string()),
            other => RosterError::validation(other.to_string()),
        }
    }
}
