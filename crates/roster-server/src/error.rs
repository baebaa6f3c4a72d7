use roster_core::error::RosterError;
use roster_db::DbError;
use roster_feed::FeedError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("Cannot render report: {0}")]
    Report(#[from] serde_json::Error),
}
