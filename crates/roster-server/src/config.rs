//! Process configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `roster.{toml,yaml,json}` file (or the file named by `--config`),
//! `ROSTER_*` environment variables, then command-line flags.
//! Nested keys use a double underscore in the environment, e.g.
//! `ROSTER_DB__URL` or `ROSTER_SYNC__READ_ONLY`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use roster_db::DbConfig;
use roster_feed::{FeedFormat, FeedOptions};
use roster_sync::SyncConfig;
use serde::Deserialize;

use crate::error::ServerError;

#[derive(Debug, Parser)]
#[command(name = "roster", version, about = "Propagate an upstream identity feed to the directory")]
pub struct Cli {
    /// Configuration file; `roster.{toml,yaml,json}` in the working
    /// directory is used when present.
    #[arg(short, long, global = true, env = "ROSTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report what would change without touching the directory.
    #[arg(long, global = true)]
    pub read_only: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile the directory against a users file and a groups file.
    Sync(SyncArgs),
    /// Hard-remove every soft-deleted identity and scratched group.
    Terminate,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[arg(long)]
    pub users: PathBuf,

    #[arg(long)]
    pub groups: PathBuf,

    /// Feed format (`scim` or `portal`).
    #[arg(short, long)]
    pub format: Option<FeedFormat>,

    /// Converge group quotas from the feed.
    #[arg(long)]
    pub quotas: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub sync: SyncConfig,
    pub feed: FeedOptions,
    pub format: FeedFormat,
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            sync: SyncConfig::default(),
            feed: FeedOptions::default(),
            format: FeedFormat::default(),
            queue_capacity: 16,
        }
    }
}

impl ServerConfig {
    pub fn load(cli: &Cli) -> Result<Self, ServerError> {
        let file = match &cli.config {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name("roster").required(false),
        };

        let mut builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("ROSTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if cli.read_only {
            builder = builder.set_override("sync.read_only", true)?;
        }
        if let Command::Sync(args) = &cli.command {
            if let Some(format) = args.format {
                builder = builder.set_override("format", format.to_string())?;
            }
            if args.quotas {
                builder = builder.set_override("sync.support_quotas", true)?;
            }
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
