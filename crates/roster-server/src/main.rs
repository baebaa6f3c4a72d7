//! Roster: propagates an upstream identity and project feed to the
//! directory and converges group quotas.

mod config;
mod error;

use std::process::ExitCode;

use clap::Parser;
use roster_core::models::quota::QuotaDomain;
use roster_db::{DbManager, SurrealQuotaBackend};
use roster_quota::{QuotaConnections, QuotaFactory};
use roster_sync::{PropagationQueue, SyncEngine, SyncJob, SyncReport};
use surrealdb::engine::remote::ws::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command, ServerConfig};
use crate::error::ServerError;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roster=info".parse().unwrap()))
        .json()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Roster run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, ServerError> {
    let config = ServerConfig::load(&cli)?;
    info!(
        read_only = config.sync.read_only,
        quotas = config.sync.support_quotas,
        format = %config.format,
        "Starting roster"
    );

    let db = DbManager::connect(&config.db).await?;

    let quotas = config.sync.support_quotas.then(|| quota_factory(&db));
    let engine = SyncEngine::connect(db.directory(), quotas, config.sync.clone()).await?;

    let (queue, worker) = PropagationQueue::spawn(engine, config.queue_capacity);

    let result = match cli.command {
        Command::Sync(args) => {
            let feed = roster_feed::load(config.format, &args.users, &args.groups, &config.feed)?;
            let job = SyncJob {
                source: args.users.display().to_string(),
                identities: feed.identities.records,
                groups: feed.groups.records,
            };
            let report = queue.run(job).await?;
            log_summary(&report);
            serde_json::to_string_pretty(&report)?
        }
        Command::Terminate => {
            let sweep = queue.sweep().await?;
            info!(
                identities = sweep.identities.terminated,
                groups = sweep.groups.terminated,
                failures = sweep.failures.len(),
                "Termination sweep finished"
            );
            serde_json::to_string_pretty(&sweep)?
        }
    };

    drop(queue);
    if let Err(e) = worker.await {
        error!(error = %e, "Propagation worker did not shut down cleanly");
    }

    info!("Roster finished");
    Ok(result)
}

fn quota_factory(db: &DbManager) -> QuotaFactory<SurrealQuotaBackend<Client>> {
    QuotaFactory::new(QuotaConnections {
        compute: db.quota_backend(QuotaDomain::Compute),
        block_storage: db.quota_backend(QuotaDomain::BlockStorage),
        network: db.quota_backend(QuotaDomain::Network),
    })
}

fn log_summary(pass: &SyncReport) {
    info!(
        identities_created = pass.identities.created,
        identities_soft_deleted = pass.identities.soft_deleted,
        groups_created = pass.groups.created,
        groups_soft_deleted = pass.groups.soft_deleted,
        granted = pass.memberships.granted,
        revoked = pass.memberships.revoked,
        failures = pass.failures.len(),
        "Propagation finished"
    );
}
