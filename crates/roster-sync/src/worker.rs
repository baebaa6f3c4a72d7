//! Single-worker propagation queue.
//!
//! Reconciliation passes read a snapshot and then write without a
//! transaction, so two passes against the same directory must never
//! interleave. Every job goes through one channel and one worker task that
//! owns the engine; submitters get the outcome back on a oneshot channel.
//! Termination sweeps are queued as jobs of their own and never follow a
//! pass implicitly.

use roster_core::error::{RosterError, RosterResult};
use roster_core::models::feed::{FeedGroup, FeedIdentity};
use roster_core::repository::{DirectoryBackend, QuotaBackend};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::engine::SyncEngine;
use crate::report::SyncReport;

/// One upstream delivery to propagate.
#[derive(Debug, Clone, Default)]
pub struct SyncJob {
    /// Label for logs, e.g. the uploaded file name.
    pub source: String,
    pub identities: Vec<FeedIdentity>,
    pub groups: Vec<FeedGroup>,
}

enum Envelope {
    Pass {
        job: SyncJob,
        reply: oneshot::Sender<RosterResult<SyncReport>>,
    },
    Sweep {
        reply: oneshot::Sender<RosterResult<SyncReport>>,
    },
}

#[derive(Clone)]
pub struct PropagationQueue {
    sender: mpsc::Sender<Envelope>,
}

impl PropagationQueue {
    /// Start the worker. It runs until every queue handle is dropped.
    pub fn spawn<D, Q>(engine: SyncEngine<D, Q>, capacity: usize) -> (Self, JoinHandle<()>)
    where
        D: DirectoryBackend + 'static,
        Q: QuotaBackend + Clone + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(engine, receiver));
        (Self { sender }, handle)
    }

    /// Enqueue a job; the receiver resolves once the worker has run it.
    pub async fn submit(
        &self,
        job: SyncJob,
    ) -> RosterResult<oneshot::Receiver<RosterResult<SyncReport>>> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Envelope::Pass { job, reply })
            .await
            .map_err(|_| stopped())?;
        Ok(receiver)
    }

    /// Enqueue a job and wait for its report.
    pub async fn run(&self, job: SyncJob) -> RosterResult<SyncReport> {
        self.submit(job)
            .await?
            .await
            .map_err(|_| dropped())?
    }

    /// Run a termination sweep on its own, serialised with queued passes.
    pub async fn sweep(&self) -> RosterResult<SyncReport> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Envelope::Sweep { reply })
            .await
            .map_err(|_| stopped())?;
        receiver.await.map_err(|_| dropped())?
    }
}

fn stopped() -> RosterError {
    RosterError::Internal("propagation worker has stopped".into())
}

fn dropped() -> RosterError {
    RosterError::Internal("propagation worker dropped the job".into())
}

async fn run_worker<D, Q>(engine: SyncEngine<D, Q>, mut receiver: mpsc::Receiver<Envelope>)
where
    D: DirectoryBackend,
    Q: QuotaBackend + Clone,
{
    info!("Propagation worker started");

    while let Some(envelope) = receiver.recv().await {
        match envelope {
            Envelope::Pass { job, reply } => {
                info!(
                    source = %job.source,
                    identities = job.identities.len(),
                    groups = job.groups.len(),
                    "Propagation job started"
                );
                let result = engine.reconcile(&job.identities, &job.groups).await;
                if let Err(e) = &result {
                    error!(source = %job.source, error = %e, "Propagation job failed");
                }
                if reply.send(result).is_err() {
                    info!(source = %job.source, "Submitter went away before the job finished");
                }
            }
            Envelope::Sweep { reply } => {
                info!("Termination sweep started");
                let result = engine.terminate_soft_deleted().await;
                if let Err(e) = &result {
                    error!(error = %e, "Termination sweep failed");
                }
                if reply.send(result).is_err() {
                    info!("Submitter went away before the sweep finished");
                }
            }
        }
    }

    info!("Propagation worker stopped");
}
