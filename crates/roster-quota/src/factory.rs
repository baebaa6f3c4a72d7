use roster_core::repository::QuotaBackend;

use crate::manager::QuotaManager;

/// Connections to the three quota domains, established once by the driving
/// process and handed to the factory.
#[derive(Debug, Clone)]
pub struct QuotaConnections<B> {
    pub compute: B,
    pub block_storage: B,
    pub network: B,
}

pub struct QuotaFactory<B: QuotaBackend + Clone> {
    connections: QuotaConnections<B>,
}

impl<B: QuotaBackend + Clone> QuotaFactory<B> {
    pub fn new(connections: QuotaConnections<B>) -> Self {
        Self { connections }
    }

    /// A manager for `group_id` with an empty cache. Managers are never
    /// reused, so readings cannot go stale across passes.
    pub fn get_manager(&self, group_id: &str) -> QuotaManager<B> {
        QuotaManager::new(
            group_id,
            self.connections.compute.clone(),
            self.connections.block_storage.clone(),
            self.connections.network.clone(),
        )
    }
}
