//! Concurrent miner registry: insertion-only map from miner id to miner
//! state, read by the share processor and the stats reporter alike.

use std::sync::Arc;

use dashmap::DashMap;
use proxy_core::types::Miner;

#[derive(Default)]
pub struct MinerRegistry {
    miners: DashMap<String, Arc<Miner>>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        MinerRegistry {
            miners: DashMap::new(),
        }
    }

    /// Returns the miner row for `id`, creating one with the given `ip` on
    /// first sight. Existing rows are never replaced (the IP on a later
    /// request is not retroactively applied).
    pub fn get_or_create(&self, id: &str, ip: &str, now_ms: i64) -> Arc<Miner> {
        if let Some(existing) = self.miners.get(id) {
            return existing.clone();
        }
        self.miners
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Miner::new(id, ip, now_ms)))
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Miner>> {
        self.miners.get(id).map(|e| e.clone())
    }

    /// A consistent snapshot of the current miner ids and their rows, for
    /// the stats reporter.
    pub fn snapshot(&self) -> Vec<Arc<Miner>> {
        self.miners.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }
}
