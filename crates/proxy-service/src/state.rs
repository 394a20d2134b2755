//! Process-wide shared state: the current block template, the selected
//! upstream, the miner registry, and solo-mode round/luck accounting.
//!
//! Owned by a single [`ProxyState`] value and shared behind an `Arc` with
//! every request handler and background task, per spec §5.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use proxy_core::target::U256;
use proxy_core::types::BlockTemplate;
use proxy_upstream::UpstreamSelector;

use crate::config::ProxyConfig;
use crate::registry::MinerRegistry;

/// The process-wide aggregate described in spec §3's `ProxyState`.
pub struct ProxyState {
    pub config: ProxyConfig,
    template: ArcSwap<BlockTemplate>,
    pub selector: Arc<UpstreamSelector>,
    pub miners: MinerRegistry,
    valid_blocks: AtomicU64,
    invalid_blocks: AtomicU64,
    /// Cumulative credited share-difficulty since the last accepted solo
    /// block. Solo mode only; unused (and always zero) in pool mode.
    round_shares: AtomicI64,
    /// Accept-timestamp-ms -> luck ratio, for the most recently accepted
    /// solo blocks.
    block_stats: Mutex<BTreeMap<i64, f64>>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig, selector: Arc<UpstreamSelector>) -> Self {
        ProxyState {
            config,
            template: ArcSwap::from_pointee(BlockTemplate::empty()),
            selector,
            miners: MinerRegistry::new(),
            valid_blocks: AtomicU64::new(0),
            invalid_blocks: AtomicU64::new(0),
            round_shares: AtomicI64::new(0),
            block_stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// The current template. Never observed null after construction: the
    /// constructor seeds a zero-value placeholder before any refresh runs.
    pub fn template(&self) -> Arc<BlockTemplate> {
        self.template.load_full()
    }

    /// Atomically replace the current template. Readers racing this call
    /// always see either the previous or the new template, never a
    /// partially constructed one.
    pub fn replace_template(&self, new: BlockTemplate) {
        self.template.store(Arc::new(new));
    }

    pub fn record_valid_block(&self) {
        self.valid_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_block(&self) {
        self.invalid_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn valid_blocks(&self) -> u64 {
        self.valid_blocks.load(Ordering::Relaxed)
    }

    pub fn invalid_blocks(&self) -> u64 {
        self.invalid_blocks.load(Ordering::Relaxed)
    }

    /// Credit `amount` toward the current solo round. No-op bookkeeping in
    /// pool mode (nothing calls this there).
    pub fn add_round_share(&self, amount: i64) {
        self.round_shares.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn round_shares(&self) -> i64 {
        self.round_shares.load(Ordering::Relaxed)
    }

    /// Swap `roundShares` to zero and record the luck ratio of the round
    /// that just ended (`prior / block_difficulty`), per spec §4.4 step 7.
    pub fn settle_round(&self, now_ms: i64, block_difficulty: &U256) {
        let prior = self.round_shares.swap(0, Ordering::Relaxed);
        let luck = prior as f64 / block_difficulty.to_f64();
        self.block_stats.lock().insert(now_ms, luck);
    }

    pub fn block_stats_snapshot(&self) -> Vec<(i64, f64)> {
        self.block_stats.lock().iter().map(|(&k, &v)| (k, v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state() -> ProxyState {
        let upstream = Arc::new(proxy_upstream::UpstreamClient::new(
            "main",
            "http://127.0.0.1:1",
            false,
            Duration::from_millis(50),
        ));
        let selector = Arc::new(UpstreamSelector::new(vec![upstream]));
        let config = crate::config::ProxyConfig::from_json(
            r#"{
                "proxy": {"listen":"0.0.0.0:8888","clientTimeout":"600s","blockRefreshInterval":"120ms","hashrateWindow":"30m","luckWindow":120,"largeLuckWindow":2160},
                "frontend": {"listen":"0.0.0.0:8080"},
                "upstream": [{"name":"main","url":"http://127.0.0.1:8545","timeout":"10s"}],
                "upstreamCheckInterval": "5s"
            }"#,
        )
        .unwrap();
        ProxyState::new(config, selector)
    }

    #[test]
    fn template_defaults_to_not_ready_placeholder() {
        let s = state();
        assert!(!s.template().is_ready());
    }

    #[test]
    fn replace_template_is_observable_immediately() {
        let s = state();
        let t = BlockTemplate::advance(None, "0xaa".into(), "0xs".into(), "0xt".into(), U256::from_u64(1), 1);
        s.replace_template(t);
        assert!(s.template().is_ready());
    }

    #[test]
    fn settle_round_resets_round_shares_and_records_luck() {
        let s = state();
        s.add_round_share(1000);
        assert_eq!(s.round_shares(), 1000);
        s.settle_round(5000, &U256::from_u64(2000));
        assert_eq!(s.round_shares(), 0);
        let snapshot = s.block_stats_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, 5000);
        assert!((snapshot[0].1 - 0.5).abs() < 1e-9);
    }
}
