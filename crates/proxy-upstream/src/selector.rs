//! Ordered upstream failover: the first healthy upstream in configuration
//! order is always the active one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::client::UpstreamClient;

/// Holds the configured upstreams in priority order and tracks which one is
/// currently active. Index 0 is preferred whenever it's healthy; failover
/// moves to a later upstream only when every earlier one is sick, and moves
/// back as soon as an earlier one recovers.
pub struct UpstreamSelector {
    upstreams: Vec<Arc<UpstreamClient>>,
    current: AtomicUsize,
}

impl UpstreamSelector {
    pub fn new(upstreams: Vec<Arc<UpstreamClient>>) -> Self {
        assert!(!upstreams.is_empty(), "at least one upstream is required");
        UpstreamSelector {
            upstreams,
            current: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> Arc<UpstreamClient> {
        let idx = self.current.load(Ordering::Relaxed);
        self.upstreams[idx].clone()
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn upstreams(&self) -> &[Arc<UpstreamClient>] {
        &self.upstreams
    }

    /// Probe every upstream in configuration order and switch to the first
    /// healthy one. Logs when the active upstream actually changes.
    pub async fn check_upstreams(&self) {
        let mut candidate = None;
        for (idx, upstream) in self.upstreams.iter().enumerate() {
            if upstream.check().await {
                candidate = Some(idx);
                break;
            }
        }

        let Some(candidate) = candidate else {
            return;
        };

        let previous = self.current.swap(candidate, Ordering::Relaxed);
        if previous != candidate {
            info!(
                from = %self.upstreams[previous].name,
                to = %self.upstreams[candidate].name,
                "switching active upstream",
            );
        }
    }
}
