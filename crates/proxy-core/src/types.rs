//! Shared data model: block templates, the per-template header backlog, and
//! the per-miner share log.
//!
//! All timestamps are milliseconds since the Unix epoch, matching the wire
//! format miners and upstream daemons already speak.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::constants::{HEADERS_BACKLOG_CAPACITY, SHARE_RETENTION_MS};
use crate::target::U256;

/// Difficulty and height recorded for a header once it has been accepted
/// into a [`BlockTemplate`]'s backlog, so a share submitted against a header
/// that has since scrolled out of `current` can still be checked against
/// the template it was actually issued for (solo mode only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeaderDescriptor {
    pub difficulty: U256,
    pub height: u64,
}

/// A block template fetched from the active upstream, plus the backlog of
/// recently superseded headers a solo-mode share can still be checked
/// against.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub header: String,
    pub seed: String,
    pub target: String,
    pub difficulty: U256,
    pub height: u64,
    /// Header hex -> descriptor, capped at [`HEADERS_BACKLOG_CAPACITY`]
    /// entries, oldest (by height) evicted first.
    pub headers: HashMap<String, HeaderDescriptor>,
}

impl BlockTemplate {
    pub fn empty() -> Self {
        BlockTemplate {
            header: String::new(),
            seed: String::new(),
            target: String::new(),
            difficulty: U256::ZERO,
            height: 0,
            headers: HashMap::new(),
        }
    }

    /// A template is usable once the upstream has returned a non-empty
    /// header; an empty header means "work not ready yet".
    pub fn is_ready(&self) -> bool {
        !self.header.is_empty()
    }

    /// Build a new template, carrying forward the previous template's
    /// backlog (so a share against the just-superseded header still
    /// resolves) and inserting the new header as its own backlog entry.
    pub fn advance(
        previous: Option<&BlockTemplate>,
        header: String,
        seed: String,
        target: String,
        difficulty: U256,
        height: u64,
    ) -> Self {
        let mut headers = previous.map(|p| p.headers.clone()).unwrap_or_default();
        headers.insert(
            header.clone(),
            HeaderDescriptor { difficulty, height },
        );
        while headers.len() > HEADERS_BACKLOG_CAPACITY {
            if let Some(oldest) = headers
                .iter()
                .min_by_key(|(_, d)| d.height)
                .map(|(k, _)| k.clone())
            {
                headers.remove(&oldest);
            } else {
                break;
            }
        }
        BlockTemplate {
            header,
            seed,
            target,
            difficulty,
            height,
            headers,
        }
    }

    /// Look up a header's difficulty/height, whether it's the current
    /// header or still sitting in the backlog.
    pub fn resolve_header(&self, header: &str) -> Option<HeaderDescriptor> {
        self.headers.get(header).cloned()
    }
}

/// Connected miner state: identity, liveness, and a rolling log of accepted
/// share difficulties used to estimate hashrate.
#[derive(Debug)]
pub struct Miner {
    pub id: String,
    pub ip: String,
    pub started_at: i64,
    last_beat: AtomicI64,
    valid_shares: AtomicU64,
    invalid_shares: AtomicU64,
    valid_blocks: AtomicU64,
    invalid_blocks: AtomicU64,
    /// Share timestamp (ms) -> adjusted difficulty, pruned lazily by
    /// [`Miner::hashrate`].
    shares: Mutex<HashMap<i64, i64>>,
}

impl Miner {
    pub fn new(id: impl Into<String>, ip: impl Into<String>, now_ms: i64) -> Self {
        Miner {
            id: id.into(),
            ip: ip.into(),
            started_at: now_ms,
            last_beat: AtomicI64::new(now_ms),
            valid_shares: AtomicU64::new(0),
            invalid_shares: AtomicU64::new(0),
            valid_blocks: AtomicU64::new(0),
            invalid_blocks: AtomicU64::new(0),
            shares: Mutex::new(HashMap::new()),
        }
    }

    pub fn heartbeat(&self, now_ms: i64) {
        self.last_beat.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_beat(&self) -> i64 {
        self.last_beat.load(Ordering::Relaxed)
    }

    pub fn record_valid_share(&self, now_ms: i64, adjusted_difficulty: i64) {
        self.heartbeat(now_ms);
        self.valid_shares.fetch_add(1, Ordering::Relaxed);
        self.shares.lock().insert(now_ms, adjusted_difficulty);
    }

    pub fn record_invalid_share(&self, now_ms: i64) {
        self.heartbeat(now_ms);
        self.invalid_shares.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_valid_block(&self) {
        self.valid_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_block(&self) {
        self.invalid_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn valid_shares(&self) -> u64 {
        self.valid_shares.load(Ordering::Relaxed)
    }

    pub fn invalid_shares(&self) -> u64 {
        self.invalid_shares.load(Ordering::Relaxed)
    }

    pub fn valid_blocks(&self) -> u64 {
        self.valid_blocks.load(Ordering::Relaxed)
    }

    pub fn invalid_blocks(&self) -> u64 {
        self.invalid_blocks.load(Ordering::Relaxed)
    }

    /// Estimated hashrate over `window_ms`, as shares-per-second-equivalent
    /// scaled by the share difficulty, purging any share older than
    /// [`SHARE_RETENTION_MS`] along the way.
    pub fn hashrate(&self, window_ms: i64, now_ms: i64) -> i64 {
        let boundary = if now_ms - self.started_at > window_ms {
            now_ms - window_ms
        } else {
            self.started_at
        };
        let mut shares = self.shares.lock();
        let mut total = 0i64;
        shares.retain(|&ts, &mut diff| {
            if ts < now_ms - SHARE_RETENTION_MS {
                false
            } else {
                if ts >= boundary {
                    total += diff;
                }
                true
            }
        });
        let elapsed = (now_ms - boundary).max(1);
        ((total as f64) / (elapsed as f64)) as i64
    }
}
