//! A single upstream JSON-RPC-over-HTTP client, with the sickness hysteresis
//! the proxy uses to decide whether an upstream is fit to receive work.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use proxy_core::error::UpstreamError;
use proxy_core::target::U256;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Consecutive failures (or successful probes) required to flip the sick
/// latch, per [`proxy_core::constants::SICKNESS_THRESHOLD`].
use proxy_core::constants::SICKNESS_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBlock {
    pub height: u64,
    pub difficulty: U256,
}

/// A client for a single upstream daemon, with request/response plumbing
/// and the health bookkeeping the selector reads.
pub struct UpstreamClient {
    pub name: String,
    pub url: String,
    pub pool: bool,
    http: reqwest::Client,
    sick: AtomicBool,
    consecutive_fails: AtomicU32,
    consecutive_successes: AtomicU32,
    fails_count: AtomicU64,
    accepts: AtomicU64,
    rejects: AtomicU64,
    last_submission_at: AtomicI64,
}

impl UpstreamClient {
    pub fn new(name: impl Into<String>, url: impl Into<String>, pool: bool, timeout: Duration) -> Self {
        UpstreamClient {
            name: name.into(),
            url: url.into(),
            pool,
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builder should not fail with static config"),
            sick: AtomicBool::new(false),
            consecutive_fails: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            fails_count: AtomicU64::new(0),
            accepts: AtomicU64::new(0),
            rejects: AtomicU64::new(0),
            last_submission_at: AtomicI64::new(0),
        }
    }

    pub fn is_sick(&self) -> bool {
        self.sick.load(Ordering::Relaxed)
    }

    /// Monotonic count of transitions into sickness, per spec §3's
    /// `failsCount`. Never decreases, unlike the hysteresis streaks.
    pub fn fails_count(&self) -> u64 {
        self.fails_count.load(Ordering::Relaxed)
    }

    pub fn accepts(&self) -> u64 {
        self.accepts.load(Ordering::Relaxed)
    }

    pub fn rejects(&self) -> u64 {
        self.rejects.load(Ordering::Relaxed)
    }

    pub fn last_submission_at(&self) -> i64 {
        self.last_submission_at.load(Ordering::Relaxed)
    }

    /// A failed call: bump the fail streak, reset the success streak, and
    /// latch sick once the streak reaches [`SICKNESS_THRESHOLD`].
    fn mark_fail(&self) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        let fails = self.consecutive_fails.fetch_add(1, Ordering::Relaxed) + 1;
        if fails >= SICKNESS_THRESHOLD {
            if !self.sick.swap(true, Ordering::Relaxed) {
                self.fails_count.fetch_add(1, Ordering::Relaxed);
                warn!(upstream = %self.name, "marking upstream sick");
            }
        }
    }

    /// A successful call: bump the success streak, reset the fail streak,
    /// and clear sick (resetting both streaks) once the streak reaches
    /// [`SICKNESS_THRESHOLD`].
    fn mark_success(&self) {
        self.consecutive_fails.store(0, Ordering::Relaxed);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= SICKNESS_THRESHOLD {
            if self.sick.swap(false, Ordering::Relaxed) {
                debug!(upstream = %self.name, "upstream recovered");
            }
            self.consecutive_fails.store(0, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.mark_fail();
                UpstreamError::Transport {
                    upstream: self.name.clone(),
                    method: method.to_string(),
                    message: e.to_string(),
                }
            })?;

        let parsed: Value = resp.json().await.map_err(|e| {
            self.mark_fail();
            UpstreamError::Transport {
                upstream: self.name.clone(),
                method: method.to_string(),
                message: e.to_string(),
            }
        })?;

        if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
            self.mark_fail();
            return Err(UpstreamError::Protocol {
                upstream: self.name.clone(),
                method: method.to_string(),
                message: err.to_string(),
            });
        }

        self.mark_success();
        Ok(parsed.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, UpstreamError> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol {
            upstream: self.name.clone(),
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    /// `eth_getWork` -> `(header, seed, target)`.
    pub async fn get_work(&self) -> Result<(String, String, String), UpstreamError> {
        let result: [String; 3] = self.call_as("eth_getWork", json!([])).await?;
        let [header, seed, target] = result;
        Ok((header, seed, target))
    }

    /// `eth_getBlockByNumber("pending", false)` -> height/difficulty for the
    /// block the current header belongs to.
    pub async fn get_pending_block(&self) -> Result<PendingBlock, UpstreamError> {
        #[derive(serde::Deserialize)]
        struct RawBlock {
            number: String,
            difficulty: String,
        }
        let raw: RawBlock = self
            .call_as("eth_getBlockByNumber", json!(["pending", false]))
            .await?;
        let height = parse_hex_u64(&raw.number, &self.name, "eth_getBlockByNumber")?;
        let difficulty = U256::from_hex(&raw.difficulty).map_err(|e| UpstreamError::Protocol {
            upstream: self.name.clone(),
            method: "eth_getBlockByNumber".to_string(),
            message: e.to_string(),
        })?;
        Ok(PendingBlock { height, difficulty })
    }

    /// `eth_submitWork(nonce, header, mix_digest)`. `lastSubmissionAt` only
    /// advances on acceptance; both an RPC error and an explicit
    /// `result=false` count against `rejects`.
    pub async fn submit_block(
        &self,
        nonce_hex: &str,
        header_hex: &str,
        mix_digest_hex: &str,
    ) -> Result<(), UpstreamError> {
        match self
            .call_as::<bool>(
                "eth_submitWork",
                json!([nonce_hex, header_hex, mix_digest_hex]),
            )
            .await
        {
            Ok(true) => {
                self.last_submission_at
                    .store(current_millis(), Ordering::Relaxed);
                self.accepts.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(false) => {
                self.rejects.fetch_add(1, Ordering::Relaxed);
                Err(UpstreamError::Rejected {
                    upstream: self.name.clone(),
                })
            }
            Err(e) => {
                self.rejects.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// `eth_submitHashrate(hashrate, client_id)`. Forwarding this upstream is
    /// best-effort: a transport failure here should not itself latch the
    /// upstream sick the way a work/submission failure does, so callers
    /// should treat errors as advisory.
    pub async fn submit_hashrate(&self, hashrate_hex: &str, client_id: &str) -> Result<bool, UpstreamError> {
        self.call_as("eth_submitHashrate", json!([hashrate_hex, client_id]))
            .await
    }

    /// Health probe: a bare `eth_getWork` call, success/failure tracked the
    /// same way as any other call. Returns whether the upstream is healthy
    /// *after* the probe.
    pub async fn check(&self) -> bool {
        let _ = self.get_work().await;
        !self.is_sick()
    }
}

fn parse_hex_u64(s: &str, upstream: &str, method: &str) -> Result<u64, UpstreamError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(trimmed, 16).map_err(|e| UpstreamError::Protocol {
        upstream: upstream.to_string(),
        method: method.to_string(),
        message: e.to_string(),
    })
}

fn current_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> UpstreamClient {
        UpstreamClient::new("primary", "http://127.0.0.1:1", false, Duration::from_millis(50))
    }

    #[test]
    fn starts_healthy() {
        let c = client();
        assert!(!c.is_sick());
    }

    #[test]
    fn latches_sick_after_threshold_fails() {
        let c = client();
        for _ in 0..SICKNESS_THRESHOLD {
            c.mark_fail();
        }
        assert!(c.is_sick());
    }

    #[test]
    fn fails_count_increments_once_per_sick_transition() {
        let c = client();
        for _ in 0..SICKNESS_THRESHOLD {
            c.mark_fail();
        }
        assert_eq!(c.fails_count(), 1);
        // Further fails while already sick don't bump the counter again.
        c.mark_fail();
        assert_eq!(c.fails_count(), 1);

        for _ in 0..SICKNESS_THRESHOLD {
            c.mark_success();
        }
        assert!(!c.is_sick());
        for _ in 0..SICKNESS_THRESHOLD {
            c.mark_fail();
        }
        assert_eq!(c.fails_count(), 2);
    }

    #[test]
    fn stays_healthy_below_threshold() {
        let c = client();
        for _ in 0..(SICKNESS_THRESHOLD - 1) {
            c.mark_fail();
        }
        assert!(!c.is_sick());
    }

    #[test]
    fn clears_sick_after_threshold_successes() {
        let c = client();
        for _ in 0..SICKNESS_THRESHOLD {
            c.mark_fail();
        }
        assert!(c.is_sick());
        for _ in 0..SICKNESS_THRESHOLD {
            c.mark_success();
        }
        assert!(!c.is_sick());
    }

    #[test]
    fn interleaved_success_resets_fail_streak() {
        let c = client();
        for _ in 0..(SICKNESS_THRESHOLD - 1) {
            c.mark_fail();
        }
        c.mark_success();
        for _ in 0..(SICKNESS_THRESHOLD - 1) {
            c.mark_fail();
        }
        assert!(!c.is_sick());
    }
}
