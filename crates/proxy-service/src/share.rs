//! Share processor: the per-submit pipeline of spec §4.4 — parse, verify at
//! miner difficulty, credit the miner, conditionally verify at network
//! difficulty, submit upstream, and update accounting.

use std::sync::Arc;

use tracing::{info, warn};

use proxy_core::target::{adjusted_difficulty, parse_miner_difficulty, U256};
use proxy_core::types::{HeaderDescriptor, Miner};

use crate::state::ProxyState;

/// Process one `eth_submitWork` call. Returns the boolean reply the miner
/// sees: `true` once the share verifies at miner difficulty, regardless of
/// whether the upstream subsequently accepts a block-level forward.
pub async fn process_share(
    state: &ProxyState,
    miner: &Arc<Miner>,
    diff_str: &str,
    nonce_hex: &str,
    header_hex: &str,
    mix_digest_hex: &str,
) -> bool {
    if parse_nonce(nonce_hex).is_err() {
        warn!(miner = %miner.id, nonce = %nonce_hex, "malformed nonce");
        return false;
    }

    let upstream = state.selector.current();
    let pool_mode = upstream.pool;
    let template = state.template();
    let now = now_ms();

    let (share_difficulty, block_difficulty) = if pool_mode {
        (template.difficulty, template.difficulty)
    } else {
        let descriptor = if header_hex == template.header {
            HeaderDescriptor {
                difficulty: template.difficulty,
                height: template.height,
            }
        } else {
            match template.resolve_header(header_hex) {
                Some(d) => d,
                None => {
                    warn!(miner = %miner.id, header = %header_hex, "stale header, not in current template or backlog");
                    return false;
                }
            }
        };
        let miner_difficulty = parse_miner_difficulty(diff_str);
        let adj = adjusted_difficulty(miner_difficulty).max(1);
        (U256::from_u128(adj as u128), descriptor.difficulty)
    };

    let miner_target = U256::pow256_div(share_difficulty);
    let valid = match proxy_ethash::verify_pow(header_hex, nonce_hex, mix_digest_hex, &miner_target) {
        Ok(v) => v,
        Err(e) => {
            warn!(miner = %miner.id, error = %e, "ethash verify error");
            return false;
        }
    };

    if !valid {
        miner.record_invalid_share(now);
        return false;
    }

    miner.record_valid_share(now, share_difficulty.to_i64_saturating());
    if !pool_mode {
        state.add_round_share(share_difficulty.to_i64_saturating());
    }
    info!(miner = %miner.id, ip = %miner.ip, difficulty = %share_difficulty, "valid share");

    let should_forward = if pool_mode {
        true
    } else {
        let block_target = U256::pow256_div(block_difficulty);
        matches!(
            proxy_ethash::verify_pow(header_hex, nonce_hex, mix_digest_hex, &block_target),
            Ok(true)
        )
    };

    if !should_forward {
        return true;
    }

    match upstream.submit_block(nonce_hex, header_hex, mix_digest_hex).await {
        Err(e) => {
            miner.record_invalid_block();
            state.record_invalid_block();
            warn!(miner = %miner.id, height = template.height, header = %template.header, error = %e, "upstream share submission failure");
        }
        Ok(()) => {
            miner.record_valid_block();
            state.record_valid_block();
            info!(miner = %miner.id, ip = %miner.ip, height = template.height, "upstream share found");
            if !pool_mode {
                if let Err(e) = crate::cache::refresh(state).await {
                    warn!(error = %e, "block template refresh after solo block failed");
                }
                state.settle_round(now, &block_difficulty);
            }
        }
    }

    true
}

fn parse_nonce(nonce_hex: &str) -> Result<u64, std::num::ParseIntError> {
    let trimmed = nonce_hex.strip_prefix("0x").unwrap_or(nonce_hex);
    u64::from_str_radix(trimmed, 16)
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
