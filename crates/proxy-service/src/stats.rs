//! Stats reporter: read-only JSON snapshot of miners, upstreams, and the
//! current template, per spec §6.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use proxy_core::constants::SHARE_RETENTION_MS;
use proxy_core::target::U256;

use crate::state::ProxyState;

pub fn router(state: Arc<ProxyState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct MinerStat {
    name: String,
    hashrate: i64,
    hashrate24h: i64,
    #[serde(rename = "lastBeat")]
    last_beat: i64,
    #[serde(rename = "validShares")]
    valid_shares: u64,
    #[serde(rename = "invalidShares")]
    invalid_shares: u64,
    #[serde(rename = "validBlocks")]
    valid_blocks: u64,
    #[serde(rename = "invalidBlocks")]
    invalid_blocks: u64,
    ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<bool>,
}

#[derive(Serialize)]
struct UpstreamStat {
    name: String,
    url: String,
    sick: bool,
    current: bool,
}

#[derive(Serialize)]
struct StatsResponse {
    miners: Vec<MinerStat>,
    hashrate: i64,
    hashrate24h: i64,
    #[serde(rename = "totalMiners")]
    total_miners: usize,
    #[serde(rename = "totalOnline")]
    total_online: usize,
    #[serde(rename = "timedOut")]
    timed_out: usize,
    upstreams: Vec<UpstreamStat>,
    #[serde(rename = "validBlocks")]
    valid_blocks: u64,
    #[serde(rename = "invalidBlocks")]
    invalid_blocks: u64,
    url: String,
    height: u64,
    diff: U256,
    now: i64,
}

async fn handle_stats(State(state): State<Arc<ProxyState>>, headers: HeaderMap) -> Response {
    if let Some(resp) = check_auth(&state, &headers) {
        return resp;
    }
    Json(snapshot(&state)).into_response()
}

fn check_auth(state: &ProxyState, headers: &HeaderMap) -> Option<Response> {
    let (Some(login), Some(password)) = (&state.config.frontend.login, &state.config.frontend.password) else {
        return None;
    };

    let unauthorized = || {
        let mut resp = StatusCode::UNAUTHORIZED.into_response();
        resp.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            "Basic realm=\"stats\"".parse().unwrap(),
        );
        resp
    };

    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Some(unauthorized());
    };
    let Ok(header) = header.to_str() else {
        return Some(unauthorized());
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return Some(unauthorized());
    };
    let Ok(decoded) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded) else {
        return Some(unauthorized());
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return Some(unauthorized());
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return Some(unauthorized());
    };

    if user == login && pass == password {
        None
    } else {
        Some(unauthorized())
    }
}

fn snapshot(state: &ProxyState) -> StatsResponse {
    let now = now_ms();
    let template = state.template();
    let window_ms = state.config.proxy.hashrate_window.as_millis() as i64;
    let client_timeout_ms = state.config.proxy.client_timeout.as_millis() as i64;

    let mut hashrate = 0i64;
    let mut hashrate24h = 0i64;
    let mut total_online = 0usize;
    let mut timed_out = 0usize;

    let miners: Vec<MinerStat> = state
        .miners
        .snapshot()
        .into_iter()
        .map(|m| {
            let rate = m.hashrate(window_ms, now);
            let rate24h = m.hashrate(SHARE_RETENTION_MS, now);
            hashrate += rate;
            hashrate24h += rate24h;

            let age = now - m.last_beat();
            let timeout = age >= client_timeout_ms;
            let warning = !timeout && age >= client_timeout_ms / 2;
            if timeout {
                timed_out += 1;
            } else {
                total_online += 1;
            }

            MinerStat {
                name: m.id.clone(),
                hashrate: rate,
                hashrate24h: rate24h,
                last_beat: m.last_beat(),
                valid_shares: m.valid_shares(),
                invalid_shares: m.invalid_shares(),
                valid_blocks: m.valid_blocks(),
                invalid_blocks: m.invalid_blocks(),
                ip: m.ip.clone(),
                warning: warning.then_some(true),
                timeout: timeout.then_some(true),
            }
        })
        .collect();

    let current_index = state.selector.current_index();
    let upstreams = state
        .selector
        .upstreams()
        .iter()
        .enumerate()
        .map(|(idx, u)| UpstreamStat {
            name: u.name.clone(),
            url: u.url.clone(),
            sick: u.is_sick(),
            current: idx == current_index,
        })
        .collect();

    StatsResponse {
        total_miners: miners.len(),
        miners,
        hashrate,
        hashrate24h,
        total_online,
        timed_out,
        upstreams,
        valid_blocks: state.valid_blocks(),
        invalid_blocks: state.invalid_blocks(),
        url: state.config.proxy.listen.clone(),
        height: template.height,
        diff: template.difficulty,
        now,
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
