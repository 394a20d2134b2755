//! Background tickers: periodic block-template refresh and upstream health
//! checks, per spec §4.3/§4.2/§5.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::state::ProxyState;

/// Spawn the refresh and health-check tickers as independent tasks. Neither
/// task ever exits on its own; both run until the process does.
pub fn spawn(state: Arc<ProxyState>) -> Vec<JoinHandle<()>> {
    let refresh_interval = state.config.proxy.block_refresh_interval;
    let health_interval = state.config.upstream_check_interval;

    let refresh_state = state.clone();
    let refresh_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = crate::cache::refresh(&refresh_state).await {
                warn!(error = %e, "block template refresh failed");
            }
        }
    });

    let health_state = state.clone();
    let health_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(health_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            health_state.selector.check_upstreams().await;
        }
    });

    vec![refresh_task, health_task]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use proxy_upstream::{UpstreamClient, UpstreamSelector};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn refresh_ticker_populates_template_without_manual_poke() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        Mock::given(method("POST"))
            .respond_with(move |req: &wiremock::Request| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                let body: serde_json::Value = req.body_json().unwrap();
                match body["method"].as_str().unwrap() {
                    "eth_getWork" => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "jsonrpc": "2.0", "id": 0, "result": ["0xaaa", "0xseed", "0xff"],
                    })),
                    "eth_getBlockByNumber" => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "jsonrpc": "2.0", "id": 0, "result": {"number": "0x1", "difficulty": "0x1"},
                    })),
                    _ => ResponseTemplate::new(404),
                }
            })
            .mount(&server)
            .await;

        let upstream = Arc::new(UpstreamClient::new(
            "main",
            server.uri(),
            false,
            StdDuration::from_secs(5),
        ));
        let selector = Arc::new(UpstreamSelector::new(vec![upstream]));
        let config = crate::config::ProxyConfig::from_json(
            r#"{
                "proxy": {"listen":"0.0.0.0:8888","clientTimeout":"600s","blockRefreshInterval":"20ms","hashrateWindow":"30m","luckWindow":120,"largeLuckWindow":2160},
                "frontend": {"listen":"0.0.0.0:8080"},
                "upstream": [{"name":"main","url":"http://127.0.0.1:8545","timeout":"10s"}],
                "upstreamCheckInterval": "1h"
            }"#,
        )
        .unwrap();
        let state = Arc::new(ProxyState::new(config, selector));

        let handles = spawn(state.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.template().is_ready());
        for h in handles {
            h.abort();
        }
    }
}
