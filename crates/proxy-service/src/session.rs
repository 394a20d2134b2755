//! Session / RPC dispatcher: the miner-facing HTTP surface, per spec §4.6.
//!
//! Each miner opens one long-lived `POST /miner/{diff}/{id}`; the body is a
//! sequence of newline-delimited JSON-RPC 2.0 requests. Responses are
//! streamed back line-for-line rather than buffered, since a session can
//! outlive many refresh cycles.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use proxy_core::constants::MAX_REQUEST_LINE_SIZE;
use proxy_core::target::{make_target_hex, parse_miner_difficulty};
use proxy_core::types::Miner;

use crate::state::ProxyState;

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/miner/{diff}/{id}", post(handle_miner))
        .with_state(state)
}

#[derive(Deserialize)]
struct RpcRequest {
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

enum DispatchOutcome {
    Respond(String),
    Silent,
    Close,
}

async fn handle_miner(
    State(state): State<Arc<ProxyState>>,
    Path((diff, id)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Body,
) -> Response {
    let miner = state.miners.get_or_create(&id, &addr.ip().to_string(), now_ms());
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(32);

    tokio::spawn(read_loop(state, miner, diff, body, tx));

    let outbound = ReceiverStream::new(rx).map(|line| Ok::<_, std::io::Error>(format!("{line}\n")));
    Response::new(Body::from_stream(outbound))
}

/// Drains the request body, splitting it into newline-terminated lines and
/// dispatching each as an independent JSON-RPC call. Exits (dropping `tx`,
/// which ends the response stream) on EOF, a socket-flood line, or a
/// missing-`id` request.
async fn read_loop(
    state: Arc<ProxyState>,
    miner: Arc<Miner>,
    diff: String,
    body: Body,
    tx: tokio::sync::mpsc::Sender<String>,
) {
    let mut stream = body.into_data_stream();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        let chunk = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(_)) | None => return,
        };
        buf.extend_from_slice(&chunk);

        loop {
            let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
                if buf.len() > MAX_REQUEST_LINE_SIZE {
                    warn!(miner = %miner.id, "socket flood, closing connection");
                    return;
                }
                break;
            };
            let line: Vec<u8> = buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.len() > MAX_REQUEST_LINE_SIZE {
                warn!(miner = %miner.id, "socket flood, closing connection");
                return;
            }
            let text = String::from_utf8_lossy(line);
            if text.trim().is_empty() {
                continue;
            }
            match dispatch_line(&state, &miner, &diff, &text).await {
                DispatchOutcome::Respond(resp) => {
                    if tx.send(resp).await.is_err() {
                        return;
                    }
                }
                DispatchOutcome::Silent => {}
                DispatchOutcome::Close => {
                    warn!(miner = %miner.id, "malformed request, closing connection");
                    return;
                }
            }
        }
    }
}

async fn dispatch_line(state: &ProxyState, miner: &Arc<Miner>, diff: &str, line: &str) -> DispatchOutcome {
    let req: RpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(_) => return DispatchOutcome::Close,
    };
    let Some(id) = req.id else {
        return DispatchOutcome::Close;
    };

    match req.method.as_str() {
        "eth_getWork" => {
            let template = state.template();
            if !template.is_ready() {
                return DispatchOutcome::Respond(error_envelope(&id, -1, "Work not ready"));
            }
            let upstream = state.selector.current();
            let target = if upstream.pool {
                template.target.clone()
            } else {
                make_target_hex(parse_miner_difficulty(diff))
            };
            DispatchOutcome::Respond(success_envelope(
                &id,
                serde_json::json!([template.header, template.seed, target]),
            ))
        }
        "eth_submitWork" => {
            let params = string_params(&req.params);
            if params.len() < 3 {
                return DispatchOutcome::Silent;
            }
            let accepted =
                crate::share::process_share(state, miner, diff, &params[0], &params[1], &params[2]).await;
            DispatchOutcome::Respond(success_envelope(&id, serde_json::json!(accepted)))
        }
        "eth_submitHashrate" => {
            let params = string_params(&req.params);
            if params.len() < 2 {
                return DispatchOutcome::Silent;
            }
            let result = if state.config.proxy.submit_hashrate {
                let upstream = state.selector.current();
                upstream
                    .submit_hashrate(&params[0], &params[1])
                    .await
                    .unwrap_or(true)
            } else {
                true
            };
            DispatchOutcome::Respond(success_envelope(&id, serde_json::json!(result)))
        }
        _ => DispatchOutcome::Respond(error_envelope(&id, -1, "Invalid method")),
    }
}

fn string_params(params: &[Value]) -> Vec<String> {
    params.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
}

fn success_envelope(id: &Value, result: Value) -> String {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

fn error_envelope(id: &Value, code: i32, message: &str) -> String {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::Request;
    use proxy_upstream::{UpstreamClient, UpstreamSelector};
    use tower::ServiceExt;

    fn config(pool: bool) -> crate::config::ProxyConfig {
        let pool_json = if pool { "true" } else { "false" };
        crate::config::ProxyConfig::from_json(&format!(
            r#"{{
                "proxy": {{"listen":"0.0.0.0:8888","clientTimeout":"600s","blockRefreshInterval":"120ms","hashrateWindow":"30m","luckWindow":120,"largeLuckWindow":2160}},
                "frontend": {{"listen":"0.0.0.0:8080"}},
                "upstream": [{{"name":"main","url":"http://127.0.0.1:8545","timeout":"10s","pool":{pool_json}}}],
                "upstreamCheckInterval": "5s"
            }}"#
        ))
        .unwrap()
    }

    fn request(body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/miner/1.0/rig1")
            .body(Body::from(body.to_string()))
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));
        req
    }

    async fn drain(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn get_work_responds_not_ready_before_first_refresh() {
        let upstream = Arc::new(UpstreamClient::new("main", "http://127.0.0.1:1", false, Duration::from_millis(50)));
        let selector = Arc::new(UpstreamSelector::new(vec![upstream]));
        let state = Arc::new(ProxyState::new(config(false), selector));
        let app = router(state);

        let body = r#"{"id":1,"method":"eth_getWork","params":[]}
"#;
        let response = app.oneshot(request(body)).await.unwrap();
        let text = drain(response).await;
        assert!(text.contains("\"error\""));
        assert!(text.contains("Work not ready"));
    }

    #[tokio::test]
    async fn unknown_method_returns_invalid_method_error() {
        let upstream = Arc::new(UpstreamClient::new("main", "http://127.0.0.1:1", false, Duration::from_millis(50)));
        let selector = Arc::new(UpstreamSelector::new(vec![upstream]));
        let state = Arc::new(ProxyState::new(config(false), selector));
        let app = router(state);

        let body = "{\"id\":7,\"method\":\"eth_frobnicate\",\"params\":[]}\n";
        let response = app.oneshot(request(body)).await.unwrap();
        let text = drain(response).await;
        assert!(text.contains("Invalid method"));
        assert!(text.contains("\"id\":7"));
    }

    #[tokio::test]
    async fn missing_id_closes_connection_with_no_response() {
        let upstream = Arc::new(UpstreamClient::new("main", "http://127.0.0.1:1", false, Duration::from_millis(50)));
        let selector = Arc::new(UpstreamSelector::new(vec![upstream]));
        let state = Arc::new(ProxyState::new(config(false), selector));
        let app = router(state);

        let body = "{\"method\":\"eth_getWork\",\"params\":[]}\n";
        let response = app.oneshot(request(body)).await.unwrap();
        let text = drain(response).await;
        assert!(text.is_empty());
    }
}
