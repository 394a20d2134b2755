//! Ethash mining proxy binary.
//!
//! Loads a JSON config, brings up the upstream selector and `ProxyState`,
//! runs an initial synchronous block-template refresh, then serves the
//! miner-facing and stats HTTP listeners until Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use proxy_service::ProxyConfig;
use proxy_upstream::{UpstreamClient, UpstreamSelector};
use tracing::{info, warn};

/// Ethash mining proxy
#[derive(Parser, Debug)]
#[command(name = "ether-proxy", version, about = "Ethash mining proxy with local share verification")]
struct Args {
    /// Path to the JSON config file
    #[arg(default_value = "./config.json")]
    config_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ProxyConfig::from_path(&args.config_path)
        .with_context(|| format!("loading config from {}", args.config_path.display()))?;
    init_logging(&args.log_level, &args.log_format);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.threads > 0 {
        builder.worker_threads(config.threads);
    }
    let runtime = builder.build().context("building tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: ProxyConfig) -> Result<()> {
    let miner_listen = config.proxy.listen.clone();
    let stats_listen = config.frontend.listen.clone();

    let mut clients = Vec::with_capacity(config.upstream.len());
    for (idx, upstream) in config.upstream.iter().enumerate() {
        if idx == 0 {
            info!(name = %upstream.name, url = %upstream.url, "default upstream");
        }
        clients.push(Arc::new(UpstreamClient::new(
            upstream.name.clone(),
            upstream.url.clone(),
            upstream.pool,
            upstream.timeout,
        )));
    }
    let selector = Arc::new(UpstreamSelector::new(clients));
    let state = Arc::new(proxy_service::ProxyState::new(config, selector));

    if let Err(e) = proxy_service::cache::refresh(&state).await {
        warn!(error = %e, "initial block template refresh failed, starting with empty template");
    }

    let tickers = proxy_service::scheduler::spawn(state.clone());

    let miner_listener = tokio::net::TcpListener::bind(&miner_listen)
        .await
        .with_context(|| format!("binding miner listener on {miner_listen}"))?;
    let stats_listener = tokio::net::TcpListener::bind(&stats_listen)
        .await
        .with_context(|| format!("binding stats listener on {stats_listen}"))?;

    info!(addr = %miner_listen, "miner listener up");
    info!(addr = %stats_listen, "stats listener up");

    let miner_app = proxy_service::session::router(state.clone())
        .into_make_service_with_connect_info::<SocketAddr>();
    let stats_app = proxy_service::stats::router(state.clone());

    let miner_server = axum::serve(miner_listener, miner_app).with_graceful_shutdown(shutdown_signal());
    let stats_server = axum::serve(stats_listener, stats_app).with_graceful_shutdown(shutdown_signal());

    info!("ether-proxy running (Ctrl+C to stop)");
    let (miner_result, stats_result) = tokio::join!(miner_server, stats_server);
    miner_result.context("miner listener exited")?;
    stats_result.context("stats listener exited")?;

    for ticker in tickers {
        ticker.abort();
    }
    info!("ether-proxy shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("received Ctrl+C, shutting down...");
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output (suitable for log
/// aggregation pipelines). Any other value defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
