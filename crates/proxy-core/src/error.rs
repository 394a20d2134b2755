//! Error kinds for the mining proxy, per spec §7.
use thiserror::Error;

/// Errors arising while talking to an upstream JSON-RPC daemon.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("transport error calling {method} on {upstream}: {message}")]
    Transport {
        upstream: String,
        method: String,
        message: String,
    },
    #[error("upstream {upstream} returned RPC error for {method}: {message}")]
    Protocol {
        upstream: String,
        method: String,
        message: String,
    },
    #[error("upstream {upstream} rejected submission (result=false)")]
    Rejected { upstream: String },
}

/// Errors arising while processing a single miner share, per spec §4.4/§7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("invalid nonce")]
    InvalidNonce,
    #[error("invalid share at miner difficulty")]
    InvalidShare,
    #[error("header not in current template or backlog")]
    StaleHeader,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Errors surfaced by the session/RPC dispatcher, per spec §4.6/§7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("socket flood: line exceeded {max} bytes")]
    SocketFlood { max: usize },
    #[error("malformed JSON-RPC request: {0}")]
    MalformedRequest(String),
    #[error("missing RPC id")]
    MissingId,
}

/// Top-level error type for the mining proxy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("no block template available yet")]
    NotReady,
    #[error("config error: {0}")]
    Config(String),
}

