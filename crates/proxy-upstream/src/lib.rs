//! # proxy-upstream
//! JSON-RPC client for an Ethereum-protocol daemon, plus health-tracked
//! upstream selection with failover.
//!
//! The upstream is not a Rust-protocol peer, so calls are built by hand with
//! `serde_json::json!` envelopes over [`reqwest`] rather than through a
//! typed RPC client crate — the same shape `rill-explorer`'s `RpcClient`
//! uses to talk to a node it doesn't control the schema of.

pub mod client;
pub mod selector;

pub use client::{PendingBlock, UpstreamClient};
pub use selector::UpstreamSelector;
