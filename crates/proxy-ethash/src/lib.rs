//! # proxy-ethash — local proof-of-work verification.
//!
//! The proxy checks every submitted share itself before forwarding
//! anything upstream, so a flood of invalid shares never reaches the
//! daemon. This crate owns that check.
//!
//! Phase 1: a BLAKE3-based deterministic stand-in for Ethash, gated behind
//! the same [`engine::PowVerifier`] trait a real DAG-backed implementation
//! would later satisfy. Phase 2 would add genuine Ethash light-client
//! verification (cache generation + DAG lookups) behind that trait without
//! touching any call site.

pub mod engine;

pub use engine::{verify_pow, PowVerifier, StandInVerifier};
