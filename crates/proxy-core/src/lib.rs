//! # proxy-core
//! Foundation types, errors, and target arithmetic for the Ethash mining proxy.

pub mod constants;
pub mod error;
pub mod target;
pub mod types;
