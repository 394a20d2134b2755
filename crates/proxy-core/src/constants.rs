//! Protocol constants for the mining proxy.

/// Historical unit choice: miners report difficulty in units where `1.0`
/// corresponds to `10^8` hashes. Must match between [`crate::target::make_target_hex`]
/// and the share processor's difficulty adjustment.
pub const SHARE_DIFFICULTY_MULTIPLIER: f64 = 100_000_000.0;

/// Default miner difficulty used when a `{diff}` path segment fails to parse.
pub const DEFAULT_MINER_DIFFICULTY: f64 = 5.0;

/// Maximum bytes read per newline-delimited request line before the
/// connection is treated as flooding and closed.
pub const MAX_REQUEST_LINE_SIZE: usize = 1024;

/// Number of consecutive failed RPCs required to latch an upstream as sick,
/// and the number of consecutive successful probes required to clear it.
pub const SICKNESS_THRESHOLD: u32 = 5;

/// Capacity of the per-template backlog of recently valid headers (solo mode).
pub const HEADERS_BACKLOG_CAPACITY: usize = 8;

/// Shares older than this are purged lazily from a miner's share log.
pub const SHARE_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;
