//! Target arithmetic: conversions between a floating miner-difficulty value,
//! a 256-bit integer difficulty, and a 32-byte big-endian target hex string.
//!
//! `target = 2^256 / difficulty_int`. No workspace dependency on a
//! big-integer crate exists for this, and adding one for a single division
//! is unwarranted — this follows the teacher's own `u128`-widening idiom
//! (see `difficulty::next_target` in the original `rill-core`) one step
//! further, to a hand-rolled 256-bit unsigned integer with just the
//! operations this module needs: comparison, subtraction, bit shifting,
//! and big-endian byte/hex conversion.

use std::fmt;

use serde::Serialize;

use crate::constants::{DEFAULT_MINER_DIFFICULTY, SHARE_DIFFICULTY_MULTIPLIER};

/// An unsigned 256-bit integer, stored as two big-endian `u128` limbs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct U256 {
    hi: u128,
    lo: u128,
}

impl U256 {
    pub const ZERO: U256 = U256 { hi: 0, lo: 0 };
    pub const ONE: U256 = U256 { hi: 0, lo: 1 };
    pub const MAX: U256 = U256 {
        hi: u128::MAX,
        lo: u128::MAX,
    };

    pub const fn from_u128(v: u128) -> Self {
        U256 { hi: 0, lo: v }
    }

    pub const fn from_u64(v: u64) -> Self {
        Self::from_u128(v as u128)
    }

    pub fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    fn bit(&self, i: u32) -> bool {
        if i >= 128 {
            (self.hi >> (i - 128)) & 1 == 1
        } else {
            (self.lo >> i) & 1 == 1
        }
    }

    fn set_bit(&mut self, i: u32) {
        if i >= 128 {
            self.hi |= 1u128 << (i - 128);
        } else {
            self.lo |= 1u128 << i;
        }
    }

    fn shl1(&mut self) {
        let carry = self.lo >> 127;
        self.lo <<= 1;
        self.hi = (self.hi << 1) | carry;
    }

    /// Saturating subtraction assuming `self >= other` (panics in debug
    /// builds otherwise, matching the invariant every call site upholds).
    fn sub(&self, other: &U256) -> U256 {
        let (lo, borrow) = self.lo.overflowing_sub(other.lo);
        let hi = self.hi.wrapping_sub(other.hi).wrapping_sub(borrow as u128);
        U256 { hi, lo }
    }

    fn checked_add(&self, other: &U256) -> Option<U256> {
        let (lo, carry_lo) = self.lo.overflowing_add(other.lo);
        let (hi, carry_hi1) = self.hi.overflowing_add(other.hi);
        let (hi, carry_hi2) = hi.overflowing_add(carry_lo as u128);
        if carry_hi1 || carry_hi2 {
            None
        } else {
            Some(U256 { hi, lo })
        }
    }

    /// Unsigned long division by bit-shifting restoring division.
    /// `divisor` must be non-zero.
    fn divmod(&self, divisor: &U256) -> (U256, U256) {
        debug_assert!(!divisor.is_zero());
        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for i in (0..256).rev() {
            remainder.shl1();
            if self.bit(i) {
                remainder.lo |= 1;
            }
            if remainder >= *divisor {
                remainder = remainder.sub(divisor);
                quotient.set_bit(i);
            }
        }
        (quotient, remainder)
    }

    /// `floor(2^256 / divisor)`, saturating to [`U256::MAX`] when `divisor`
    /// is zero or one (both represent "accept anything").
    pub fn pow256_div(divisor: U256) -> U256 {
        if divisor.is_zero() {
            return U256::MAX;
        }
        let (q0, r0) = U256::MAX.divmod(&divisor);
        // floor(2^256 / d) = floor(((2^256 - 1) + 1) / d) = q0 + 1 iff r0 + 1 == d.
        let divisor_minus_one = divisor.sub(&U256::ONE);
        if r0 == divisor_minus_one {
            q0.checked_add(&U256::ONE).unwrap_or(U256::MAX)
        } else {
            q0
        }
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[0..16].copy_from_slice(&self.hi.to_be_bytes());
        buf[16..32].copy_from_slice(&self.lo.to_be_bytes());
        buf
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 32];
        let take = bytes.len().min(32);
        let start = bytes.len() - take;
        buf[32 - take..].copy_from_slice(&bytes[start..]);
        let hi = u128::from_be_bytes(buf[0..16].try_into().unwrap());
        let lo = u128::from_be_bytes(buf[16..32].try_into().unwrap());
        U256 { hi, lo }
    }

    /// Minimum-length big-endian hex, `0x`-prefixed, matching spec §4.1.
    /// `0` renders as `0x0`.
    pub fn to_hex(self) -> String {
        let bytes = self.to_be_bytes();
        let mut i = 0;
        while i < 31 && bytes[i] == 0 {
            i += 1;
        }
        if bytes[i] == 0 {
            "0x0".to_string()
        } else {
            format!("0x{}", hex::encode(&bytes[i..]))
        }
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let s = if s.len() % 2 == 1 {
            format!("0{s}")
        } else {
            s.to_string()
        };
        let bytes = hex::decode(s)?;
        Ok(Self::from_be_bytes(&bytes))
    }

    /// Saturating narrowing to `i64`, for share-difficulty accounting where
    /// the share log and luck ratios are tracked as plain 64-bit integers.
    pub fn to_i64_saturating(self) -> i64 {
        if self.hi != 0 {
            return i64::MAX;
        }
        self.lo.min(i64::MAX as u128) as i64
    }

    /// Lossy widening to `f64`, for the luck ratio (`roundShares /
    /// networkDifficulty`) which is inherently an approximation.
    pub fn to_f64(self) -> f64 {
        (self.hi as f64) * 2f64.powi(128) + (self.lo as f64)
    }
}

impl fmt::Display for U256 {
    /// Decimal rendering via repeated division by ten, used for logging and
    /// the stats JSON `diff` field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let ten = U256::from_u64(10);
        let mut digits = Vec::new();
        let mut v = *self;
        while !v.is_zero() {
            let (q, r) = v.divmod(&ten);
            digits.push((r.lo as u8) + b'0');
            v = q;
        }
        digits.reverse();
        write!(f, "{}", String::from_utf8(digits).unwrap())
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({self})")
    }
}

impl Serialize for U256 {
    /// Serialized as its decimal string, since most targets consuming this
    /// JSON (dashboards, `jq`) don't parse 256-bit integers natively.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Parse a miner difficulty string, defaulting to
/// [`DEFAULT_MINER_DIFFICULTY`] on parse failure or a non-positive/non-finite
/// value, per spec §4.1.
pub fn parse_miner_difficulty(diff_str: &str) -> f64 {
    match diff_str.parse::<f64>() {
        Ok(d) if d.is_finite() && d > 0.0 => d,
        _ => DEFAULT_MINER_DIFFICULTY,
    }
}

/// `adj = floor(d * 10^8)` as a signed 64-bit integer, per spec §4.1.
pub fn adjusted_difficulty(miner_difficulty: f64) -> i64 {
    (miner_difficulty * SHARE_DIFFICULTY_MULTIPLIER).floor() as i64
}

/// Build the minimum-length, `0x`-prefixed big-endian target hex string for
/// a miner difficulty, per spec §4.1: `target = 2^256 / max(adj, 1)`.
pub fn make_target_hex(miner_difficulty: f64) -> String {
    let adj = adjusted_difficulty(miner_difficulty).max(1);
    let divisor = U256::from_u128(adj as u128);
    U256::pow256_div(divisor).to_hex()
}

/// Inverse of [`make_target_hex`]: `diff(target) = 2^256 / int(target)`.
pub fn target_hex_to_diff(target_hex: &str) -> Result<U256, hex::FromHexError> {
    let target = U256::from_hex(target_hex)?;
    Ok(U256::pow256_div(target))
}
