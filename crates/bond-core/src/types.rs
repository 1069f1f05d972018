//! Core protocol types: accounts, locks, checkpoints.
//!
//! Principal amounts are `u64` base units. Voting power is `u128` scaled by
//! [`POWER_PRECISION`](crate::constants::POWER_PRECISION).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Zero-based epoch index of the emission schedule.
pub type Epoch = u64;

/// A 20-byte account identifier, rendered as `0x`-prefixed lowercase hex.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The all-zero account.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.len() != 40 {
            return Err(AddressError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 20]> for AccountId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A principal locked until `end`.
///
/// `end` is always a multiple of the ledger's time unit. A default
/// (zeroed) value means "no lock".
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockedBalance {
    /// Locked principal in base units.
    pub amount: u64,
    /// Unlock timestamp.
    pub end: Timestamp,
}

impl LockedBalance {
    /// Whether the lock has reached its unlock time at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.end
    }

    /// Whether the lock still carries voting power at `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.amount > 0 && !self.is_expired(now)
    }

    /// Seconds of lock time left at `now` (0 once expired).
    pub fn remaining(&self, now: Timestamp) -> u64 {
        self.end.saturating_sub(now)
    }
}

/// An immutable checkpoint of a decaying balance curve.
///
/// Describes the ray `power(t) = max(0, bias - slope * (t - ts))` for
/// `t >= ts`. `bias` and `slope` are scaled by `POWER_PRECISION`; `slope` is
/// per second.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Point {
    /// Voting power at `ts`.
    pub bias: u128,
    /// Decay per second.
    pub slope: u128,
    /// Timestamp the checkpoint was written at.
    pub ts: Timestamp,
    /// Monotonic sequence number of the mutation that wrote it.
    pub seq: u64,
}

impl Point {
    /// Power remaining `elapsed` seconds after `ts`, saturating at zero.
    ///
    /// Takes the elapsed time rather than an absolute timestamp: callers must
    /// obtain `elapsed` from a selection that already guarantees `ts <= t`.
    pub fn power_after(&self, elapsed: u64) -> u128 {
        self.bias
            .saturating_sub(self.slope.saturating_mul(elapsed as u128))
    }

    /// Whether this point carries no power and no decay.
    pub fn is_zero(&self) -> bool {
        self.bias == 0 && self.slope == 0
    }
}
