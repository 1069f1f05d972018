//! Trait interfaces for the Bond protocol.
//!
//! These traits define the contracts between crates:
//! - [`VotingPower`]: historical locked-balance queries (bond-ledger implements)
//! - [`UtilizationSource`]: per-epoch utilization feed from the vault layer
//!   (bond-rewards ships an in-memory implementation)

use crate::error::LedgerError;
use crate::types::{AccountId, Epoch, LockedBalance, Timestamp};

/// Read-only view of the decaying voting-escrow balances.
///
/// Queries accept any timestamp at or after the relevant genesis, past or
/// present, and answer from immutable checkpoint history.
pub trait VotingPower: Send + Sync {
    /// Voting power of `account` at `t`, in base units.
    ///
    /// Accounts that never locked report 0.
    ///
    /// # Errors
    ///
    /// [`LedgerError::QueryBeforeGenesis`] if `t` precedes the account's
    /// first checkpoint.
    fn balance_of(&self, account: &AccountId, t: Timestamp) -> Result<u64, LedgerError>;

    /// Aggregate voting power at `t`, in base units.
    ///
    /// # Errors
    ///
    /// [`LedgerError::QueryBeforeGenesis`] if `t` precedes the first global
    /// checkpoint.
    fn total_supply_at(&self, t: Timestamp) -> Result<u64, LedgerError>;

    /// Current lock of `account`, if any.
    fn locked_balance(&self, account: &AccountId) -> Option<LockedBalance>;

    /// Total principal currently held by all locks.
    fn total_locked(&self) -> u64;

    /// Voting power at `t`, treating "before genesis" as zero power.
    ///
    /// Default implementation maps [`LedgerError::QueryBeforeGenesis`] to 0.
    fn balance_or_zero(&self, account: &AccountId, t: Timestamp) -> Result<u64, LedgerError> {
        match self.balance_of(account, t) {
            Err(LedgerError::QueryBeforeGenesis { .. }) => Ok(0),
            other => other,
        }
    }

    /// Aggregate voting power at `t`, treating "before genesis" as zero.
    fn total_supply_or_zero(&self, t: Timestamp) -> Result<u64, LedgerError> {
        match self.total_supply_at(t) {
            Err(LedgerError::QueryBeforeGenesis { .. }) => Ok(0),
            other => other,
        }
    }
}

/// Net deposit activity reported by the vault accounting layer.
///
/// A delta is deposits minus redemptions in base units and may be negative.
pub trait UtilizationSource: Send + Sync {
    /// Net utilization of `account` during `epoch`.
    fn personal_utilization_delta(&self, account: &AccountId, epoch: Epoch) -> i128;

    /// Protocol-wide net utilization during `epoch`.
    fn system_utilization_delta(&self, epoch: Epoch) -> i128;
}
