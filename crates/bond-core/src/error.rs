//! Error types for the Bond protocol.
//!
//! Validation errors are permanent for the given input. Temporal errors
//! (`QueryBeforeGenesis`, `EpochNotFinalized`, `LockNotExpired`) mean "not yet
//! valid" and may succeed once time advances.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid ledger config: {0}")] InvalidConfig(&'static str),
    #[error("lock amount must be non-zero")] ZeroAmount,
    #[error("invalid lock duration: end {end} at now {now}")] InvalidDuration { end: u64, now: u64 },
    #[error("lock already exists for {0}")] LockExists(String),
    #[error("no lock for {0}")] NoLock(String),
    #[error("lock expired at {end}")] LockExpired { end: u64 },
    #[error("lock not expired: ends {end}, now {now}")] LockNotExpired { end: u64, now: u64 },
    #[error("query at {t} precedes first checkpoint at {genesis}")] QueryBeforeGenesis { t: u64, genesis: u64 },
    #[error("timestamp {now} precedes last checkpoint {last}")] NonMonotonicTimestamp { now: u64, last: u64 },
    #[error("corrupt checkpoint history: {0}")] CorruptHistory(String),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("reduction cliff {0} outside [1, 365]")] InvalidReductionCliff(u64),
    #[error("reduction {0} bps exceeds 1000")] ReductionTooLarge(u64),
    #[error("emissions per epoch must be non-zero")] ZeroEmissions,
    #[error("epoch length must be non-zero")] ZeroEpochLength,
    #[error("schedule start {start} precedes now {now}")] StartInPast { start: u64, now: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("epoch {epoch} not finalized: ends {end}, now {now}")] EpochNotFinalized { epoch: u64, end: u64, now: u64 },
    #[error("nothing to claim for {account} in epoch {epoch}")] NothingToClaim { account: String, epoch: u64 },
    #[error("claim window closed for epoch {epoch} (current epoch {current})")] ClaimWindowClosed { epoch: u64, current: u64 },
    #[error("invalid reward policy: {0}")] InvalidPolicy(&'static str),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Schedule(#[from] ScheduleError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing 0x prefix")] MissingPrefix,
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
}

#[derive(Error, Debug)]
pub enum BondError {
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Schedule(#[from] ScheduleError),
    #[error(transparent)] Reward(#[from] RewardError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error("storage: {0}")] Storage(String),
    #[error("config: {0}")] Config(String),
}
