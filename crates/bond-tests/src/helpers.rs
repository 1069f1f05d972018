//! Shared fixtures for integration tests.

use bond_core::constants::{COIN, WEEK};
use bond_core::emission::{EmissionParams, EmissionScheduler};
use bond_core::types::{AccountId, Timestamp};
use bond_ledger::{DecayLedger, LedgerConfig};
use bond_rewards::{ClaimWindow, EligibilityEngine, UtilizationPolicy};

/// A week-aligned reference time well after the epoch.
pub const T0: Timestamp = 2_900 * WEEK;

/// Epoch length used by [`scheduler`].
pub const EPOCH: u64 = 2 * WEEK;

/// Emissions per epoch used by [`scheduler`].
pub const EMISSIONS: u64 = 1_000 * COIN;

/// Simple account id from a seed byte.
pub fn acct(seed: u8) -> AccountId {
    AccountId([seed; 20])
}

/// Ledger with default lock rules (2 year max, 2 week min, weekly unit).
pub fn ledger() -> DecayLedger {
    DecayLedger::new(LedgerConfig::default()).expect("default ledger config is valid")
}

/// Schedule starting at `start` with a cliff every 52 epochs and a 5%
/// reduction per cliff.
pub fn scheduler(start: Timestamp) -> EmissionScheduler {
    EmissionScheduler::from_params(EmissionParams {
        start,
        epoch_length: EPOCH,
        emissions_per_epoch: EMISSIONS,
        reduction_cliff: 52,
        reduction_bps: 500,
    })
    .expect("fixture schedule is valid")
}

/// Engine over [`scheduler`] with the default policy.
pub fn engine(start: Timestamp, window: ClaimWindow) -> EligibilityEngine {
    EligibilityEngine::new(scheduler(start), UtilizationPolicy::default(), window)
        .expect("default policy is valid")
}
