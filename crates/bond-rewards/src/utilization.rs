//! Utilization ratios and the in-memory utilization feed.
//!
//! A utilization ratio is a fixed-point value in `[0, RATIO_PRECISION]`
//! describing how close an epoch's net deposit activity came to its target.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bond_core::constants::{
    BPS_PRECISION, DEFAULT_PERSONAL_LOWER_BOUND_BPS, DEFAULT_SYSTEM_LOWER_BOUND_BPS,
    RATIO_PRECISION,
};
use bond_core::error::RewardError;
use bond_core::math::{bps_to_ratio, mul_div};
use bond_core::traits::UtilizationSource;
use bond_core::types::{AccountId, Epoch};

use crate::claims::ClaimBook;

/// Map a utilization delta onto `[0, RATIO_PRECISION]`.
///
/// - `delta >= target` → `RATIO_PRECISION`
/// - `delta <= lower` (including any net outflow) → 0
/// - otherwise linear between the two
pub fn normalize(delta: i128, target: u128, lower: u128) -> u128 {
    let Ok(delta) = u128::try_from(delta) else {
        return 0;
    };
    if delta >= target {
        return RATIO_PRECISION;
    }
    if delta <= lower {
        return 0;
    }
    // lower < delta < target
    let above = delta - lower;
    let span = target - lower;
    mul_div(above, RATIO_PRECISION, span)
        .unwrap_or_else(|| (above / (span / RATIO_PRECISION).max(1)).min(RATIO_PRECISION))
}

/// Where utilization targets come from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSource {
    /// Constant targets in base units.
    Fixed { personal: u64, system: u64 },
    /// The previous epoch's claimed rewards: the user's own claim for the
    /// personal target, the sum of all claims for the system target.
    PreviousEpochClaims,
}

/// Targets and lower bounds used to gate rewards.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct UtilizationPolicy {
    pub target: TargetSource,
    /// Personal lower bound as a fraction of the personal target.
    pub personal_lower_bound_bps: u64,
    /// System lower bound as a fraction of the system target.
    pub system_lower_bound_bps: u64,
}

impl Default for UtilizationPolicy {
    fn default() -> Self {
        Self {
            target: TargetSource::PreviousEpochClaims,
            personal_lower_bound_bps: DEFAULT_PERSONAL_LOWER_BOUND_BPS,
            system_lower_bound_bps: DEFAULT_SYSTEM_LOWER_BOUND_BPS,
        }
    }
}

impl UtilizationPolicy {
    pub fn validate(&self) -> Result<(), RewardError> {
        if self.personal_lower_bound_bps > BPS_PRECISION {
            return Err(RewardError::InvalidPolicy("personal lower bound above 100%"));
        }
        if self.system_lower_bound_bps > BPS_PRECISION {
            return Err(RewardError::InvalidPolicy("system lower bound above 100%"));
        }
        Ok(())
    }

    /// Personal utilization ratio of `account` for `epoch`.
    pub fn personal_ratio(
        &self,
        feed: &dyn UtilizationSource,
        claims: &ClaimBook,
        account: &AccountId,
        epoch: Epoch,
    ) -> u128 {
        let target = match self.target {
            TargetSource::Fixed { personal, .. } => Some(personal as u128),
            TargetSource::PreviousEpochClaims => epoch
                .checked_sub(1)
                .map(|prev| claims.claimed(account, prev) as u128),
        };
        Self::ratio(
            feed.personal_utilization_delta(account, epoch),
            target,
            self.personal_lower_bound_bps,
        )
    }

    /// System utilization ratio for `epoch`.
    pub fn system_ratio(
        &self,
        feed: &dyn UtilizationSource,
        claims: &ClaimBook,
        epoch: Epoch,
    ) -> u128 {
        let target = match self.target {
            TargetSource::Fixed { system, .. } => Some(system as u128),
            TargetSource::PreviousEpochClaims => {
                epoch.checked_sub(1).map(|prev| claims.total_claimed(prev))
            }
        };
        Self::ratio(
            feed.system_utilization_delta(epoch),
            target,
            self.system_lower_bound_bps,
        )
    }

    /// No target (epoch 0) or a zero target leaves rewards ungated.
    fn ratio(delta: i128, target: Option<u128>, lower_bps: u64) -> u128 {
        match target {
            None | Some(0) => RATIO_PRECISION,
            Some(target) => {
                let lower = mul_div(target, bps_to_ratio(lower_bps), RATIO_PRECISION)
                    .unwrap_or_else(|| target / BPS_PRECISION as u128 * lower_bps as u128);
                normalize(delta, target, lower)
            }
        }
    }
}

/// In-memory [`UtilizationSource`] accumulating reported deltas.
///
/// Every personal delta also counts towards the system delta of its epoch.
#[derive(Clone, Debug, Default)]
pub struct MemoryUtilizationFeed {
    personal: HashMap<(AccountId, Epoch), i128>,
    system: HashMap<Epoch, i128>,
}

impl MemoryUtilizationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted running totals.
    pub fn from_totals(
        personal: impl IntoIterator<Item = (AccountId, Epoch, i128)>,
        system: impl IntoIterator<Item = (Epoch, i128)>,
    ) -> Self {
        Self {
            personal: personal
                .into_iter()
                .map(|(account, epoch, delta)| ((account, epoch), delta))
                .collect(),
            system: system.into_iter().collect(),
        }
    }

    /// Compute the running totals after adding `delta` for `account` in
    /// `epoch`, without recording it. Returns `(personal, system)`.
    pub fn totals_after(&self, account: &AccountId, epoch: Epoch, delta: i128) -> (i128, i128) {
        (
            self.personal_utilization_delta(account, epoch)
                .saturating_add(delta),
            self.system_utilization_delta(epoch).saturating_add(delta),
        )
    }

    /// Add `delta` (deposits minus redemptions) for `account` in `epoch`.
    /// Returns the new `(personal, system)` totals.
    pub fn record(&mut self, account: AccountId, epoch: Epoch, delta: i128) -> (i128, i128) {
        let (personal, system) = self.totals_after(&account, epoch, delta);
        self.personal.insert((account, epoch), personal);
        self.system.insert(epoch, system);
        (personal, system)
    }
}

impl UtilizationSource for MemoryUtilizationFeed {
    fn personal_utilization_delta(&self, account: &AccountId, epoch: Epoch) -> i128 {
        self.personal.get(&(*account, epoch)).copied().unwrap_or(0)
    }

    fn system_utilization_delta(&self, epoch: Epoch) -> i128 {
        self.system.get(&epoch).copied().unwrap_or(0)
    }
}
