//! Reward eligibility and claims.
//!
//! Each `(account, epoch)` pair moves `Unclaimed → Claimed` exactly once.
//! Rewards for an epoch only become computable after the epoch has ended,
//! because they are priced from voting power sampled at the epoch end.

use serde::{Deserialize, Serialize};

use bond_core::constants::{BPS_PRECISION, RATIO_PRECISION};
use bond_core::emission::EmissionScheduler;
use bond_core::error::RewardError;
use bond_core::math::mul_div;
use bond_core::traits::{UtilizationSource, VotingPower};
use bond_core::types::{AccountId, Epoch, Timestamp};

use crate::claims::ClaimBook;
use crate::utilization::UtilizationPolicy;

/// Which finished epochs may still be claimed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimWindow {
    /// Any finished epoch, at any later time.
    #[default]
    Unbounded,
    /// Only the epoch immediately before the current one.
    PreviousEpochOnly,
}

/// A validated claim, ready to be persisted and recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub account: AccountId,
    pub epoch: Epoch,
    pub amount: u64,
    pub claimed_at: Timestamp,
}

/// Reward summary for one account over the previous epoch.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Personal utilization ratio, scaled by `RATIO_PRECISION`.
    pub personal_utilization: u128,
    /// Utilization-gated reward, before subtracting any claim.
    pub eligible_rewards: u64,
    /// Reward at full utilization.
    pub max_rewards: u64,
    pub locked_amount: u64,
    pub lock_end: Timestamp,
    /// Voting power now.
    pub bonded_balance: u64,
}

/// Computes and records utilization-gated rewards.
///
/// Holds no ledger or feed state of its own: every query takes the voting
/// power view and utilization source it should read.
#[derive(Clone, Debug)]
pub struct EligibilityEngine {
    scheduler: EmissionScheduler,
    policy: UtilizationPolicy,
    window: ClaimWindow,
    claims: ClaimBook,
}

impl EligibilityEngine {
    /// Create an engine with an empty claim book.
    pub fn new(
        scheduler: EmissionScheduler,
        policy: UtilizationPolicy,
        window: ClaimWindow,
    ) -> Result<Self, RewardError> {
        policy.validate()?;
        Ok(Self {
            scheduler,
            policy,
            window,
            claims: ClaimBook::new(),
        })
    }

    /// Replace the claim book with persisted claims.
    pub fn with_claims(mut self, claims: ClaimBook) -> Self {
        self.claims = claims;
        self
    }

    pub fn scheduler(&self) -> &EmissionScheduler {
        &self.scheduler
    }

    pub fn policy(&self) -> &UtilizationPolicy {
        &self.policy
    }

    pub fn window(&self) -> ClaimWindow {
        self.window
    }

    pub fn claims(&self) -> &ClaimBook {
        &self.claims
    }

    /// Emissions for `epoch` weighted by the account's share of voting power
    /// at the epoch end, ignoring utilization.
    ///
    /// Before the ledger's first checkpoint every balance counts as 0, and an
    /// empty supply yields 0.
    pub fn max_rewards(
        &self,
        power: &dyn VotingPower,
        account: &AccountId,
        epoch: Epoch,
    ) -> Result<u64, RewardError> {
        let end = self.scheduler.epoch_end(epoch);
        let supply = power.total_supply_or_zero(end)?;
        if supply == 0 {
            return Ok(0);
        }
        let balance = power.balance_or_zero(account, end)?;
        let emissions = self.scheduler.emissions_for_epoch(epoch)?;
        let share = mul_div(emissions as u128, balance as u128, supply as u128)
            .ok_or(RewardError::ArithmeticOverflow)?;
        u64::try_from(share).map_err(|_| RewardError::ArithmeticOverflow)
    }

    /// Personal utilization ratio of `account` for `epoch`.
    pub fn personal_utilization_ratio(
        &self,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        epoch: Epoch,
    ) -> u128 {
        self.policy.personal_ratio(feed, &self.claims, account, epoch)
    }

    /// System utilization ratio for `epoch`.
    pub fn system_utilization_ratio(&self, feed: &dyn UtilizationSource, epoch: Epoch) -> u128 {
        self.policy.system_ratio(feed, &self.claims, epoch)
    }

    /// Reward still claimable by `account` for a finished `epoch`.
    ///
    /// Returns 0 once the epoch has been claimed: a claim always records the
    /// full remainder, so nothing is left over afterwards.
    ///
    /// # Errors
    ///
    /// [`RewardError::EpochNotFinalized`] if the epoch ends after `now`.
    pub fn eligible_rewards(
        &self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        epoch: Epoch,
        now: Timestamp,
    ) -> Result<u64, RewardError> {
        self.ensure_finalized(epoch, now)?;
        if self.claims.is_claimed(account, epoch) {
            return Ok(0);
        }
        self.gated_rewards(power, feed, account, epoch)
    }

    /// Claimable reward for the epoch before `now`'s epoch (0 during epoch 0).
    pub fn current_claimable(
        &self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<u64, RewardError> {
        match self.scheduler.previous_epoch(now) {
            Some(epoch) => self.eligible_rewards(power, feed, account, epoch, now),
            None => Ok(0),
        }
    }

    /// Validate a claim without recording it.
    ///
    /// Returns `None` when the epoch was already claimed.
    ///
    /// # Errors
    ///
    /// - [`RewardError::EpochNotFinalized`] if the epoch has not ended
    /// - [`RewardError::ClaimWindowClosed`] if the window policy excludes it
    /// - [`RewardError::NothingToClaim`] if the first claim would pay nothing
    pub fn prepare_claim(
        &self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        epoch: Epoch,
        now: Timestamp,
    ) -> Result<Option<ClaimReceipt>, RewardError> {
        self.ensure_finalized(epoch, now)?;
        self.ensure_in_window(epoch, now)?;
        if self.claims.is_claimed(account, epoch) {
            return Ok(None);
        }
        let amount = self.eligible_rewards(power, feed, account, epoch, now)?;
        if amount == 0 {
            return Err(RewardError::NothingToClaim {
                account: account.to_string(),
                epoch,
            });
        }
        Ok(Some(ClaimReceipt {
            account: *account,
            epoch,
            amount,
            claimed_at: now,
        }))
    }

    /// Record a prepared claim. Recording an already-claimed pair is a no-op.
    pub fn record_claim(&mut self, receipt: &ClaimReceipt) {
        self.claims
            .record(receipt.account, receipt.epoch, receipt.amount);
    }

    /// Claim the reward for `epoch`. Returns the amount recorded, or 0 if the
    /// epoch was already claimed.
    pub fn claim(
        &mut self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        epoch: Epoch,
        now: Timestamp,
    ) -> Result<u64, RewardError> {
        match self.prepare_claim(power, feed, account, epoch, now)? {
            Some(receipt) => {
                self.record_claim(&receipt);
                Ok(receipt.amount)
            }
            None => Ok(0),
        }
    }

    /// Reward summary over the previous epoch.
    pub fn user_info(
        &self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<UserInfo, RewardError> {
        let lock = power.locked_balance(account).unwrap_or_default();
        let mut info = UserInfo {
            locked_amount: lock.amount,
            lock_end: lock.end,
            bonded_balance: power.balance_or_zero(account, now)?,
            ..UserInfo::default()
        };
        if let Some(epoch) = self.scheduler.previous_epoch(now) {
            info.personal_utilization = self.personal_utilization_ratio(feed, account, epoch);
            info.max_rewards = self.max_rewards(power, account, epoch)?;
            info.eligible_rewards = self.gated_rewards(power, feed, account, epoch)?;
        }
        Ok(info)
    }

    /// Annualized `(current, max)` reward rate on the account's locked
    /// principal, in basis points, extrapolated from the previous epoch.
    pub fn user_apy(
        &self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<(u64, u64), RewardError> {
        let info = self.user_info(power, feed, account, now)?;
        Ok((
            self.annualize(info.eligible_rewards, info.locked_amount),
            self.annualize(info.max_rewards, info.locked_amount),
        ))
    }

    /// Annualized emission rate of the current epoch over all locked
    /// principal, in basis points.
    pub fn system_apy(&self, power: &dyn VotingPower, now: Timestamp) -> Result<u64, RewardError> {
        let emissions = self
            .scheduler
            .emissions_for_epoch(self.scheduler.current_epoch(now))?;
        Ok(self.annualize(emissions, power.total_locked()))
    }

    fn gated_rewards(
        &self,
        power: &dyn VotingPower,
        feed: &dyn UtilizationSource,
        account: &AccountId,
        epoch: Epoch,
    ) -> Result<u64, RewardError> {
        let max = self.max_rewards(power, account, epoch)?;
        if max == 0 {
            return Ok(0);
        }
        let ratio = self
            .personal_utilization_ratio(feed, account, epoch)
            .min(self.system_utilization_ratio(feed, epoch));
        let gated =
            mul_div(max as u128, ratio, RATIO_PRECISION).ok_or(RewardError::ArithmeticOverflow)?;
        // ratio <= 1, so gated <= max
        Ok(gated as u64)
    }

    fn annualize(&self, per_epoch: u64, principal: u64) -> u64 {
        if principal == 0 {
            return 0;
        }
        let yearly = per_epoch as u128 * self.scheduler.epochs_per_year() as u128;
        let bps = yearly * BPS_PRECISION as u128 / principal as u128;
        u64::try_from(bps).unwrap_or(u64::MAX)
    }

    fn ensure_finalized(&self, epoch: Epoch, now: Timestamp) -> Result<(), RewardError> {
        let end = self.scheduler.epoch_end(epoch);
        if end > now {
            return Err(RewardError::EpochNotFinalized { epoch, end, now });
        }
        Ok(())
    }

    fn ensure_in_window(&self, epoch: Epoch, now: Timestamp) -> Result<(), RewardError> {
        match self.window {
            ClaimWindow::Unbounded => Ok(()),
            ClaimWindow::PreviousEpochOnly => {
                if self.scheduler.previous_epoch(now) == Some(epoch) {
                    Ok(())
                } else {
                    Err(RewardError::ClaimWindowClosed {
                        epoch,
                        current: self.scheduler.current_epoch(now),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use bond_core::constants::{COIN, WEEK};
    use bond_core::emission::EmissionParams;
    use bond_core::error::LedgerError;
    use bond_core::types::LockedBalance;

    use crate::utilization::{MemoryUtilizationFeed, TargetSource};

    const START: u64 = 2_800 * WEEK;
    const EPOCH: u64 = 2 * WEEK;
    const A: AccountId = AccountId([1; 20]);
    const B: AccountId = AccountId([2; 20]);

    // ------------------------------------------------------------------
    // Mock: VotingPower with constant balances after genesis
    // ------------------------------------------------------------------

    struct FixedPower {
        genesis: Timestamp,
        balances: HashMap<AccountId, u64>,
        locks: HashMap<AccountId, LockedBalance>,
    }

    impl VotingPower for FixedPower {
        fn balance_of(&self, account: &AccountId, t: Timestamp) -> Result<u64, LedgerError> {
            if t < self.genesis {
                return Err(LedgerError::QueryBeforeGenesis { t, genesis: self.genesis });
            }
            Ok(self.balances.get(account).copied().unwrap_or(0))
        }

        fn total_supply_at(&self, t: Timestamp) -> Result<u64, LedgerError> {
            if t < self.genesis {
                return Err(LedgerError::QueryBeforeGenesis { t, genesis: self.genesis });
            }
            Ok(self.balances.values().sum())
        }

        fn locked_balance(&self, account: &AccountId) -> Option<LockedBalance> {
            self.locks.get(account).copied()
        }

        fn total_locked(&self) -> u64 {
            self.locks.values().map(|l| l.amount).sum()
        }
    }

    /// A and B hold equal power from `START`.
    fn power() -> FixedPower {
        let lock = LockedBalance { amount: 100 * COIN, end: START + 52 * WEEK };
        FixedPower {
            genesis: START,
            balances: HashMap::from([(A, 50 * COIN), (B, 50 * COIN)]),
            locks: HashMap::from([(A, lock), (B, lock)]),
        }
    }

    fn scheduler() -> EmissionScheduler {
        EmissionScheduler::from_params(EmissionParams {
            start: START,
            epoch_length: EPOCH,
            emissions_per_epoch: 1_000 * COIN,
            reduction_cliff: 26,
            reduction_bps: 500,
        })
        .unwrap()
    }

    fn ungated() -> UtilizationPolicy {
        UtilizationPolicy {
            target: TargetSource::Fixed { personal: 0, system: 0 },
            ..UtilizationPolicy::default()
        }
    }

    fn engine(policy: UtilizationPolicy, window: ClaimWindow) -> EligibilityEngine {
        EligibilityEngine::new(scheduler(), policy, window).unwrap()
    }

    // --- eligible_rewards ---

    #[test]
    fn equal_power_splits_emissions() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let p = power();
        let feed = MemoryUtilizationFeed::new();
        let now = START + EPOCH;
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 0, now).unwrap(), 500 * COIN);
        assert_eq!(e.eligible_rewards(&p, &feed, &B, 0, now).unwrap(), 500 * COIN);
    }

    #[test]
    fn unfinished_epoch_rejected() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let feed = MemoryUtilizationFeed::new();
        let err = e
            .eligible_rewards(&power(), &feed, &A, 0, START + EPOCH - 1)
            .unwrap_err();
        assert_eq!(
            err,
            RewardError::EpochNotFinalized { epoch: 0, end: START + EPOCH, now: START + EPOCH - 1 }
        );
    }

    #[test]
    fn no_supply_means_nothing_to_claim() {
        let mut e = engine(ungated(), ClaimWindow::Unbounded);
        let p = FixedPower { genesis: 0, balances: HashMap::new(), locks: HashMap::new() };
        let feed = MemoryUtilizationFeed::new();
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 0, START + EPOCH).unwrap(), 0);
        assert!(matches!(
            e.claim(&p, &feed, &A, 0, START + EPOCH),
            Err(RewardError::NothingToClaim { epoch: 0, .. })
        ));
        assert!(e.claims().is_empty());
    }

    #[test]
    fn epoch_before_ledger_genesis_pays_nothing() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let p = FixedPower { genesis: START + 5 * EPOCH, ..power() };
        let feed = MemoryUtilizationFeed::new();
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 0, START + 6 * EPOCH).unwrap(), 0);
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 5, START + 6 * EPOCH).unwrap(), 500 * COIN);
    }

    #[test]
    fn utilization_gates_rewards() {
        let policy = UtilizationPolicy {
            target: TargetSource::Fixed { personal: 1_000, system: 1_000 },
            personal_lower_bound_bps: 0,
            system_lower_bound_bps: 0,
        };
        let e = engine(policy, ClaimWindow::Unbounded);
        let p = power();
        let mut feed = MemoryUtilizationFeed::new();
        feed.record(A, 0, 250);
        feed.record(B, 0, 750);

        let now = START + EPOCH;
        // A: min(0.25, 1.0) of 500
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 0, now).unwrap(), 125 * COIN);
        // B: min(0.75, 1.0) of 500
        assert_eq!(e.eligible_rewards(&p, &feed, &B, 0, now).unwrap(), 375 * COIN);
    }

    #[test]
    fn system_ratio_caps_personal() {
        let policy = UtilizationPolicy {
            target: TargetSource::Fixed { personal: 100, system: 10_000 },
            personal_lower_bound_bps: 0,
            system_lower_bound_bps: 0,
        };
        let e = engine(policy, ClaimWindow::Unbounded);
        let mut feed = MemoryUtilizationFeed::new();
        feed.record(A, 0, 1_000);
        // personal 1.0, system 0.1
        assert_eq!(
            e.eligible_rewards(&power(), &feed, &A, 0, START + EPOCH).unwrap(),
            50 * COIN
        );
    }

    #[test]
    fn emissions_follow_cliffs() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let feed = MemoryUtilizationFeed::new();
        let now = START + 30 * EPOCH;
        // Epoch 26 is past the first cliff: 950 split in two.
        assert_eq!(e.eligible_rewards(&power(), &feed, &A, 26, now).unwrap(), 475 * COIN);
    }

    // --- claim ---

    #[test]
    fn claim_is_idempotent() {
        let mut e = engine(ungated(), ClaimWindow::Unbounded);
        let p = power();
        let feed = MemoryUtilizationFeed::new();
        let now = START + EPOCH;

        assert_eq!(e.claim(&p, &feed, &A, 0, now).unwrap(), 500 * COIN);
        assert_eq!(e.claim(&p, &feed, &A, 0, now).unwrap(), 0);
        assert_eq!(e.claim(&p, &feed, &A, 0, now + 10 * EPOCH).unwrap(), 0);
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 0, now).unwrap(), 0);
        assert_eq!(e.claims().claimed(&A, 0), 500 * COIN);
        assert_eq!(e.claims().len(), 1);
    }

    #[test]
    fn prepare_claim_does_not_record() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let feed = MemoryUtilizationFeed::new();
        let receipt = e
            .prepare_claim(&power(), &feed, &A, 0, START + EPOCH)
            .unwrap()
            .unwrap();
        assert_eq!(receipt.amount, 500 * COIN);
        assert_eq!(receipt.claimed_at, START + EPOCH);
        assert!(e.claims().is_empty());
    }

    #[test]
    fn window_restricts_to_previous_epoch() {
        let mut e = engine(ungated(), ClaimWindow::PreviousEpochOnly);
        let p = power();
        let feed = MemoryUtilizationFeed::new();
        let now = START + 2 * EPOCH;

        assert_eq!(
            e.claim(&p, &feed, &A, 0, now),
            Err(RewardError::ClaimWindowClosed { epoch: 0, current: 2 })
        );
        assert_eq!(e.claim(&p, &feed, &A, 1, now).unwrap(), 500 * COIN);
    }

    #[test]
    fn unbounded_window_allows_old_epochs() {
        let mut e = engine(ungated(), ClaimWindow::Unbounded);
        let feed = MemoryUtilizationFeed::new();
        assert_eq!(
            e.claim(&power(), &feed, &A, 0, START + 20 * EPOCH).unwrap(),
            500 * COIN
        );
    }

    #[test]
    fn previous_claims_target_gates_next_epoch() {
        let mut e = engine(UtilizationPolicy::default(), ClaimWindow::Unbounded);
        let p = power();
        let mut feed = MemoryUtilizationFeed::new();

        // Epoch 0 has no previous epoch and is ungated.
        let first = e.claim(&p, &feed, &A, 0, START + EPOCH).unwrap();
        assert_eq!(first, 500 * COIN);

        // Epoch 1 without activity sits below the personal lower bound.
        let now = START + 2 * EPOCH;
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 1, now).unwrap(), 0);

        // Matching last epoch's claim restores the full share.
        feed.record(A, 1, first as i128);
        assert_eq!(e.personal_utilization_ratio(&feed, &A, 1), RATIO_PRECISION);
        assert_eq!(e.system_utilization_ratio(&feed, 1), RATIO_PRECISION);
        assert_eq!(e.eligible_rewards(&p, &feed, &A, 1, now).unwrap(), 500 * COIN);

        // B claimed nothing in epoch 0, so B's personal target is zero.
        assert_eq!(e.personal_utilization_ratio(&feed, &B, 1), RATIO_PRECISION);
    }

    #[test]
    fn current_claimable_during_first_epoch_is_zero() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let p = power();
        let feed = MemoryUtilizationFeed::new();
        assert_eq!(e.current_claimable(&p, &feed, &A, START + 1).unwrap(), 0);
        assert_eq!(e.current_claimable(&p, &feed, &A, START + EPOCH).unwrap(), 500 * COIN);
    }

    // --- read models ---

    #[test]
    fn user_info_reports_previous_epoch() {
        let mut e = engine(ungated(), ClaimWindow::Unbounded);
        let p = power();
        let feed = MemoryUtilizationFeed::new();
        let now = START + EPOCH + 3_600;
        e.claim(&p, &feed, &A, 0, now).unwrap();

        let info = e.user_info(&p, &feed, &A, now).unwrap();
        assert_eq!(info.max_rewards, 500 * COIN);
        // The gross figure survives the claim.
        assert_eq!(info.eligible_rewards, 500 * COIN);
        assert_eq!(info.locked_amount, 100 * COIN);
        assert_eq!(info.lock_end, START + 52 * WEEK);
        assert_eq!(info.bonded_balance, 50 * COIN);
        assert_eq!(info.personal_utilization, RATIO_PRECISION);
    }

    #[test]
    fn user_info_in_first_epoch_has_no_rewards() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let feed = MemoryUtilizationFeed::new();
        let info = e.user_info(&power(), &feed, &A, START + 10).unwrap();
        assert_eq!(info.max_rewards, 0);
        assert_eq!(info.eligible_rewards, 0);
        assert_eq!(info.locked_amount, 100 * COIN);
    }

    #[test]
    fn apy_from_previous_epoch() {
        let e = engine(ungated(), ClaimWindow::Unbounded);
        let p = power();
        let feed = MemoryUtilizationFeed::new();
        // 500 per epoch * 26 epochs / 100 locked = 130x
        let (current, max) = e.user_apy(&p, &feed, &A, START + EPOCH).unwrap();
        assert_eq!(current, 1_300_000);
        assert_eq!(max, 1_300_000);
        // 1000 * 26 / 200
        assert_eq!(e.system_apy(&p, START + EPOCH).unwrap(), 1_300_000);
        assert_eq!(e.user_apy(&p, &feed, &AccountId([9; 20]), START + EPOCH).unwrap(), (0, 0));
    }

    #[test]
    fn rejects_invalid_policy() {
        let policy = UtilizationPolicy {
            system_lower_bound_bps: 20_000,
            ..UtilizationPolicy::default()
        };
        assert!(EligibilityEngine::new(scheduler(), policy, ClaimWindow::Unbounded).is_err());
    }

    #[test]
    fn claim_window_json_shape() {
        assert_eq!(
            serde_json::to_string(&ClaimWindow::PreviousEpochOnly).unwrap(),
            r#""previous_epoch_only""#
        );
        assert_eq!(ClaimWindow::default(), ClaimWindow::Unbounded);
    }
}
