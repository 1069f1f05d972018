//! The bonding service: ledger, emission schedule and eligibility engine
//! behind one lock, backed by [`RocksStore`].
//!
//! Every mutation takes the write lock, validates against in-memory state,
//! persists the resulting batch and only then applies it in memory. A failed
//! validation or write leaves both the store and the in-memory state as they
//! were. Queries take the read lock and may run concurrently.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use bond_core::emission::EmissionScheduler;
use bond_core::error::BondError;
use bond_core::types::{AccountId, Epoch, LockedBalance, Timestamp};
use bond_ledger::DecayLedger;
use bond_rewards::{EligibilityEngine, MemoryUtilizationFeed, UserInfo};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

/// State guarded by the service lock.
struct ServiceState {
    ledger: DecayLedger,
    engine: EligibilityEngine,
    feed: MemoryUtilizationFeed,
}

/// Thread-safe facade over the persistent bonding state.
pub struct BondingService {
    store: RocksStore,
    state: RwLock<ServiceState>,
}

impl BondingService {
    /// Open the store under `config.db_path()` and rebuild in-memory state.
    ///
    /// On first open the configured emission schedule is validated against
    /// `now` and recorded. Later opens reuse the recorded schedule; a
    /// differing configuration is ignored with a warning.
    pub fn open(config: &NodeConfig, now: Timestamp) -> Result<Self, BondError> {
        let store = RocksStore::open(config.db_path())?;

        let scheduler = match store.emission_params()? {
            Some(stored) => {
                if !config.emission.matches(&stored) {
                    warn!(
                        start = stored.start,
                        epoch_length = stored.epoch_length,
                        "emission config differs from recorded schedule; keeping recorded"
                    );
                }
                EmissionScheduler::from_params(stored)?
            }
            None => {
                let params = config.emission.params(now);
                let scheduler = EmissionScheduler::new(params, now)?;
                store.put_emission_params(&params)?;
                info!(
                    start = params.start,
                    epoch_length = params.epoch_length,
                    "initialized emission schedule"
                );
                scheduler
            }
        };

        let ledger = store.load_ledger(config.ledger)?;
        let claims = store.load_claims()?;
        let feed = store.load_utilization()?;
        let engine = EligibilityEngine::new(
            scheduler,
            config.rewards.policy(),
            config.rewards.claim_window,
        )?
        .with_claims(claims);

        info!(
            path = %config.db_path().display(),
            checkpoints = ledger.global_points().len(),
            claims = engine.claims().len(),
            "opened bonding store"
        );

        Ok(Self {
            store,
            state: RwLock::new(ServiceState {
                ledger,
                engine,
                feed,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Lock lifecycle
    // ------------------------------------------------------------------

    /// Lock `amount` until `unlock_time` (rounded down to the lock time unit).
    pub fn create_lock(
        &self,
        account: &AccountId,
        amount: u64,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LockedBalance, BondError> {
        let mut state = self.state.write();
        let update = state
            .ledger
            .prepare_create_lock(account, amount, unlock_time, now)?;
        self.store.write_ledger_update(&update)?;
        state.ledger.apply(&update)?;
        info!(%account, amount, end = update.lock.end, "lock created");
        Ok(update.lock)
    }

    /// Add `extra` to an active lock.
    pub fn increase_amount(
        &self,
        account: &AccountId,
        extra: u64,
        now: Timestamp,
    ) -> Result<LockedBalance, BondError> {
        let mut state = self.state.write();
        let update = state.ledger.prepare_increase_amount(account, extra, now)?;
        self.store.write_ledger_update(&update)?;
        state.ledger.apply(&update)?;
        info!(%account, extra, amount = update.lock.amount, "lock increased");
        Ok(update.lock)
    }

    /// Move an active lock's end to `unlock_time`.
    pub fn extend_duration(
        &self,
        account: &AccountId,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LockedBalance, BondError> {
        let mut state = self.state.write();
        let update = state
            .ledger
            .prepare_extend_duration(account, unlock_time, now)?;
        self.store.write_ledger_update(&update)?;
        state.ledger.apply(&update)?;
        info!(%account, end = update.lock.end, "lock extended");
        Ok(update.lock)
    }

    /// Withdraw an expired lock. Returns the released principal.
    pub fn withdraw(&self, account: &AccountId, now: Timestamp) -> Result<u64, BondError> {
        let mut state = self.state.write();
        let update = state.ledger.prepare_withdraw(account, now)?;
        self.store.write_ledger_update(&update)?;
        state.ledger.apply(&update)?;
        info!(%account, released = update.released, "lock withdrawn");
        Ok(update.released)
    }

    // ------------------------------------------------------------------
    // Ledger queries
    // ------------------------------------------------------------------

    pub fn balance_of(&self, account: &AccountId, t: Timestamp) -> Result<u64, BondError> {
        let balance = self.state.read().ledger.balance_of(account, t)?;
        debug!(%account, t, balance, "balance query");
        Ok(balance)
    }

    pub fn total_supply_at(&self, t: Timestamp) -> Result<u64, BondError> {
        let supply = self.state.read().ledger.total_supply_at(t)?;
        debug!(t, supply, "supply query");
        Ok(supply)
    }

    pub fn lock_of(&self, account: &AccountId) -> Option<LockedBalance> {
        self.state.read().ledger.lock_of(account)
    }

    pub fn total_locked(&self) -> u64 {
        self.state.read().ledger.total_locked()
    }

    // ------------------------------------------------------------------
    // Emission schedule
    // ------------------------------------------------------------------

    /// The emission schedule in force.
    pub fn scheduler(&self) -> EmissionScheduler {
        *self.state.read().engine.scheduler()
    }

    pub fn emissions_for_epoch(&self, epoch: Epoch) -> Result<u64, BondError> {
        Ok(self.scheduler().emissions_for_epoch(epoch)?)
    }

    // ------------------------------------------------------------------
    // Utilization and rewards
    // ------------------------------------------------------------------

    /// Report a utilization delta for `account` in `epoch`. Returns the new
    /// `(personal, system)` running totals.
    pub fn record_utilization(
        &self,
        account: &AccountId,
        epoch: Epoch,
        delta: i128,
    ) -> Result<(i128, i128), BondError> {
        let mut state = self.state.write();
        let (personal, system) = state.feed.totals_after(account, epoch, delta);
        self.store
            .write_utilization(account, epoch, personal, system)?;
        state.feed.record(*account, epoch, delta);
        debug!(%account, epoch, delta, personal, system, "utilization recorded");
        Ok((personal, system))
    }

    pub fn eligible_rewards(
        &self,
        account: &AccountId,
        epoch: Epoch,
        now: Timestamp,
    ) -> Result<u64, BondError> {
        let state = self.state.read();
        Ok(state
            .engine
            .eligible_rewards(&state.ledger, &state.feed, account, epoch, now)?)
    }

    /// Claim the reward for `epoch`. Returns 0 if it was already claimed.
    pub fn claim(&self, account: &AccountId, epoch: Epoch, now: Timestamp) -> Result<u64, BondError> {
        let mut guard = self.state.write();
        let ServiceState {
            ledger,
            engine,
            feed,
        } = &mut *guard;

        let Some(receipt) = engine.prepare_claim(&*ledger, &*feed, account, epoch, now)? else {
            debug!(%account, epoch, "epoch already claimed");
            return Ok(0);
        };
        self.store.write_claim(&receipt)?;
        engine.record_claim(&receipt);
        info!(%account, epoch, amount = receipt.amount, "rewards claimed");
        Ok(receipt.amount)
    }

    pub fn user_info(&self, account: &AccountId, now: Timestamp) -> Result<UserInfo, BondError> {
        let state = self.state.read();
        Ok(state
            .engine
            .user_info(&state.ledger, &state.feed, account, now)?)
    }

    /// `(current, max)` annualized reward rate in basis points.
    pub fn user_apy(&self, account: &AccountId, now: Timestamp) -> Result<(u64, u64), BondError> {
        let state = self.state.read();
        Ok(state
            .engine
            .user_apy(&state.ledger, &state.feed, account, now)?)
    }

    pub fn system_apy(&self, now: Timestamp) -> Result<u64, BondError> {
        let state = self.state.read();
        Ok(state.engine.system_apy(&state.ledger, now)?)
    }

    /// Flush the store to disk.
    pub fn flush(&self) -> Result<(), BondError> {
        self.store.flush()
    }
}
