//! The decaying-balance ledger implementing [`VotingPower`].
//!
//! A lock of `amount` ending at `end` is written as the ray
//! `slope = ceil(amount * POWER_PRECISION / max_lock_duration)`,
//! `bias = slope * (end - now)`. Rounding the slope up makes `bias` an exact
//! multiple of `slope`, so every lock reaches exactly zero power at its end
//! and the global bias stays the exact sum of account biases.
//!
//! Mutations are two-phase. `prepare_*` validates against the current state
//! and returns a [`LedgerUpdate`] without touching anything; [`DecayLedger::apply`]
//! commits it. A rejected mutation therefore never leaves partial state, and a
//! storage layer can persist the update before it becomes visible.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use bond_core::constants::{
    DEFAULT_LOCK_TIME_UNIT, DEFAULT_MAX_LOCK_DURATION, DEFAULT_MIN_LOCK_DURATION, POWER_PRECISION,
};
use bond_core::error::LedgerError;
use bond_core::math::ceil_div;
use bond_core::traits::VotingPower;
use bond_core::types::{AccountId, LockedBalance, Point, Timestamp};

use crate::history::{Anchor, PointLog};
use crate::schedule::SlopeSchedule;

/// Lock duration rules.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Longest allowed lock, in seconds. Also the slope denominator: a lock
    /// of this length starts with power equal to its principal.
    pub max_lock_duration: u64,
    /// Shortest allowed lock, in seconds.
    pub min_lock_duration: u64,
    /// Unlock times are rounded down to a multiple of this.
    pub time_unit: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_lock_duration: DEFAULT_MAX_LOCK_DURATION,
            min_lock_duration: DEFAULT_MIN_LOCK_DURATION,
            time_unit: DEFAULT_LOCK_TIME_UNIT,
        }
    }
}

impl LedgerConfig {
    /// Check the duration bounds.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.time_unit == 0 {
            return Err(LedgerError::InvalidConfig("time unit must be non-zero"));
        }
        if self.max_lock_duration == 0 {
            return Err(LedgerError::InvalidConfig("max lock duration must be non-zero"));
        }
        if self.min_lock_duration > self.max_lock_duration {
            return Err(LedgerError::InvalidConfig("min lock duration exceeds max"));
        }
        Ok(())
    }

    /// Round `ts` down to the lock time unit.
    pub fn round_down(&self, ts: Timestamp) -> Timestamp {
        ts / self.time_unit * self.time_unit
    }
}

/// The full effect of one prepared mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerUpdate {
    /// Account being mutated.
    pub account: AccountId,
    /// Lock state after the mutation. Zeroed after a withdrawal.
    pub lock: LockedBalance,
    /// Checkpoint appended to the account's log.
    pub account_point: Point,
    /// Checkpoint appended to the global log (none for withdrawals).
    pub global_point: Option<Point>,
    /// New absolute values of every touched slope-change entry.
    pub slope_changes: Vec<(Timestamp, u128)>,
    /// Principal returned to the account (withdrawals only).
    pub released: u64,
}

/// Serializable copy of the ledger state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub global_points: Vec<Point>,
    pub account_points: Vec<(AccountId, Vec<Point>)>,
    pub locks: Vec<(AccountId, LockedBalance)>,
    pub slope_changes: Vec<(Timestamp, u128)>,
}

/// Checkpointed voting-escrow ledger.
///
/// Not thread-safe. Callers should wrap in a `RwLock` if concurrent access
/// is needed.
#[derive(Clone, Debug)]
pub struct DecayLedger {
    config: LedgerConfig,
    global: PointLog,
    accounts: HashMap<AccountId, PointLog>,
    locks: HashMap<AccountId, LockedBalance>,
    slope_changes: SlopeSchedule,
    /// Sequence number of the next mutation.
    next_seq: u64,
    /// Timestamp of the latest mutation.
    last_ts: Timestamp,
}

impl DecayLedger {
    /// Create an empty ledger.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            config,
            global: PointLog::new(),
            accounts: HashMap::new(),
            locks: HashMap::new(),
            slope_changes: SlopeSchedule::new(),
            next_seq: 1,
            last_ts: 0,
        })
    }

    /// Rebuild a ledger from persisted state.
    ///
    /// # Errors
    ///
    /// [`LedgerError::CorruptHistory`] if any log is out of order.
    pub fn restore(config: LedgerConfig, snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(config)?;
        let mut max_seq = 0;
        let mut max_ts = 0;
        let mut track = |points: &[Point]| {
            if let Some(last) = points.last() {
                max_seq = max_seq.max(last.seq);
                max_ts = max_ts.max(last.ts);
            }
        };

        track(&snapshot.global_points);
        for (_, points) in &snapshot.account_points {
            track(points);
        }

        ledger.global = PointLog::from_points(snapshot.global_points)?;
        for (account, points) in snapshot.account_points {
            ledger.accounts.insert(account, PointLog::from_points(points)?);
        }
        ledger.locks = snapshot
            .locks
            .into_iter()
            .filter(|(_, lock)| lock.amount > 0)
            .collect();
        ledger.slope_changes = snapshot.slope_changes.into_iter().collect();
        ledger.next_seq = max_seq + 1;
        ledger.last_ts = max_ts;
        Ok(ledger)
    }

    /// Copy of the full state, in the shape accepted by [`restore`](Self::restore).
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut account_points: Vec<_> = self
            .accounts
            .iter()
            .map(|(a, log)| (*a, log.points().to_vec()))
            .collect();
        account_points.sort_by_key(|(a, _)| *a);
        let mut locks: Vec<_> = self.locks.iter().map(|(a, l)| (*a, *l)).collect();
        locks.sort_by_key(|(a, _)| *a);

        LedgerSnapshot {
            global_points: self.global.points().to_vec(),
            account_points,
            locks,
            slope_changes: self.slope_changes.iter().collect(),
        }
    }

    /// Lock duration rules in force.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Validate a new lock of `amount` until `unlock_time` (rounded down to
    /// the time unit).
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] for a zero amount
    /// - [`LedgerError::LockExists`] if the account holds a lock, expired or not
    /// - [`LedgerError::InvalidDuration`] if the rounded end is not in the
    ///   future or outside the min/max duration
    /// - [`LedgerError::NonMonotonicTimestamp`] if `now` precedes the last mutation
    pub fn prepare_create_lock(
        &self,
        account: &AccountId,
        amount: u64,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        self.ensure_monotonic(now)?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if self.lock_of(account).is_some() {
            return Err(LedgerError::LockExists(account.to_string()));
        }
        let end = self.validated_end(unlock_time, now)?;
        self.checkpoint(
            account,
            LockedBalance::default(),
            LockedBalance { amount, end },
            now,
        )
    }

    /// Validate adding `extra` principal to an active lock, keeping its end.
    pub fn prepare_increase_amount(
        &self,
        account: &AccountId,
        extra: u64,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        self.ensure_monotonic(now)?;
        if extra == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let lock = self.active_lock(account, now)?;
        let amount = lock
            .amount
            .checked_add(extra)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.checkpoint(account, lock, LockedBalance { amount, ..lock }, now)
    }

    /// Validate moving an active lock's end to `unlock_time` (rounded down).
    ///
    /// The new end must be strictly later than the current one.
    pub fn prepare_extend_duration(
        &self,
        account: &AccountId,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        self.ensure_monotonic(now)?;
        let lock = self.active_lock(account, now)?;
        let end = self.validated_end(unlock_time, now)?;
        if end <= lock.end {
            return Err(LedgerError::InvalidDuration { end, now });
        }
        self.checkpoint(account, lock, LockedBalance { end, ..lock }, now)
    }

    /// Validate withdrawing an expired lock.
    ///
    /// Appends a zero checkpoint to the account only. The lock's slope has
    /// already left the global curve at its end through the slope-change
    /// schedule.
    pub fn prepare_withdraw(
        &self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        self.ensure_monotonic(now)?;
        let lock = self
            .lock_of(account)
            .ok_or_else(|| LedgerError::NoLock(account.to_string()))?;
        if !lock.is_expired(now) {
            return Err(LedgerError::LockNotExpired { end: lock.end, now });
        }
        Ok(LedgerUpdate {
            account: *account,
            lock: LockedBalance::default(),
            account_point: Point {
                bias: 0,
                slope: 0,
                ts: now,
                seq: self.next_seq,
            },
            global_point: None,
            slope_changes: Vec::new(),
            released: lock.amount,
        })
    }

    /// Commit a prepared update.
    ///
    /// # Errors
    ///
    /// [`LedgerError::CorruptHistory`] if the update was prepared against a
    /// different state (another mutation was applied in between).
    pub fn apply(&mut self, update: &LedgerUpdate) -> Result<(), LedgerError> {
        let seq = update.account_point.seq;
        if seq != self.next_seq {
            return Err(LedgerError::CorruptHistory(format!(
                "stale update: seq {seq}, expected {}",
                self.next_seq
            )));
        }
        let now = update.account_point.ts;
        self.ensure_monotonic(now)?;

        self.accounts
            .entry(update.account)
            .or_default()
            .push(update.account_point)?;
        if let Some(point) = update.global_point {
            self.global.push(point)?;
        }

        if update.lock.amount == 0 {
            self.locks.remove(&update.account);
        } else {
            self.locks.insert(update.account, update.lock);
        }
        for (ts, slope) in &update.slope_changes {
            self.slope_changes.set(*ts, *slope);
        }

        self.next_seq = seq + 1;
        self.last_ts = now;
        Ok(())
    }

    /// Create a lock and commit it. See [`prepare_create_lock`](Self::prepare_create_lock).
    pub fn create_lock(
        &mut self,
        account: &AccountId,
        amount: u64,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        let update = self.prepare_create_lock(account, amount, unlock_time, now)?;
        self.apply(&update)?;
        Ok(update)
    }

    /// Increase a lock and commit it.
    pub fn increase_amount(
        &mut self,
        account: &AccountId,
        extra: u64,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        let update = self.prepare_increase_amount(account, extra, now)?;
        self.apply(&update)?;
        Ok(update)
    }

    /// Extend a lock and commit it.
    pub fn extend_duration(
        &mut self,
        account: &AccountId,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        let update = self.prepare_extend_duration(account, unlock_time, now)?;
        self.apply(&update)?;
        Ok(update)
    }

    /// Withdraw an expired lock and commit it. Returns the released principal.
    pub fn withdraw(&mut self, account: &AccountId, now: Timestamp) -> Result<u64, LedgerError> {
        let update = self.prepare_withdraw(account, now)?;
        self.apply(&update)?;
        Ok(update.released)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current lock of `account`, if it holds principal.
    pub fn lock_of(&self, account: &AccountId) -> Option<LockedBalance> {
        self.locks.get(account).copied().filter(|l| l.amount > 0)
    }

    /// Total principal held by all locks, expired or not.
    pub fn total_locked(&self) -> u64 {
        self.locks
            .values()
            .fold(0u64, |acc, l| acc.saturating_add(l.amount))
    }

    /// Fixed-point voting power of `account` at `t`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::QueryBeforeGenesis`] if `t` precedes the account's
    /// first checkpoint. Accounts without history report 0.
    pub fn power_of(&self, account: &AccountId, t: Timestamp) -> Result<u128, LedgerError> {
        let Some(log) = self.accounts.get(account) else {
            return Ok(0);
        };
        Ok(Self::anchor_in(log, t)?.power())
    }

    /// Voting power of `account` at `t`, in base units (floored).
    pub fn balance_of(&self, account: &AccountId, t: Timestamp) -> Result<u64, LedgerError> {
        to_base_units(self.power_of(account, t)?)
    }

    /// The global curve projected to `t`: the latest global checkpoint at or
    /// before `t`, walked forward through every slope change up to `t`.
    ///
    /// The returned point has `ts == t` and the `seq` of the checkpoint it was
    /// projected from. An empty ledger yields a zero point.
    ///
    /// # Errors
    ///
    /// [`LedgerError::QueryBeforeGenesis`] if `t` precedes the first global
    /// checkpoint.
    pub fn supply_point_at(&self, t: Timestamp) -> Result<Point, LedgerError> {
        if self.global.is_empty() {
            return Ok(Point {
                ts: t,
                ..Point::default()
            });
        }
        let anchor = Self::anchor_in(&self.global, t)?;
        Ok(self.project(&anchor))
    }

    /// Fixed-point aggregate voting power at `t`.
    pub fn supply_power_at(&self, t: Timestamp) -> Result<u128, LedgerError> {
        Ok(self.supply_point_at(t)?.bias)
    }

    /// Aggregate voting power at `t`, in base units (floored).
    pub fn total_supply_at(&self, t: Timestamp) -> Result<u64, LedgerError> {
        to_base_units(self.supply_power_at(t)?)
    }

    /// Checkpoints written for `account`.
    pub fn account_points(&self, account: &AccountId) -> &[Point] {
        self.accounts.get(account).map_or(&[], |log| log.points())
    }

    /// Global checkpoints.
    pub fn global_points(&self) -> &[Point] {
        self.global.points()
    }

    /// Slope decrement scheduled at exactly `ts`.
    pub fn slope_change_at(&self, ts: Timestamp) -> u128 {
        self.slope_changes.get(ts)
    }

    /// Sum of slope decrements still scheduled after `now`.
    ///
    /// Equals the summed slope of every lock active at `now`.
    pub fn pending_slope(&self, now: Timestamp) -> u128 {
        self.slope_changes.pending_after(now)
    }

    /// Summed slope of every lock active at `now`, from the lock table.
    pub fn active_slope(&self, now: Timestamp) -> Result<u128, LedgerError> {
        self.locks
            .values()
            .filter(|l| l.is_active(now))
            .try_fold(0u128, |acc, l| {
                acc.checked_add(self.slope_for(l.amount)?)
                    .ok_or(LedgerError::ArithmeticOverflow)
            })
    }

    /// Accounts with checkpoint history.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> + '_ {
        self.accounts.keys()
    }

    /// Timestamp of the latest mutation (0 for an empty ledger).
    pub fn last_mutation(&self) -> Timestamp {
        self.last_ts
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_monotonic(&self, now: Timestamp) -> Result<(), LedgerError> {
        if now < self.last_ts {
            return Err(LedgerError::NonMonotonicTimestamp {
                now,
                last: self.last_ts,
            });
        }
        Ok(())
    }

    fn active_lock(&self, account: &AccountId, now: Timestamp) -> Result<LockedBalance, LedgerError> {
        let lock = self
            .lock_of(account)
            .ok_or_else(|| LedgerError::NoLock(account.to_string()))?;
        if lock.is_expired(now) {
            return Err(LedgerError::LockExpired { end: lock.end });
        }
        Ok(lock)
    }

    fn validated_end(&self, unlock_time: Timestamp, now: Timestamp) -> Result<Timestamp, LedgerError> {
        let end = self.config.round_down(unlock_time);
        let Some(duration) = end.checked_sub(now).filter(|d| *d > 0) else {
            return Err(LedgerError::InvalidDuration { end, now });
        };
        if duration < self.config.min_lock_duration || duration > self.config.max_lock_duration {
            return Err(LedgerError::InvalidDuration { end, now });
        }
        Ok(end)
    }

    fn slope_for(&self, amount: u64) -> Result<u128, LedgerError> {
        ceil_div(
            amount as u128 * POWER_PRECISION,
            self.config.max_lock_duration as u128,
        )
        .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// `(slope, bias)` of `lock` at `now`; zero once expired.
    fn ray(&self, lock: &LockedBalance, now: Timestamp) -> Result<(u128, u128), LedgerError> {
        if !lock.is_active(now) {
            return Ok((0, 0));
        }
        let slope = self.slope_for(lock.amount)?;
        let bias = slope
            .checked_mul(lock.remaining(now) as u128)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok((slope, bias))
    }

    /// Build the update replacing `old` with `new` for `account` at `now`.
    fn checkpoint(
        &self,
        account: &AccountId,
        old: LockedBalance,
        new: LockedBalance,
        now: Timestamp,
    ) -> Result<LedgerUpdate, LedgerError> {
        let (old_slope, old_bias) = self.ray(&old, now)?;
        let (new_slope, new_bias) = self.ray(&new, now)?;
        let seq = self.next_seq;

        // now >= last_ts >= every global ts, so this never hits the genesis error.
        let current = self.supply_point_at(now)?;
        let bias = current
            .bias
            .checked_sub(old_bias)
            .and_then(|b| b.checked_add(new_bias))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let slope = current
            .slope
            .checked_sub(old_slope)
            .and_then(|s| s.checked_add(new_slope))
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let mut touched: BTreeMap<Timestamp, u128> = BTreeMap::new();
        if old_slope > 0 {
            let scheduled = self
                .slope_changes
                .get(old.end)
                .checked_sub(old_slope)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            touched.insert(old.end, scheduled);
        }
        if new_slope > 0 {
            let base = touched
                .get(&new.end)
                .copied()
                .unwrap_or_else(|| self.slope_changes.get(new.end));
            let scheduled = base
                .checked_add(new_slope)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            touched.insert(new.end, scheduled);
        }

        Ok(LedgerUpdate {
            account: *account,
            lock: new,
            account_point: Point {
                bias: new_bias,
                slope: new_slope,
                ts: now,
                seq,
            },
            global_point: Some(Point {
                bias,
                slope,
                ts: now,
                seq,
            }),
            slope_changes: touched.into_iter().collect(),
            released: 0,
        })
    }

    fn anchor_in(log: &PointLog, t: Timestamp) -> Result<Anchor, LedgerError> {
        log.anchor(t).ok_or(LedgerError::QueryBeforeGenesis {
            t,
            genesis: log.genesis().unwrap_or_default(),
        })
    }

    /// Walk the global ray from the anchored checkpoint to the query time.
    ///
    /// Only moves forward: every step spans `cursor < at <= t`, starting from
    /// a checkpoint that the anchor guarantees is not after `t`.
    fn project(&self, anchor: &Anchor) -> Point {
        let start = anchor.point();
        let t = start.ts + anchor.elapsed();
        let mut bias = start.bias;
        let mut slope = start.slope;
        let mut cursor = start.ts;

        for (at, decrement) in self.slope_changes.between(cursor, t) {
            bias = bias.saturating_sub(slope.saturating_mul((at - cursor) as u128));
            slope = slope.saturating_sub(decrement);
            cursor = at;
        }
        bias = bias.saturating_sub(slope.saturating_mul((t - cursor) as u128));

        Point {
            bias,
            slope,
            ts: t,
            seq: start.seq,
        }
    }
}

fn to_base_units(power: u128) -> Result<u64, LedgerError> {
    u64::try_from(power / POWER_PRECISION).map_err(|_| LedgerError::ArithmeticOverflow)
}

impl VotingPower for DecayLedger {
    fn balance_of(&self, account: &AccountId, t: Timestamp) -> Result<u64, LedgerError> {
        DecayLedger::balance_of(self, account, t)
    }

    fn total_supply_at(&self, t: Timestamp) -> Result<u64, LedgerError> {
        DecayLedger::total_supply_at(self, t)
    }

    fn locked_balance(&self, account: &AccountId) -> Option<LockedBalance> {
        self.lock_of(account)
    }

    fn total_locked(&self) -> u64 {
        DecayLedger::total_locked(self)
    }
}
