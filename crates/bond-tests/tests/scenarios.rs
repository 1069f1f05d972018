//! End-to-end scenarios across the ledger, emission schedule and
//! eligibility engine.
//!
//! Covers:
//! - Lock decay of a one-year lock under a two-year maximum
//! - Emission cliffs
//! - Supply lookups at an epoch boundary with a later checkpoint present
//! - Claim idempotence and utilization gating across epochs
//! - Claim windows and lock lifecycle errors

use bond_core::constants::{COIN, POWER_PRECISION, RATIO_PRECISION, WEEK, YEAR};
use bond_core::emission::{EmissionParams, EmissionScheduler};
use bond_core::error::{LedgerError, RewardError};
use bond_rewards::{ClaimWindow, MemoryUtilizationFeed};
use bond_tests::helpers::{acct, engine, ledger, EMISSIONS, EPOCH, T0};

// ---------------------------------------------------------------------------
// Lock decay
// ---------------------------------------------------------------------------

/// Start such that a one-year lock ends on a week boundary.
const DECAY_START: u64 = T0 - YEAR;

#[test]
fn one_year_lock_decays_linearly() {
    let mut l = ledger();
    let a = acct(1);
    let update = l
        .create_lock(&a, 100 * COIN, DECAY_START + YEAR, DECAY_START)
        .unwrap();
    assert_eq!(update.lock.end, DECAY_START + YEAR);

    // slope = 100 / 63,072,000 per second, rounded up in fixed point.
    let point = update.account_point;
    let exact = 100 * COIN as u128 * POWER_PRECISION;
    assert!(point.slope * (2 * YEAR) as u128 >= exact);
    assert!((point.slope - 1) * ((2 * YEAR) as u128) < exact);
    assert_eq!(point.bias / POWER_PRECISION, 50 * COIN as u128);

    assert_eq!(l.balance_of(&a, DECAY_START).unwrap(), 50 * COIN);
    assert_eq!(l.balance_of(&a, DECAY_START + 15_768_000).unwrap(), 25 * COIN);
    assert_eq!(l.balance_of(&a, DECAY_START + YEAR).unwrap(), 0);
    assert_eq!(l.total_supply_at(DECAY_START + 15_768_000).unwrap(), 25 * COIN);
}

#[test]
fn one_year_lock_in_base_units() {
    let mut l = ledger();
    let a = acct(1);
    l.create_lock(&a, 100, DECAY_START + YEAR, DECAY_START).unwrap();

    assert_eq!(l.balance_of(&a, DECAY_START).unwrap(), 50);
    assert_eq!(l.balance_of(&a, DECAY_START + 15_768_000).unwrap(), 25);
    assert_eq!(l.balance_of(&a, DECAY_START + YEAR).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Emission cliffs
// ---------------------------------------------------------------------------

#[test]
fn emission_cliff_reduces_by_five_percent() {
    let s = EmissionScheduler::from_params(EmissionParams {
        start: T0,
        epoch_length: EPOCH,
        emissions_per_epoch: 1_000_000,
        reduction_cliff: 52,
        reduction_bps: 500,
    })
    .unwrap();

    assert_eq!(s.emissions_for_epoch(25).unwrap(), 1_000_000);
    assert_eq!(s.emissions_for_epoch(51).unwrap(), 1_000_000);
    assert_eq!(s.emissions_for_epoch(52).unwrap(), 950_000);
    assert_eq!(s.emissions_for_epoch(60).unwrap(), 950_000);
    assert_eq!(s.emissions_for_epoch(104).unwrap(), 902_500);

    assert_eq!(s.epoch_at(T0 + 60 * EPOCH), 60);
    assert_eq!(s.epoch_start(60), T0 + 60 * EPOCH);
    assert_eq!(s.epoch_end(60), T0 + 61 * EPOCH);
}

// ---------------------------------------------------------------------------
// Epoch boundary lookups
// ---------------------------------------------------------------------------

#[test]
fn supply_at_boundary_ignores_later_checkpoint() {
    let boundary = T0;
    let (a, b) = (acct(1), acct(2));
    let mut l = ledger();

    l.create_lock(&a, 100 * COIN, boundary + 10 * WEEK, boundary - 26)
        .unwrap();
    l.create_lock(&b, 300 * COIN, boundary + 20 * WEEK, boundary + 91)
        .unwrap();
    let stamps: Vec<u64> = l.global_points().iter().map(|p| p.ts).collect();
    assert_eq!(stamps, vec![boundary - 26, boundary + 91]);

    // Only A exists at the boundary; its point is decayed forward 26 seconds.
    let a_point = l.account_points(&a)[0];
    let expected = a_point.power_after(26);
    assert_eq!(l.supply_power_at(boundary).unwrap(), expected);
    assert_eq!(
        l.total_supply_at(boundary).unwrap(),
        (expected / POWER_PRECISION) as u64
    );
    assert_eq!(l.total_supply_at(boundary).unwrap(), l.balance_of(&a, boundary).unwrap());
    assert!(l.balance_of(&b, boundary + 91).unwrap() > 0);
    assert!(matches!(
        l.balance_of(&b, boundary),
        Err(LedgerError::QueryBeforeGenesis { .. })
    ));
}

#[test]
fn rewards_use_supply_at_epoch_end() {
    let boundary = T0;
    let (a, b) = (acct(1), acct(2));
    let mut l = ledger();
    let feed = MemoryUtilizationFeed::new();
    // Epoch 0 ends exactly at the boundary.
    let mut e = engine(boundary - EPOCH, ClaimWindow::Unbounded);

    l.create_lock(&a, 100 * COIN, boundary + 10 * WEEK, boundary - 26)
        .unwrap();
    l.create_lock(&b, 300 * COIN, boundary + 20 * WEEK, boundary + 91)
        .unwrap();

    let now = boundary + 92;
    assert_eq!(e.max_rewards(&l, &a, 0).unwrap(), EMISSIONS);
    assert_eq!(e.max_rewards(&l, &b, 0).unwrap(), 0);

    assert_eq!(e.claim(&l, &feed, &a, 0, now).unwrap(), EMISSIONS);
    assert!(matches!(
        e.claim(&l, &feed, &b, 0, now),
        Err(RewardError::NothingToClaim { epoch: 0, .. })
    ));
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[test]
fn claim_twice_pays_once() {
    let (a, b) = (acct(1), acct(2));
    let mut l = ledger();
    let feed = MemoryUtilizationFeed::new();
    let mut e = engine(T0, ClaimWindow::Unbounded);

    l.create_lock(&a, 100 * COIN, T0 + 20 * WEEK, T0).unwrap();
    l.create_lock(&b, 100 * COIN, T0 + 20 * WEEK, T0).unwrap();

    let now = T0 + EPOCH;
    let eligible = e.eligible_rewards(&l, &feed, &a, 0, now).unwrap();
    assert!(eligible > 0);
    assert_eq!(e.claim(&l, &feed, &a, 0, now).unwrap(), eligible);
    assert_eq!(e.claim(&l, &feed, &a, 0, now).unwrap(), 0);
    assert_eq!(e.eligible_rewards(&l, &feed, &a, 0, now).unwrap(), 0);

    let b_amount = e.claim(&l, &feed, &b, 0, now).unwrap();
    assert!(eligible + b_amount <= EMISSIONS);
    assert_eq!(e.claims().total_claimed(0), (eligible + b_amount) as u128);
}

#[test]
fn claim_before_epoch_end_is_rejected() {
    let a = acct(1);
    let mut l = ledger();
    let feed = MemoryUtilizationFeed::new();
    let mut e = engine(T0, ClaimWindow::Unbounded);
    l.create_lock(&a, 100 * COIN, T0 + 20 * WEEK, T0).unwrap();

    assert!(matches!(
        e.claim(&l, &feed, &a, 0, T0 + EPOCH - 1),
        Err(RewardError::EpochNotFinalized { epoch: 0, .. })
    ));
    assert!(!e.claims().is_claimed(&a, 0));
}

#[test]
fn previous_claims_set_next_epoch_target() {
    let a = acct(1);
    let mut l = ledger();
    let mut feed = MemoryUtilizationFeed::new();
    let mut e = engine(T0, ClaimWindow::Unbounded);
    l.create_lock(&a, 100 * COIN, T0 + 50 * WEEK, T0).unwrap();

    // Sole locker, epoch 0 is ungated.
    assert_eq!(e.claim(&l, &feed, &a, 0, T0 + EPOCH).unwrap(), EMISSIONS);

    // Epoch 1 targets are the epoch 0 claims. Half of the target is a third
    // of the way through the personal band (lower bound 25%) but only a
    // sixth of the way through the system band (40%); the lower ratio gates.
    feed.record(a, 1, (EMISSIONS / 2) as i128);
    let now = T0 + 2 * EPOCH;
    let third = RATIO_PRECISION / 3;
    assert_eq!(e.personal_utilization_ratio(&feed, &a, 1), third);
    assert_eq!(e.system_utilization_ratio(&feed, 1), RATIO_PRECISION / 6);
    assert_eq!(e.max_rewards(&l, &a, 1).unwrap(), EMISSIONS);
    assert_eq!(e.eligible_rewards(&l, &feed, &a, 1, now).unwrap(), EMISSIONS / 6);

    let info = e.user_info(&l, &feed, &a, now).unwrap();
    assert_eq!(info.personal_utilization, third);
    assert_eq!(info.max_rewards, EMISSIONS);
    assert_eq!(info.eligible_rewards, EMISSIONS / 6);
    assert_eq!(info.locked_amount, 100 * COIN);

    assert_eq!(e.claim(&l, &feed, &a, 1, now).unwrap(), EMISSIONS / 6);
}

#[test]
fn net_outflow_forfeits_rewards() {
    let a = acct(1);
    let mut l = ledger();
    let mut feed = MemoryUtilizationFeed::new();
    let mut e = engine(T0, ClaimWindow::Unbounded);
    l.create_lock(&a, 100 * COIN, T0 + 50 * WEEK, T0).unwrap();
    e.claim(&l, &feed, &a, 0, T0 + EPOCH).unwrap();

    feed.record(a, 1, -(COIN as i128));
    let now = T0 + 2 * EPOCH;
    assert_eq!(e.eligible_rewards(&l, &feed, &a, 1, now).unwrap(), 0);
    assert!(matches!(
        e.claim(&l, &feed, &a, 1, now),
        Err(RewardError::NothingToClaim { epoch: 1, .. })
    ));
}

#[test]
fn claim_window_limits_to_previous_epoch() {
    let a = acct(1);
    let mut l = ledger();
    let feed = MemoryUtilizationFeed::new();
    let mut e = engine(T0, ClaimWindow::PreviousEpochOnly);
    l.create_lock(&a, 100 * COIN, T0 + 50 * WEEK, T0).unwrap();

    assert!(matches!(
        e.claim(&l, &feed, &a, 0, T0 + 2 * EPOCH),
        Err(RewardError::ClaimWindowClosed { epoch: 0, .. })
    ));
    assert_eq!(e.claim(&l, &feed, &a, 0, T0 + EPOCH).unwrap(), EMISSIONS);
}

// ---------------------------------------------------------------------------
// Lock lifecycle
// ---------------------------------------------------------------------------

#[test]
fn lock_lifecycle() {
    let a = acct(1);
    let mut l = ledger();

    l.create_lock(&a, 10 * COIN, T0 + 4 * WEEK, T0).unwrap();
    l.increase_amount(&a, 5 * COIN, T0 + WEEK).unwrap();
    l.extend_duration(&a, T0 + 8 * WEEK, T0 + 2 * WEEK).unwrap();
    assert_eq!(l.lock_of(&a).unwrap().amount, 15 * COIN);
    assert_eq!(l.lock_of(&a).unwrap().end, T0 + 8 * WEEK);

    assert!(matches!(
        l.withdraw(&a, T0 + 7 * WEEK),
        Err(LedgerError::LockNotExpired { .. })
    ));
    assert_eq!(l.withdraw(&a, T0 + 8 * WEEK).unwrap(), 15 * COIN);
    assert_eq!(l.lock_of(&a), None);
    assert_eq!(l.total_locked(), 0);
    assert_eq!(l.total_supply_at(T0 + 9 * WEEK).unwrap(), 0);

    // Historical balances survive withdrawal.
    assert!(l.balance_of(&a, T0 + 3 * WEEK).unwrap() > 0);
}

#[test]
fn rejected_mutations_leave_no_trace() {
    let a = acct(1);
    let mut l = ledger();
    l.create_lock(&a, 10 * COIN, T0 + 4 * WEEK, T0).unwrap();
    let before = l.snapshot();

    assert!(matches!(
        l.create_lock(&a, COIN, T0 + 8 * WEEK, T0),
        Err(LedgerError::LockExists(_))
    ));
    assert!(matches!(
        l.increase_amount(&a, 0, T0),
        Err(LedgerError::ZeroAmount)
    ));
    assert!(matches!(
        l.extend_duration(&a, T0 + 3 * WEEK, T0),
        Err(LedgerError::InvalidDuration { .. })
    ));
    assert!(matches!(
        l.increase_amount(&a, COIN, T0 - 1),
        Err(LedgerError::NonMonotonicTimestamp { .. })
    ));
    assert_eq!(l.snapshot(), before);
}
