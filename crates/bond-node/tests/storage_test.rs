//! Persistence round trips through RocksDB.

use bond_core::constants::{COIN, WEEK};
use bond_core::emission::EmissionParams;
use bond_core::traits::UtilizationSource;
use bond_core::types::AccountId;
use bond_ledger::{DecayLedger, LedgerConfig, LedgerUpdate};
use bond_node_lib::config::{EmissionConfig, NodeConfig};
use bond_node_lib::storage::RocksStore;
use bond_node_lib::BondingService;
use bond_rewards::ClaimReceipt;

const NOW: u64 = 2_800 * WEEK;
const EPOCH: u64 = 2 * WEEK;

fn acct(seed: u8) -> AccountId {
    AccountId([seed; 20])
}

fn node_config(dir: &tempfile::TempDir) -> NodeConfig {
    NodeConfig {
        data_dir: dir.path().to_path_buf(),
        emission: EmissionConfig {
            start: Some(NOW),
            epoch_length: EPOCH,
            emissions_per_epoch: 1_000 * COIN,
            ..EmissionConfig::default()
        },
        ..NodeConfig::default()
    }
}

// ------------------------------------------------------------------
// RocksStore
// ------------------------------------------------------------------

fn commit(store: &RocksStore, ledger: &mut DecayLedger, update: LedgerUpdate) {
    store.write_ledger_update(&update).unwrap();
    ledger.apply(&update).unwrap();
}

#[test]
fn ledger_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let mut ledger = DecayLedger::new(LedgerConfig::default()).unwrap();

    let u = ledger.prepare_create_lock(&acct(1), 100 * COIN, NOW + 10 * WEEK, NOW).unwrap();
    commit(&store, &mut ledger, u);
    let u = ledger.prepare_create_lock(&acct(2), 50 * COIN, NOW + 30 * WEEK, NOW + WEEK).unwrap();
    commit(&store, &mut ledger, u);
    let u = ledger.prepare_extend_duration(&acct(1), NOW + 40 * WEEK, NOW + 2 * WEEK).unwrap();
    commit(&store, &mut ledger, u);

    let loaded = store.load_ledger(LedgerConfig::default()).unwrap();
    assert_eq!(loaded.snapshot(), ledger.snapshot());
    for t in [NOW, NOW + 5 * WEEK, NOW + 35 * WEEK] {
        assert_eq!(loaded.total_supply_at(t), ledger.total_supply_at(t));
    }
    // The slope change vacated by the extension is gone from disk too.
    assert_eq!(loaded.slope_change_at(NOW + 10 * WEEK), 0);
}

#[test]
fn withdraw_removes_lock_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let mut ledger = DecayLedger::new(LedgerConfig::default()).unwrap();

    let u = ledger.prepare_create_lock(&acct(1), COIN, NOW + 4 * WEEK, NOW).unwrap();
    commit(&store, &mut ledger, u);
    let u = ledger.prepare_withdraw(&acct(1), NOW + 5 * WEEK).unwrap();
    commit(&store, &mut ledger, u);

    let loaded = store.load_ledger(LedgerConfig::default()).unwrap();
    assert_eq!(loaded.lock_of(&acct(1)), None);
    assert_eq!(loaded.account_points(&acct(1)).len(), 2);
    assert_eq!(loaded.last_mutation(), NOW + 5 * WEEK);
}

#[test]
fn claims_and_utilization_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();

    store
        .write_claim(&ClaimReceipt { account: acct(1), epoch: 3, amount: 77, claimed_at: NOW })
        .unwrap();
    store.write_utilization(&acct(1), 3, -40, 1_000).unwrap();
    store.write_utilization(&acct(2), 3, 60, 1_060).unwrap();

    let claims = store.load_claims().unwrap();
    assert_eq!(claims.claimed(&acct(1), 3), 77);
    assert_eq!(claims.total_claimed(3), 77);

    let feed = store.load_utilization().unwrap();
    assert_eq!(feed.personal_utilization_delta(&acct(1), 3), -40);
    assert_eq!(feed.personal_utilization_delta(&acct(2), 3), 60);
    assert_eq!(feed.system_utilization_delta(3), 1_060);
}

#[test]
fn emission_params_stored_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.emission_params().unwrap(), None);

    let params = EmissionParams {
        start: NOW,
        epoch_length: EPOCH,
        emissions_per_epoch: 5,
        reduction_cliff: 52,
        reduction_bps: 500,
    };
    store.put_emission_params(&params).unwrap();
    store.flush().unwrap();
    drop(store);

    let reopened = RocksStore::open(dir.path()).unwrap();
    assert_eq!(reopened.emission_params().unwrap(), Some(params));
}

// ------------------------------------------------------------------
// BondingService across restarts
// ------------------------------------------------------------------

#[test]
fn service_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = node_config(&dir);
    let a = acct(1);
    let after_epoch = NOW + EPOCH;

    let (balance, claimed) = {
        let svc = BondingService::open(&cfg, NOW).unwrap();
        svc.create_lock(&a, 100 * COIN, NOW + 52 * WEEK, NOW).unwrap();
        svc.record_utilization(&a, 0, 10 * COIN as i128).unwrap();
        let claimed = svc.claim(&a, 0, after_epoch).unwrap();
        (svc.balance_of(&a, after_epoch).unwrap(), claimed)
    };
    // Sole locker in an ungated first epoch takes everything.
    assert_eq!(claimed, 1_000 * COIN);

    let svc = BondingService::open(&cfg, after_epoch).unwrap();
    assert_eq!(svc.balance_of(&a, after_epoch).unwrap(), balance);
    assert_eq!(svc.claim(&a, 0, after_epoch).unwrap(), 0);
    assert_eq!(svc.eligible_rewards(&a, 0, after_epoch).unwrap(), 0);
    assert_eq!(svc.lock_of(&a).unwrap().amount, 100 * COIN);
}

#[test]
fn recorded_schedule_wins_over_new_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = node_config(&dir);
    drop(BondingService::open(&cfg, NOW).unwrap());

    let changed = NodeConfig {
        emission: EmissionConfig {
            emissions_per_epoch: 1,
            ..cfg.emission
        },
        ..cfg.clone()
    };
    let svc = BondingService::open(&changed, NOW + 10 * EPOCH).unwrap();
    assert_eq!(svc.scheduler().params().emissions_per_epoch, 1_000 * COIN);
    assert_eq!(svc.emissions_for_epoch(0).unwrap(), 1_000 * COIN);
}
