//! RocksDB-backed persistence for the bonding service.
//!
//! One column family per piece of state:
//!
//! | CF               | key                         | value                |
//! |------------------|-----------------------------|----------------------|
//! | `global_points`  | seq (BE)                    | `Point`              |
//! | `account_points` | account ‖ seq (BE)          | `Point`              |
//! | `locks`          | account                     | `LockedBalance`      |
//! | `slope_changes`  | ts (BE)                     | `u128`               |
//! | `claims`         | account ‖ epoch (BE)        | `ClaimRecord`        |
//! | `utilization`    | `p` ‖ account ‖ epoch / `s` ‖ epoch | `i128`       |
//! | `metadata`       | name                        | e.g. `EmissionParams`|
//!
//! Values are bincode (standard config). Big-endian integer keys keep
//! iteration in numeric order, so logs reload already sorted. Every ledger
//! update, claim and utilization report is written as one atomic
//! [`WriteBatch`].

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

use bond_core::emission::EmissionParams;
use bond_core::error::BondError;
use bond_core::types::{AccountId, Epoch, LockedBalance, Point, Timestamp};
use bond_ledger::{DecayLedger, LedgerConfig, LedgerSnapshot, LedgerUpdate};
use bond_rewards::{ClaimBook, ClaimReceipt, MemoryUtilizationFeed};

// --- Column family names ---

const CF_GLOBAL_POINTS: &str = "global_points";
const CF_ACCOUNT_POINTS: &str = "account_points";
const CF_LOCKS: &str = "locks";
const CF_SLOPE_CHANGES: &str = "slope_changes";
const CF_CLAIMS: &str = "claims";
const CF_UTILIZATION: &str = "utilization";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_GLOBAL_POINTS,
    CF_ACCOUNT_POINTS,
    CF_LOCKS,
    CF_SLOPE_CHANGES,
    CF_CLAIMS,
    CF_UTILIZATION,
    CF_METADATA,
];

// --- Metadata keys ---

const META_EMISSION_PARAMS: &[u8] = b"emission_params";

// --- Utilization key tags ---

const UTIL_PERSONAL: u8 = b'p';
const UTIL_SYSTEM: u8 = b's';

/// Persisted form of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
struct ClaimRecord {
    amount: u64,
    claimed_at: Timestamp,
}

/// RocksDB-backed store for ledger, claim and utilization state.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database at `path`, creating missing column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BondError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| BondError::Storage(e.to_string()))?;

        Ok(Self { db })
    }

    // ------------------------------------------------------------------
    // Emission parameters
    // ------------------------------------------------------------------

    /// Emission parameters recorded at first initialization, if any.
    pub fn emission_params(&self) -> Result<Option<EmissionParams>, BondError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self
            .db
            .get_cf(cf, META_EMISSION_PARAMS)
            .map_err(|e| BondError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record the emission parameters.
    pub fn put_emission_params(&self, params: &EmissionParams) -> Result<(), BondError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db
            .put_cf(cf, META_EMISSION_PARAMS, encode(params)?)
            .map_err(|e| BondError::Storage(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Persist a prepared ledger update atomically.
    pub fn write_ledger_update(&self, update: &LedgerUpdate) -> Result<(), BondError> {
        let cf_global = self.cf_handle(CF_GLOBAL_POINTS)?;
        let cf_account = self.cf_handle(CF_ACCOUNT_POINTS)?;
        let cf_locks = self.cf_handle(CF_LOCKS)?;
        let cf_slopes = self.cf_handle(CF_SLOPE_CHANGES)?;
        let mut batch = WriteBatch::default();

        let point = update.account_point;
        batch.put_cf(
            cf_account,
            Self::account_seq_key(&update.account, point.seq),
            encode(&point)?,
        );
        if let Some(global) = &update.global_point {
            batch.put_cf(cf_global, global.seq.to_be_bytes(), encode(global)?);
        }

        if update.lock.amount == 0 {
            batch.delete_cf(cf_locks, update.account.as_bytes());
        } else {
            batch.put_cf(cf_locks, update.account.as_bytes(), encode(&update.lock)?);
        }

        for (ts, slope) in &update.slope_changes {
            if *slope == 0 {
                batch.delete_cf(cf_slopes, ts.to_be_bytes());
            } else {
                batch.put_cf(cf_slopes, ts.to_be_bytes(), encode(slope)?);
            }
        }

        self.db
            .write(batch)
            .map_err(|e| BondError::Storage(e.to_string()))
    }

    /// Persist a claim.
    pub fn write_claim(&self, receipt: &ClaimReceipt) -> Result<(), BondError> {
        let cf = self.cf_handle(CF_CLAIMS)?;
        let record = ClaimRecord {
            amount: receipt.amount,
            claimed_at: receipt.claimed_at,
        };
        self.db
            .put_cf(
                cf,
                Self::account_seq_key(&receipt.account, receipt.epoch),
                encode(&record)?,
            )
            .map_err(|e| BondError::Storage(e.to_string()))
    }

    /// Persist new running utilization totals for `account` and the system
    /// in `epoch`.
    pub fn write_utilization(
        &self,
        account: &AccountId,
        epoch: Epoch,
        personal: i128,
        system: i128,
    ) -> Result<(), BondError> {
        let cf = self.cf_handle(CF_UTILIZATION)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, Self::personal_key(account, epoch), encode(&personal)?);
        batch.put_cf(cf, Self::system_key(epoch), encode(&system)?);
        self.db
            .write(batch)
            .map_err(|e| BondError::Storage(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Loads
    // ------------------------------------------------------------------

    /// Rebuild the ledger from persisted checkpoints, locks and slope changes.
    pub fn load_ledger(&self, config: LedgerConfig) -> Result<DecayLedger, BondError> {
        let mut snapshot = LedgerSnapshot::default();

        for (_, value) in self.scan(CF_GLOBAL_POINTS)? {
            snapshot.global_points.push(decode(&value)?);
        }

        for (key, value) in self.scan(CF_ACCOUNT_POINTS)? {
            let account = Self::account_prefix(&key)?;
            let point: Point = decode(&value)?;
            match snapshot.account_points.last_mut() {
                Some((last, points)) if *last == account => points.push(point),
                _ => snapshot.account_points.push((account, vec![point])),
            }
        }

        for (key, value) in self.scan(CF_LOCKS)? {
            let lock: LockedBalance = decode(&value)?;
            snapshot.locks.push((Self::account_prefix(&key)?, lock));
        }

        for (key, value) in self.scan(CF_SLOPE_CHANGES)? {
            snapshot
                .slope_changes
                .push((Self::be_u64(&key)?, decode(&value)?));
        }

        Ok(DecayLedger::restore(config, snapshot)?)
    }

    /// Load every recorded claim.
    pub fn load_claims(&self) -> Result<ClaimBook, BondError> {
        let mut records = Vec::new();
        for (key, value) in self.scan(CF_CLAIMS)? {
            let record: ClaimRecord = decode(&value)?;
            let account = Self::account_prefix(&key)?;
            let epoch = Self::be_u64(&key[20..])?;
            records.push((account, epoch, record.amount));
        }
        Ok(ClaimBook::from_records(records))
    }

    /// Load the utilization running totals.
    pub fn load_utilization(&self) -> Result<MemoryUtilizationFeed, BondError> {
        let mut personal = Vec::new();
        let mut system = Vec::new();
        for (key, value) in self.scan(CF_UTILIZATION)? {
            let delta: i128 = decode(&value)?;
            match key.split_first() {
                Some((&UTIL_PERSONAL, rest)) => {
                    let account = Self::account_prefix(rest)?;
                    personal.push((account, Self::be_u64(&rest[20..])?, delta));
                }
                Some((&UTIL_SYSTEM, rest)) => system.push((Self::be_u64(rest)?, delta)),
                _ => return Err(BondError::Storage("invalid utilization key".into())),
            }
        }
        Ok(MemoryUtilizationFeed::from_totals(personal, system))
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), BondError> {
        self.db
            .flush()
            .map_err(|e| BondError::Storage(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, BondError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BondError::Storage(format!("missing column family: {name}")))
    }

    /// Every entry of a column family in key order.
    fn scan(&self, name: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, BondError> {
        let cf = self.cf_handle(name)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| item.map_err(|e| BondError::Storage(e.to_string())))
            .collect()
    }

    /// `account ‖ n` with `n` big-endian.
    fn account_seq_key(account: &AccountId, n: u64) -> [u8; 28] {
        let mut key = [0u8; 28];
        key[..20].copy_from_slice(account.as_bytes());
        key[20..].copy_from_slice(&n.to_be_bytes());
        key
    }

    fn personal_key(account: &AccountId, epoch: Epoch) -> Vec<u8> {
        let mut key = Vec::with_capacity(29);
        key.push(UTIL_PERSONAL);
        key.extend_from_slice(&Self::account_seq_key(account, epoch));
        key
    }

    fn system_key(epoch: Epoch) -> [u8; 9] {
        let mut key = [0u8; 9];
        key[0] = UTIL_SYSTEM;
        key[1..].copy_from_slice(&epoch.to_be_bytes());
        key
    }

    fn account_prefix(key: &[u8]) -> Result<AccountId, BondError> {
        key.get(..20)
            .and_then(|b| <[u8; 20]>::try_from(b).ok())
            .map(AccountId)
            .ok_or_else(|| BondError::Storage("invalid account key".into()))
    }

    fn be_u64(bytes: &[u8]) -> Result<u64, BondError> {
        <[u8; 8]>::try_from(bytes)
            .map(u64::from_be_bytes)
            .map_err(|_| BondError::Storage(format!("invalid key length: {}", bytes.len())))
    }
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, BondError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| BondError::Storage(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, BondError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| BondError::Storage(e.to_string()))
}
